//! # Core Type Definitions
//!
//! This module contains the leaf types every other module builds on:
//! - Identifiers (`Uid`)
//! - Attribute maps (`Attrs`, `Metadata`)
//! - Error types (`TopoError`)

mod attrs;
mod uid;

pub use attrs::{Attrs, Metadata};
pub use uid::Uid;

use thiserror::Error;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Toposcrape system.
///
/// Every variant maps to one stable identifier (see [`TopoError::name`]) so
/// callers can branch on the kind of failure without parsing messages.
/// Collaborator errors (JSON, URL parsing, I/O) are carried as strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopoError {
    #[error("Not implemented")]
    NotImplemented,

    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The broker is closed.
    #[error("Broker not connected")]
    NotConnected,

    /// Receive on an unsubscribed (or closed) subscriber.
    #[error("Subscription inactive")]
    SubscriptionInactive,

    #[error("Topic does not exist: {0}")]
    TopicNotExist(String),

    /// A publish or receive deadline elapsed.
    #[error("Timeout")]
    Timeout,

    #[error("Node not found: {0}")]
    NodeNotFound(Uid),

    #[error("Edge not found: {0} -> {1}")]
    EdgeNotFound(Uid, Uid),

    #[error("Edge does not exist: {0} -> {1}")]
    EdgeNotExist(Uid, Uid),

    #[error("Duplicate node: {0}")]
    DuplicateNode(Uid),

    /// A query named an entity class other than node or edge.
    #[error("Unknown entity class: {0}")]
    UnknownEntity(String),

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Missing entity")]
    MissingEntity,

    #[error("Missing resource")]
    MissingResource,

    #[error("Entity not found: {0}")]
    EntityNotFound(Uid),

    #[error("Already exists: {0}")]
    AlreadyExists(Uid),

    #[error("Resource not found: {0}")]
    ResourceNotFound(Uid),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Filter not found")]
    FilterNotFound,

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid UID")]
    InvalidUid,

    #[error("Invalid name")]
    InvalidName,

    #[error("Invalid group")]
    InvalidGroup,

    #[error("Invalid version")]
    InvalidVersion,

    #[error("Invalid kind")]
    InvalidKind,

    #[error("Invalid namespace")]
    InvalidNamespace,

    /// The caller's context was cancelled before the operation ran.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl TopoError {
    /// Stable identifier of this error kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::Unsupported(_) => "Unsupported",
            Self::NotConnected => "NotConnected",
            Self::SubscriptionInactive => "SubscriptionInactive",
            Self::TopicNotExist(_) => "TopicNotExist",
            Self::Timeout => "Timeout",
            Self::NodeNotFound(_) => "NodeNotFound",
            Self::EdgeNotFound(..) => "EdgeNotFound",
            Self::EdgeNotExist(..) => "EdgeNotExist",
            Self::DuplicateNode(_) => "DuplicateNode",
            Self::UnknownEntity(_) => "UnknownEntity",
            Self::InvalidEntity(_) => "InvalidEntity",
            Self::MissingEntity => "MissingEntity",
            Self::MissingResource => "MissingResource",
            Self::EntityNotFound(_) => "EntityNotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::ResourceNotFound(_) => "ResourceNotFound",
            Self::UnsupportedType(_) => "UnsupportedType",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::FilterNotFound => "FilterNotFound",
            Self::UnknownType(_) => "UnknownType",
            Self::InvalidUid => "InvalidUID",
            Self::InvalidName => "InvalidName",
            Self::InvalidGroup => "InvalidGroup",
            Self::InvalidVersion => "InvalidVersion",
            Self::InvalidKind => "InvalidKind",
            Self::InvalidNamespace => "InvalidNamespace",
            Self::Cancelled => "Cancelled",
            Self::InvalidOrigin(_) => "InvalidOrigin",
            Self::SerializationError(_) => "SerializationError",
            Self::DeserializationError(_) => "DeserializationError",
            Self::IoError(_) => "IoError",
        }
    }
}

impl From<std::io::Error> for TopoError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
