//! # Message Codec
//!
//! The broker moves opaque bytes. This module defines the envelope around
//! them (`Message`), the typed payloads they decode to (`Payload`), and the
//! `Marshaler` seam between the two.
//!
//! JSON is the only format. Its shapes are the serde forms of the model
//! types:
//! - Resource: `{uid, type, name, group, version, kind, namespaced, attrs?}`
//! - Entity: `{uid, type, name, namespace, resource?, attrs?}`
//! - Object: Entity plus `links: [Link]`
//! - Link: `{uid, from, to, attrs?}`

use crate::model::{Entity, Link, Object, Resource};
use crate::{Attrs, TopoError, Uid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// FORMAT
// =============================================================================

/// Supported wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    #[default]
    Json,
}

impl Format {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            _ => Err(TopoError::UnsupportedFormat(s.to_string())),
        }
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Discriminates the payload carried by a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageType {
    Entity,
    Object,
    Resource,
    Link,
    #[default]
    Unknown,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "Entity",
            Self::Object => "Object",
            Self::Resource => "Resource",
            Self::Link => "Link",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entity" => Ok(Self::Entity),
            "Object" => Ok(Self::Object),
            "Resource" => Ok(Self::Resource),
            "Link" => Ok(Self::Link),
            "Unknown" => Ok(Self::Unknown),
            _ => Err(TopoError::UnknownType(s.to_string())),
        }
    }
}

/// Broker wire envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub uid: Uid,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Message {
    /// Wrap `data` under a fresh UID.
    #[must_use]
    pub fn new(kind: MessageType, data: impl Into<Vec<u8>>) -> Self {
        Self::with_uid(Uid::generate(), kind, data)
    }

    #[must_use]
    pub fn with_uid(uid: Uid, kind: MessageType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            kind,
            data: data.into(),
            attrs: Attrs::new(),
        }
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Typed content of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Entity(Entity),
    Object(Object),
    Resource(Resource),
    Link(Link),
}

impl Payload {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Entity(_) => MessageType::Entity,
            Self::Object(_) => MessageType::Object,
            Self::Resource(_) => MessageType::Resource,
            Self::Link(_) => MessageType::Link,
        }
    }
}

impl From<Entity> for Payload {
    fn from(e: Entity) -> Self {
        Self::Entity(e)
    }
}

impl From<Object> for Payload {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Resource> for Payload {
    fn from(r: Resource) -> Self {
        Self::Resource(r)
    }
}

impl From<Link> for Payload {
    fn from(l: Link) -> Self {
        Self::Link(l)
    }
}

// =============================================================================
// MARSHALER
// =============================================================================

/// Converts payloads to and from bytes.
pub trait Marshaler: Send + Sync {
    fn format(&self) -> Format;

    fn marshal(&self, payload: &Payload) -> Result<Vec<u8>, TopoError>;

    /// Decode `data` as the payload named by `kind`.
    ///
    /// # Errors
    ///
    /// `UnsupportedType` for [`MessageType::Unknown`],
    /// `DeserializationError` for malformed bytes.
    fn unmarshal(&self, kind: MessageType, data: &[u8]) -> Result<Payload, TopoError>;
}

/// The canonical JSON marshaler.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaler;

fn decode<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T, TopoError> {
    serde_json::from_slice(data).map_err(|e| TopoError::DeserializationError(e.to_string()))
}

impl Marshaler for JsonMarshaler {
    fn format(&self) -> Format {
        Format::Json
    }

    fn marshal(&self, payload: &Payload) -> Result<Vec<u8>, TopoError> {
        let encoded = match payload {
            Payload::Entity(e) => serde_json::to_vec(e),
            Payload::Object(o) => serde_json::to_vec(o),
            Payload::Resource(r) => serde_json::to_vec(r),
            Payload::Link(l) => serde_json::to_vec(l),
        };
        encoded.map_err(|e| TopoError::SerializationError(e.to_string()))
    }

    fn unmarshal(&self, kind: MessageType, data: &[u8]) -> Result<Payload, TopoError> {
        match kind {
            MessageType::Entity => decode(data).map(Payload::Entity),
            MessageType::Object => decode(data).map(Payload::Object),
            MessageType::Resource => decode(data).map(Payload::Resource),
            MessageType::Link => decode(data).map(Payload::Link),
            MessageType::Unknown => Err(TopoError::UnsupportedType(kind.to_string())),
        }
    }
}

/// The marshaler for `format`.
#[must_use]
pub fn marshaler_for(format: Format) -> Box<dyn Marshaler> {
    match format {
        Format::Json => Box::new(JsonMarshaler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkOptions;

    fn pod() -> Entity {
        let resource = Resource::new(Uid::new("r-pod"), "pods", "core", "v1", "Pod", true);
        Entity::new(Uid::new("u1"), "web", "prod", resource)
    }

    #[test]
    fn format_names() {
        assert_eq!("json".parse::<Format>(), Ok(Format::Json));
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert_eq!(
            "yaml".parse::<Format>(),
            Err(TopoError::UnsupportedFormat("yaml".into()))
        );
    }

    #[test]
    fn message_type_names() {
        for t in [
            MessageType::Entity,
            MessageType::Object,
            MessageType::Resource,
            MessageType::Link,
            MessageType::Unknown,
        ] {
            assert_eq!(t.as_str().parse::<MessageType>(), Ok(t));
        }
        assert_eq!(
            "Widget".parse::<MessageType>(),
            Err(TopoError::UnknownType("Widget".into()))
        );
    }

    #[test]
    fn entity_json_shape() {
        let bytes = JsonMarshaler.marshal(&Payload::Entity(pod())).expect("marshal");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");

        assert_eq!(value["uid"], "u1");
        assert_eq!(value["type"], "Pod");
        assert_eq!(value["namespace"], "prod");
        assert_eq!(value["resource"]["kind"], "Pod");
        assert_eq!(value["resource"]["namespaced"], true);
        assert!(value.get("attrs").is_none());
        assert!(value.get("links").is_none());
    }

    #[test]
    fn object_decodes_with_links() {
        let mut e = pod();
        e.link(Uid::new("u2"), LinkOptions::new().with_uid(Uid::new("l1")));
        let payload = Payload::Object(Object::from(&e));

        let bytes = JsonMarshaler.marshal(&payload).expect("marshal");
        let back = JsonMarshaler
            .unmarshal(MessageType::Object, &bytes)
            .expect("unmarshal");
        assert_eq!(back, payload);
    }

    #[test]
    fn unknown_type_is_unsupported() {
        assert_eq!(
            JsonMarshaler.unmarshal(MessageType::Unknown, b"{}"),
            Err(TopoError::UnsupportedType("Unknown".into()))
        );
    }

    #[test]
    fn malformed_bytes() {
        assert!(matches!(
            JsonMarshaler.unmarshal(MessageType::Link, b"[1,2"),
            Err(TopoError::DeserializationError(_))
        ));
    }

    #[test]
    fn message_envelope_shape() {
        let msg = Message::with_uid(Uid::new("m1"), MessageType::Link, b"x".to_vec());
        let value = serde_json::to_value(&msg).expect("json");
        assert_eq!(value["uid"], "m1");
        assert_eq!(value["type"], "Link");
        assert_eq!(value["data"], serde_json::json!([120]));
        assert!(value.get("attrs").is_none());
    }

    #[test]
    fn payload_reports_its_type() {
        assert_eq!(Payload::from(pod()).message_type(), MessageType::Entity);
        let link = Link::new(Uid::new("a"), Uid::new("b"));
        assert_eq!(Payload::from(link).message_type(), MessageType::Link);
        assert_eq!(marshaler_for(Format::Json).format(), Format::Json);
    }
}
