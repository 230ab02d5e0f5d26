//! # toposcrape-core
//!
//! The topology engine for Toposcrape - THE LOGIC.
//!
//! A scraper discovers resources from an origin, scrapes the entities that
//! instantiate them, and this crate assembles the result into a weighted
//! graph that can be queried, streamed and rendered.
//!
//! ## Layout
//!
//! - `types`, `primitives`: identifiers, attribute maps, errors, constants
//! - `model`, `origin`: resources, entities, objects, links, plans
//! - `query`: predicate kinds, match functions and the query builder
//! - `graph`, `export`: the weighted graph engine and its DOT / JSON forms
//! - `topology`, `store`: indexed entity collections over the graph
//! - `formats`, `broker`, `ingester`: the pub/sub transport and its pumps
//! - `runner`: the `Scraper` seam
//!
//! ## Architectural Constraints
//!
//! - In-memory only; nothing is persisted
//! - Entities reference each other by `Uid`, never by pointer
//! - Every ordered collection is a `BTreeMap`, so output is deterministic
//! - The broker owns the only background task

// =============================================================================
// MODULES
// =============================================================================

pub mod broker;
pub mod export;
pub mod formats;
pub mod graph;
pub mod ingester;
pub mod model;
pub mod origin;
pub mod primitives;
pub mod query;
pub mod runner;
pub mod store;
pub mod topology;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use origin::Origin;
pub use types::{Attrs, Metadata, TopoError, Uid};

// =============================================================================
// RE-EXPORTS: Model & Query
// =============================================================================

pub use model::{Entity, Link, LinkOptions, Object, Plan, Resource};
pub use query::{EntityClass, MatchFunc, Matcher, Predicate, PredicateKind, Query, Value};
pub use topology::Top;

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use export::{GraphJson, export_json, import_json, to_dot};
pub use graph::{Edge, Graph, GraphKind, Hit, Node, NodeId, NodeOptions, Traversal};
pub use store::{AddOptions, Store};

// =============================================================================
// RE-EXPORTS: Transport
// =============================================================================

pub use broker::{Broker, BrokerConfig, Handler, PubOptions, RecvOptions, Sink, Subscriber};
pub use formats::{Format, JsonMarshaler, Marshaler, Message, MessageType, Payload};
pub use ingester::{Digester, Ingester, SinkHandler, StoreHandler};
pub use runner::{RunOptions, Runner, Scraper};
