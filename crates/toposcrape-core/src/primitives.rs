//! # Primitives
//!
//! Fixed constants shared across the crate: reserved attribute keys,
//! placeholder markers and the defaults used by the graph and broker.

use std::time::Duration;

// =============================================================================
// RESERVED ATTRIBUTE KEYS
// =============================================================================

/// Display name of a node; set from the DOTID on node creation.
pub const ATTR_NAME: &str = "name";

/// Stable Graphviz identifier of a node.
pub const ATTR_DOTID: &str = "dotid";

/// Graphviz label.
pub const ATTR_LABEL: &str = "label";

/// Link weight as it travels on the wire.
pub const ATTR_WEIGHT: &str = "weight";

/// Relation name of a link; rendered as the DOT edge label.
pub const ATTR_RELATION: &str = "relation";

/// All reserved attribute keys.
pub const RESERVED_ATTRS: [&str; 5] = [ATTR_NAME, ATTR_DOTID, ATTR_LABEL, ATTR_WEIGHT, ATTR_RELATION];

// =============================================================================
// ENTITIES & LINKS
// =============================================================================

/// Entity type of a placeholder created for an unresolved link endpoint.
pub const PARTIAL_TYPE: &str = "_partial";

/// Weight of a link when the caller supplies none.
pub const DEFAULT_WEIGHT: f64 = 1.0;

// =============================================================================
// GRAPH
// =============================================================================

/// Maximum depth honoured by sub-graph extraction.
///
/// Larger requests are clamped so every traversal stays bounded.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

// =============================================================================
// BROKER
// =============================================================================

/// Default bounded-queue capacity of a broker topic.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default deadline for a blocking publish.
pub const DEFAULT_PUB_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for a blocking receive.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Topic scrapers publish on when routed through a broker.
pub const DEFAULT_TOPIC: &str = "topology";
