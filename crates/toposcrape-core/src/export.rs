//! # Export Module
//!
//! Deterministic renderings of a [`Graph`]:
//! - Graphviz DOT, for humans and `dot -Tsvg`
//! - `GraphJson`, the single canonical JSON shape of a graph, which also
//!   imports back into an equivalent graph with the original node ids
//!
//! Both walk nodes in node-id order and edges in (from, to) order, so the
//! same graph always renders to the same text.

use crate::graph::{Graph, GraphKind, Node, NodeId, NodeOptions};
use crate::model::{Entity, Link, LinkOptions};
use crate::primitives::{ATTR_DOTID, ATTR_LABEL, ATTR_RELATION};
use crate::{Attrs, Metadata, TopoError, Uid};
use serde::{Deserialize, Serialize};

// =============================================================================
// DOT
// =============================================================================

/// Quote a DOT identifier or attribute value.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn attr_list(attrs: impl IntoIterator<Item = (String, String)>) -> String {
    let rendered: Vec<String> = attrs
        .into_iter()
        .map(|(k, v)| format!("{}={}", quote(&k), quote(&v)))
        .collect();
    rendered.join(", ")
}

/// Render a graph as Graphviz DOT.
///
/// Node statements use the stored DOTID and every node attribute except
/// `dotid` itself. Edges carry their weight, plus a label taken from the
/// `relation` attribute (or `label` when no relation is set).
#[must_use]
pub fn to_dot(graph: &Graph) -> String {
    let (keyword, arrow) = match graph.kind() {
        GraphKind::Directed => ("digraph", "->"),
        GraphKind::Undirected => ("graph", "--"),
    };

    let mut lines = vec![format!("{} {} {{", keyword, quote(graph.dot_id()))];

    for node in graph.nodes() {
        let attrs = attr_list(
            node.attrs()
                .iter()
                .filter(|(k, _)| *k != ATTR_DOTID)
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        if attrs.is_empty() {
            lines.push(format!("  {};", quote(node.dot_id())));
        } else {
            lines.push(format!("  {} [{}];", quote(node.dot_id()), attrs));
        }
    }

    for edge in graph.edges() {
        let (Some(from), Some(to)) = (graph.node(edge.from()), graph.node(edge.to())) else {
            continue;
        };
        let mut attrs = vec![("weight".to_string(), edge.weight().to_string())];
        let label = edge.attrs().get(ATTR_RELATION);
        let label = if label.is_empty() {
            edge.attrs().get(ATTR_LABEL)
        } else {
            label
        };
        if !label.is_empty() {
            attrs.push((ATTR_LABEL.to_string(), label.to_string()));
        }
        lines.push(format!(
            "  {} {} {} [{}];",
            quote(from.dot_id()),
            arrow,
            quote(to.dot_id()),
            attr_list(attrs)
        ));
    }

    lines.push("}\n".to_string());
    lines.join("\n")
}

// =============================================================================
// CANONICAL JSON
// =============================================================================

/// A node in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeJson {
    /// The node id (sort key).
    pub id: u64,

    pub dotid: String,

    pub entity: Entity,

    /// Node attributes, including the ones layered over the entity's.
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,

    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl From<&Node> for NodeJson {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id().0,
            dotid: node.dot_id().to_string(),
            entity: node.entity().clone(),
            attrs: node.attrs().clone(),
            metadata: node.metadata().clone(),
        }
    }
}

/// An edge in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeJson {
    pub link: Link,
    pub weight: f64,
}

/// A graph in canonical JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphJson {
    pub uid: Uid,
    pub dotid: String,
    pub directed: bool,

    /// Nodes sorted by node id.
    pub nodes: Vec<NodeJson>,

    /// Edges sorted by (from id, to id).
    pub edges: Vec<EdgeJson>,
}

impl GraphJson {
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            uid: graph.uid().clone(),
            dotid: graph.dot_id().to_string(),
            directed: graph.is_directed(),
            nodes: graph.nodes().iter().map(NodeJson::from).collect(),
            edges: graph
                .edges()
                .into_iter()
                .map(|e| EdgeJson {
                    weight: e.weight(),
                    link: e.link().clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the graph, preserving node ids.
    ///
    /// # Errors
    ///
    /// `DuplicateNode` if two nodes share an entity UID or a node id,
    /// `NodeNotFound` if an edge references an unknown endpoint.
    pub fn to_graph(&self) -> Result<Graph, TopoError> {
        let kind = if self.directed {
            GraphKind::Directed
        } else {
            GraphKind::Undirected
        };
        let mut graph = Graph::with_uid(self.uid.clone(), kind);
        graph.set_dot_id(self.dotid.clone());

        for n in &self.nodes {
            if graph.has_node(&n.entity.uid) {
                return Err(TopoError::DuplicateNode(n.entity.uid.clone()));
            }
            let opts = NodeOptions {
                dot_id: Some(n.dotid.clone()),
                attrs: n.attrs.clone(),
                metadata: n.metadata.clone(),
            };
            graph.add_node(Node::new(NodeId(n.id), n.entity.clone(), opts))?;
        }

        for e in &self.edges {
            let mut opts = LinkOptions::from(&e.link);
            opts.weight = Some(e.weight);
            graph.link(&e.link.from, &e.link.to, opts)?;
        }
        Ok(graph)
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a graph as pretty-printed canonical JSON.
///
/// # Errors
///
/// Returns `TopoError::SerializationError` if serialization fails.
pub fn export_json(graph: &Graph) -> Result<String, TopoError> {
    serde_json::to_string_pretty(&GraphJson::from_graph(graph))
        .map_err(|e| TopoError::SerializationError(e.to_string()))
}

/// Import a graph from canonical JSON.
///
/// # Errors
///
/// Returns `TopoError::DeserializationError` on malformed input, and the
/// errors of [`GraphJson::to_graph`] on inconsistent input.
pub fn import_json(data: &str) -> Result<Graph, TopoError> {
    let canonical: GraphJson =
        serde_json::from_str(data).map_err(|e| TopoError::DeserializationError(e.to_string()))?;
    canonical.to_graph()
}

// =============================================================================
// TESTS
// =============================================================================
