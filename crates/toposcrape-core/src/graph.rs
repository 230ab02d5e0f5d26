//! # Graph Engine
//!
//! The weighted topology graph for Toposcrape.
//!
//! Nodes wrap entities and carry a stable integer id assigned on insertion;
//! edges wrap links plus a weight. The same structure serves directed
//! (WDG) and undirected (WUG) graphs: an undirected graph stores each edge
//! once, in the orientation it was first linked, and looks it up in both.
//!
//! All data structures use `BTreeMap` so iteration (and therefore DOT and
//! JSON output) follows node-id order.

use crate::model::{Entity, Link, LinkOptions};
use crate::primitives::{ATTR_DOTID, ATTR_NAME, MAX_TRAVERSAL_DEPTH};
use crate::query::{EntityClass, EVAL_ORDER, PredicateKind, Query, Value};
use crate::{Attrs, Metadata, TopoError, Uid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// IDENTIFIERS & OPTIONS
// =============================================================================

/// Stable integer id of a node within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Edge orientation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GraphKind {
    /// Weighted directed graph.
    #[default]
    Directed,
    /// Weighted undirected graph: `(a, b)` and `(b, a)` are one edge.
    Undirected,
}

/// Which edges a sub-graph expansion follows on a directed graph.
/// Undirected graphs always follow both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    #[default]
    Outbound,
    Both,
}

/// Options applied when wrapping an entity in a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    /// Replaces the DOTID derived from the entity.
    pub dot_id: Option<String>,
    /// Extra attributes layered over the entity's own.
    pub attrs: Attrs,
    pub metadata: Metadata,
}

// =============================================================================
// NODE & EDGE
// =============================================================================

/// A graph node wrapping an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    entity: Entity,
    dot_id: String,
    attrs: Attrs,
    metadata: Metadata,
}

impl Node {
    /// Wrap `entity` under `id`. Node attributes are the entity attributes,
    /// then the option attributes, then `dotid` and `name` set to the DOTID.
    #[must_use]
    pub fn new(id: NodeId, entity: Entity, opts: NodeOptions) -> Self {
        let dot_id = opts.dot_id.unwrap_or_else(|| entity.dot_id());
        let mut attrs = entity.attrs.clone();
        attrs.merge(&opts.attrs);
        attrs.set(ATTR_DOTID, dot_id.clone());
        attrs.set(ATTR_NAME, dot_id.clone());
        Self {
            id,
            entity,
            dot_id,
            attrs,
            metadata: opts.metadata,
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.entity.uid
    }

    #[must_use]
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    #[must_use]
    pub fn into_entity(self) -> Entity {
        self.entity
    }

    #[must_use]
    pub fn dot_id(&self) -> &str {
        &self.dot_id
    }

    #[must_use]
    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Value this node exposes to the matcher of `kind`.
    fn observe(&self, kind: PredicateKind) -> Value {
        let resource = self.entity.resource.as_ref();
        match kind {
            PredicateKind::Uid => Value::Uid(self.entity.uid.clone()),
            PredicateKind::Name => Value::Str(self.entity.name.clone()),
            PredicateKind::Namespace => Value::Str(self.entity.namespace.clone()),
            PredicateKind::Kind => Value::Str(self.entity.kind().to_string()),
            PredicateKind::Group => resource.map_or(Value::Nil, |r| Value::Str(r.group.clone())),
            PredicateKind::Version => {
                resource.map_or(Value::Nil, |r| Value::Str(r.version.clone()))
            }
            PredicateKind::Attrs => Value::Attrs(self.attrs.clone()),
            PredicateKind::Metadata => Value::Metadata(self.metadata.clone()),
            PredicateKind::Entity => Value::Entity(EntityClass::Node),
            PredicateKind::Weight => Value::Nil,
        }
    }
}

/// A graph edge: a link copy plus its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    link: Link,
    weight: f64,
}

impl Edge {
    #[must_use]
    pub fn new(link: Link) -> Self {
        let weight = link.weight;
        Self { link, weight }
    }

    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.link.uid
    }

    #[must_use]
    pub fn from(&self) -> &Uid {
        &self.link.from
    }

    #[must_use]
    pub fn to(&self) -> &Uid {
        &self.link.to
    }

    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub fn attrs(&self) -> &Attrs {
        &self.link.attrs
    }

    #[must_use]
    pub fn link(&self) -> &Link {
        &self.link
    }

    fn observe(&self, kind: PredicateKind) -> Value {
        match kind {
            PredicateKind::Uid => Value::Uid(self.link.uid.clone()),
            PredicateKind::Name => Value::Str(self.link.attrs.get(ATTR_NAME).to_string()),
            PredicateKind::Weight => Value::Float(self.weight),
            PredicateKind::Attrs => Value::Attrs(self.link.attrs.clone()),
            PredicateKind::Entity => Value::Entity(EntityClass::Edge),
            _ => Value::Nil,
        }
    }
}

/// One query result.
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    Node(Node),
    Edge(Edge),
}

impl Hit {
    #[must_use]
    pub fn uid(&self) -> &Uid {
        match self {
            Self::Node(n) => n.uid(),
            Self::Edge(e) => e.uid(),
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(n) => Some(n),
            Self::Edge(_) => None,
        }
    }

    #[must_use]
    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Self::Edge(e) => Some(e),
            Self::Node(_) => None,
        }
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// The weighted topology graph.
#[derive(Debug, Clone)]
pub struct Graph {
    uid: Uid,
    dot_id: String,
    kind: GraphKind,

    /// Node storage: NodeId -> Node
    nodes: BTreeMap<NodeId, Node>,

    /// Reverse lookup: entity Uid -> NodeId
    uid_index: BTreeMap<Uid, NodeId>,

    /// Adjacency list: from -> (to -> edge), in stored orientation
    edges: BTreeMap<NodeId, BTreeMap<NodeId, Edge>>,

    /// Incoming adjacency: to -> {from}
    reverse: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// Next available NodeId
    next_node_id: u64,
}

impl Graph {
    /// Create an empty graph with a fresh UID (also used as its DOTID).
    #[must_use]
    pub fn new(kind: GraphKind) -> Self {
        Self::with_uid(Uid::generate(), kind)
    }

    #[must_use]
    pub fn with_uid(uid: Uid, kind: GraphKind) -> Self {
        Self {
            dot_id: uid.to_string(),
            uid,
            kind,
            nodes: BTreeMap::new(),
            uid_index: BTreeMap::new(),
            edges: BTreeMap::new(),
            reverse: BTreeMap::new(),
            next_node_id: 0,
        }
    }

    #[must_use]
    pub fn directed() -> Self {
        Self::new(GraphKind::Directed)
    }

    #[must_use]
    pub fn undirected() -> Self {
        Self::new(GraphKind::Undirected)
    }

    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    #[must_use]
    pub fn dot_id(&self) -> &str {
        &self.dot_id
    }

    pub fn set_dot_id(&mut self, dot_id: impl Into<String>) {
        self.dot_id = dot_id.into();
    }

    #[must_use]
    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    #[must_use]
    pub fn is_directed(&self) -> bool {
        self.kind == GraphKind::Directed
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn has_node(&self, uid: &Uid) -> bool {
        self.uid_index.contains_key(uid)
    }

    #[must_use]
    pub fn has_edge(&self, from: &Uid, to: &Uid) -> bool {
        self.edge_ref(from, to).is_some()
    }

    #[must_use]
    pub fn node(&self, uid: &Uid) -> Option<&Node> {
        self.uid_index.get(uid).and_then(|id| self.nodes.get(id))
    }

    /// Snapshot of all nodes, ordered by node id.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.values().cloned().collect()
    }

    /// Snapshot of all edges, ordered by (from id, to id).
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .values()
            .flat_map(|targets| targets.values().cloned())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Structural mutation
    // -------------------------------------------------------------------------

    /// Wrap an entity in a node with a fresh id. The node is not inserted.
    pub fn new_node(&mut self, entity: Entity, opts: NodeOptions) -> Node {
        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);
        Node::new(id, entity, opts)
    }

    /// Insert a node. Inserting a second node for the same entity UID is a
    /// no-op. A node whose id is already taken by another entity (a node
    /// built by a different graph) is rejected with `DuplicateNode`.
    pub fn add_node(&mut self, node: Node) -> Result<(), TopoError> {
        if self.uid_index.contains_key(node.uid()) {
            return Ok(());
        }
        if self.nodes.contains_key(&node.id) {
            return Err(TopoError::DuplicateNode(node.uid().clone()));
        }
        self.insert_node(node);
        Ok(())
    }

    /// Swap the entity of an existing node, keeping its id and links.
    pub fn replace_node(&mut self, entity: Entity, opts: NodeOptions) -> Result<Node, TopoError> {
        let id = *self
            .uid_index
            .get(&entity.uid)
            .ok_or_else(|| TopoError::NodeNotFound(entity.uid.clone()))?;
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| TopoError::NodeNotFound(entity.uid.clone()))?;

        let mut entity = entity;
        for link in node.entity.links() {
            entity.attach(link);
        }
        *node = Node::new(id, entity, opts);
        Ok(node.clone())
    }

    /// Remove a node and every incident edge. Unknown UIDs are a no-op.
    pub fn remove_node(&mut self, uid: &Uid) -> Result<(), TopoError> {
        let Some(id) = self.uid_index.remove(uid) else {
            return Ok(());
        };
        self.nodes.remove(&id);

        if let Some(targets) = self.edges.remove(&id) {
            for to in targets.keys() {
                if let Some(froms) = self.reverse.get_mut(to) {
                    froms.remove(&id);
                }
                if let Some(node) = self.nodes.get_mut(to) {
                    node.entity.unlink(uid);
                }
            }
        }
        if let Some(froms) = self.reverse.remove(&id) {
            for from in froms {
                if let Some(targets) = self.edges.get_mut(&from) {
                    targets.remove(&id);
                }
                if let Some(node) = self.nodes.get_mut(&from) {
                    node.entity.unlink(uid);
                }
            }
        }
        Ok(())
    }

    /// Connect two existing nodes.
    ///
    /// Returns the existing edge unchanged if the pair is already linked
    /// (in either orientation on an undirected graph). The new link is also
    /// recorded on the source entity.
    pub fn link(&mut self, from: &Uid, to: &Uid, opts: LinkOptions) -> Result<Edge, TopoError> {
        let a = self.require(from)?;
        let b = self.require(to)?;

        if let Some((x, y)) = self.edge_key(a, b) {
            if let Some(edge) = self.edges.get(&x).and_then(|t| t.get(&y)) {
                return Ok(edge.clone());
            }
        }

        let edge = Edge::new(opts.into_link(from.clone(), to.clone()));
        self.insert_edge(a, b, edge.clone());
        if let Some(node) = self.nodes.get_mut(&a) {
            node.entity.attach(edge.link.clone());
        }
        Ok(edge)
    }

    /// Remove the edge between two nodes. Missing edges are a no-op.
    pub fn unlink(&mut self, from: &Uid, to: &Uid) -> Result<(), TopoError> {
        let (Some(&a), Some(&b)) = (self.uid_index.get(from), self.uid_index.get(to)) else {
            return Ok(());
        };
        let Some((x, y)) = self.edge_key(a, b) else {
            return Ok(());
        };

        let removed = self.edges.get_mut(&x).and_then(|targets| targets.remove(&y));
        if self.edges.get(&x).is_some_and(BTreeMap::is_empty) {
            self.edges.remove(&x);
        }
        if let Some(froms) = self.reverse.get_mut(&y) {
            froms.remove(&x);
        }
        if let Some(edge) = removed {
            self.detach(x, &edge.link);
            if y != x {
                self.detach(y, &edge.link);
            }
        }
        Ok(())
    }

    /// The edge between two nodes, or `EdgeNotExist`.
    pub fn edge(&self, from: &Uid, to: &Uid) -> Result<Edge, TopoError> {
        self.edge_ref(from, to)
            .cloned()
            .ok_or_else(|| TopoError::EdgeNotExist(from.clone(), to.clone()))
    }

    /// Nodes adjacent to `uid`: successors on a directed graph, every peer
    /// on an undirected one.
    pub fn neighbors(&self, uid: &Uid) -> Result<Vec<Node>, TopoError> {
        let id = self.require(uid)?;
        Ok(self
            .adjacent(id, Traversal::Outbound)
            .into_iter()
            .filter_map(|n| self.nodes.get(&n).cloned())
            .collect())
    }

    /// Edges leaving `uid`; on an undirected graph, every incident edge.
    pub fn edges_from(&self, uid: &Uid) -> Result<Vec<Edge>, TopoError> {
        let id = self.require(uid)?;
        let mut out: Vec<Edge> = self
            .edges
            .get(&id)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        if self.kind == GraphKind::Undirected {
            let incoming = self.reverse.get(&id).into_iter().flatten();
            for from in incoming.filter(|&&from| from != id) {
                if let Some(edge) = self.edges.get(from).and_then(|t| t.get(&id)) {
                    out.push(edge.clone());
                }
            }
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Traversal & query
    // -------------------------------------------------------------------------

    /// Sub-graph of every node within `depth` hops of `uid` (following
    /// out-edges on a directed graph), plus every edge between them.
    pub fn sub_graph(&self, uid: &Uid, depth: usize) -> Result<Graph, TopoError> {
        self.sub_graph_with(uid, depth, Traversal::Outbound)
    }

    pub fn sub_graph_with(
        &self,
        uid: &Uid,
        depth: usize,
        traversal: Traversal,
    ) -> Result<Graph, TopoError> {
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        let start = self.require(uid)?;

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back((start, 0usize));

        while let Some((current, current_depth)) = queue.pop_front() {
            if current_depth >= depth {
                continue;
            }
            for neighbor in self.adjacent(current, traversal) {
                if visited.insert(neighbor) {
                    queue.push_back((neighbor, current_depth.saturating_add(1)));
                }
            }
        }

        let mut sub = Graph::new(self.kind);
        for id in &visited {
            if let Some(node) = self.nodes.get(id) {
                sub.insert_node(node.clone());
            }
        }
        for (from, targets) in &self.edges {
            if !visited.contains(from) {
                continue;
            }
            for (to, edge) in targets {
                if visited.contains(to) {
                    sub.insert_edge(*from, *to, edge.clone());
                }
            }
        }
        Ok(sub)
    }

    /// Nodes or edges (per the query's entity class) accepted by every
    /// matcher of `query`.
    pub fn query(&self, query: &Query) -> Result<Vec<Hit>, TopoError> {
        let class = query.entity_class()?;
        if !query.matches(PredicateKind::Entity, &Value::Entity(class)) {
            return Ok(Vec::new());
        }

        let hits = match class {
            EntityClass::Node => {
                let candidates: Vec<&Node> = match query.pinned_uid() {
                    Some(uid) => self.node(&uid).into_iter().collect(),
                    None => self.nodes.values().collect(),
                };
                candidates
                    .into_iter()
                    .filter(|n| EVAL_ORDER.iter().all(|&k| query.matches(k, &n.observe(k))))
                    .map(|n| Hit::Node(n.clone()))
                    .collect()
            }
            EntityClass::Edge => self
                .edges
                .values()
                .flat_map(BTreeMap::values)
                .filter(|e| EVAL_ORDER.iter().all(|&k| query.matches(k, &e.observe(k))))
                .map(|e| Hit::Edge(e.clone()))
                .collect(),
        };
        Ok(hits)
    }

    /// Render as Graphviz DOT.
    #[must_use]
    pub fn dot(&self) -> String {
        crate::export::to_dot(self)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn require(&self, uid: &Uid) -> Result<NodeId, TopoError> {
        self.uid_index
            .get(uid)
            .copied()
            .ok_or_else(|| TopoError::NodeNotFound(uid.clone()))
    }

    /// Stored orientation of the edge between `a` and `b`, if any.
    fn edge_key(&self, a: NodeId, b: NodeId) -> Option<(NodeId, NodeId)> {
        let stored = |x: NodeId, y: NodeId| self.edges.get(&x).is_some_and(|t| t.contains_key(&y));
        if stored(a, b) {
            Some((a, b))
        } else if self.kind == GraphKind::Undirected && stored(b, a) {
            Some((b, a))
        } else {
            None
        }
    }

    fn edge_ref(&self, from: &Uid, to: &Uid) -> Option<&Edge> {
        let a = *self.uid_index.get(from)?;
        let b = *self.uid_index.get(to)?;
        let (x, y) = self.edge_key(a, b)?;
        self.edges.get(&x)?.get(&y)
    }

    fn adjacent(&self, id: NodeId, traversal: Traversal) -> Vec<NodeId> {
        let mut out: BTreeSet<NodeId> = self
            .edges
            .get(&id)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default();
        if self.kind == GraphKind::Undirected || traversal == Traversal::Both {
            if let Some(froms) = self.reverse.get(&id) {
                out.extend(froms.iter().copied());
            }
        }
        out.into_iter().collect()
    }

    /// Insert a node under its own id (used when copying between graphs).
    pub(crate) fn insert_node(&mut self, node: Node) {
        if node.id.0 >= self.next_node_id {
            self.next_node_id = node.id.0.saturating_add(1);
        }
        self.uid_index.insert(node.uid().clone(), node.id);
        self.nodes.insert(node.id, node);
    }

    /// Drop the entity link of node `id` that records `link`. A directed
    /// graph keeps a link of the opposite orientation, which is its own edge.
    fn detach(&mut self, id: NodeId, link: &Link) {
        let directed = self.is_directed();
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let peer = link.peer_of(node.uid()).clone();
        let recorded = node
            .entity
            .link_to(&peer)
            .is_some_and(|l| !directed || (l.from == link.from && l.to == link.to));
        if recorded {
            node.entity.unlink(&peer);
        }
    }

    fn insert_edge(&mut self, from: NodeId, to: NodeId, edge: Edge) {
        self.edges.entry(from).or_default().insert(to, edge);
        self.reverse.entry(to).or_default().insert(from);
    }
}

// =============================================================================
// TESTS
// =============================================================================
