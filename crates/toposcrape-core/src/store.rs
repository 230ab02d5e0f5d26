//! # Store Module
//!
//! Graph-backed entity store combining a [`Graph`] with the [`Plan`] it was
//! scraped from.
//!
//! The store adds two behaviours on top of the raw graph:
//! - create-or-upsert semantics on `add`, including the in-place upgrade of
//!   placeholder entities
//! - link-before-entities tolerance: linking an unknown endpoint creates a
//!   partial entity for it and retries the link once
//!
//! Every operation takes a [`CancellationToken`] and refuses to start once
//! it has fired.

use crate::graph::{Edge, Graph, GraphKind, Hit, NodeOptions};
use crate::model::{Entity, Link, LinkOptions, Plan};
use crate::query::Query;
use crate::{TopoError, Uid};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options for [`Store::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Replace the attributes of an existing entity with the same UID.
    pub upsert: bool,
    pub node: NodeOptions,
}

impl AddOptions {
    #[must_use]
    pub fn upsert() -> Self {
        Self {
            upsert: true,
            ..Self::default()
        }
    }
}

/// Graph-backed entity store.
#[derive(Debug)]
pub struct Store {
    graph: RwLock<Graph>,
    plan: Plan,
}

fn check(ctx: &CancellationToken) -> Result<(), TopoError> {
    if ctx.is_cancelled() {
        Err(TopoError::Cancelled)
    } else {
        Ok(())
    }
}

impl Store {
    #[must_use]
    pub fn new(kind: GraphKind, plan: Plan) -> Self {
        Self::with_graph(Graph::new(kind), plan)
    }

    #[must_use]
    pub fn with_graph(graph: Graph, plan: Plan) -> Self {
        Self {
            graph: RwLock::new(graph),
            plan,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Graph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Create or update an entity.
    ///
    /// An existing entity is replaced only with `upsert`, except that a full
    /// entity always upgrades an existing partial one. A placeholder never
    /// replaces a full entity: an upsert only merges its attributes. Links
    /// owned by `entity` become graph edges, with placeholders for unknown
    /// peers.
    pub fn add(
        &self,
        ctx: &CancellationToken,
        entity: Entity,
        opts: AddOptions,
    ) -> Result<(), TopoError> {
        check(ctx)?;
        entity.validate()?;

        let links = entity.links();
        let mut graph = self.write();

        match graph.node(&entity.uid).cloned() {
            None => {
                debug!(uid = %entity.uid, kind = entity.kind(), "adding entity");
                let node = graph.new_node(entity, opts.node);
                graph.add_node(node)?;
            }
            Some(existing) if existing.entity().is_partial() && !entity.is_partial() => {
                debug!(uid = %entity.uid, "upgrading partial entity");
                let mut upgraded = existing.entity().clone();
                upgraded.upgrade(&entity);

                let mut node_opts = opts.node;
                let mut attrs = existing.attrs().clone();
                attrs.merge(&node_opts.attrs);
                node_opts.attrs = attrs;
                graph.replace_node(upgraded, node_opts)?;
            }
            Some(existing)
                if opts.upsert && entity.is_partial() && !existing.entity().is_partial() =>
            {
                debug!(uid = %entity.uid, "merging placeholder attributes");
                let mut kept = existing.entity().clone();
                kept.attrs.merge(&entity.attrs);

                let mut node_opts = opts.node;
                let mut attrs = existing.attrs().clone();
                attrs.merge(&node_opts.attrs);
                node_opts.attrs = attrs;
                graph.replace_node(kept, node_opts)?;
            }
            Some(_) if opts.upsert => {
                debug!(uid = %entity.uid, "replacing entity");
                graph.replace_node(entity, opts.node)?;
            }
            Some(_) => {}
        }

        for link in links {
            link_or_create(&mut graph, &link.from, &link.to, LinkOptions::from(&link))?;
        }
        Ok(())
    }

    /// Link two entities, creating partial entities for missing endpoints.
    pub fn link(
        &self,
        ctx: &CancellationToken,
        from: &Uid,
        to: &Uid,
        opts: LinkOptions,
    ) -> Result<Edge, TopoError> {
        check(ctx)?;
        let mut graph = self.write();
        link_or_create(&mut graph, from, to, opts)
    }

    pub fn unlink(&self, ctx: &CancellationToken, from: &Uid, to: &Uid) -> Result<(), TopoError> {
        check(ctx)?;
        debug!(%from, %to, "unlinking");
        self.write().unlink(from, to)
    }

    pub fn delete(&self, ctx: &CancellationToken, uid: &Uid) -> Result<(), TopoError> {
        check(ctx)?;
        debug!(%uid, "deleting entity");
        self.write().remove_node(uid)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Fetch one entity by UID.
    ///
    /// # Panics
    ///
    /// If the graph reports more than one node for the UID, which would
    /// mean its UID index is corrupt.
    #[allow(clippy::panic)]
    pub fn get(&self, ctx: &CancellationToken, uid: &Uid) -> Result<Entity, TopoError> {
        check(ctx)?;
        let hits = self.read().query(&Query::build().uid(uid.clone()))?;

        let count = hits.len();
        let mut hits = hits.into_iter();
        match (hits.next(), hits.next()) {
            (None, _) => Err(TopoError::NodeNotFound(uid.clone())),
            (Some(Hit::Node(node)), None) => Ok(node.into_entity()),
            (Some(_), _) => panic!("graph returned {} entities for uid {}", count, uid),
        }
    }

    pub fn query(&self, ctx: &CancellationToken, query: &Query) -> Result<Vec<Hit>, TopoError> {
        check(ctx)?;
        self.read().query(query)
    }

    pub fn sub_graph(
        &self,
        ctx: &CancellationToken,
        uid: &Uid,
        depth: usize,
    ) -> Result<Graph, TopoError> {
        check(ctx)?;
        self.read().sub_graph(uid, depth)
    }

    /// Copy of the whole graph.
    #[must_use]
    pub fn graph(&self) -> Graph {
        self.read().clone()
    }

    /// Snapshot of every stored entity, ordered by node id.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.read()
            .nodes()
            .into_iter()
            .map(|n| n.into_entity())
            .collect()
    }

    /// Snapshot of every stored link.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        self.read()
            .edges()
            .iter()
            .map(|e| e.link().clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().node_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Link under an already-held write lock; on a missing endpoint, insert
/// partial entities and retry exactly once.
fn link_or_create(
    graph: &mut Graph,
    from: &Uid,
    to: &Uid,
    opts: LinkOptions,
) -> Result<Edge, TopoError> {
    match graph.link(from, to, opts.clone()) {
        Err(TopoError::NodeNotFound(_)) => {
            for uid in [from, to] {
                if !graph.has_node(uid) {
                    let node = graph.new_node(Entity::partial(uid.clone()), NodeOptions::default());
                    graph.add_node(node)?;
                }
            }
            warn!(%from, %to, "link endpoint missing, created partial entities");
            graph.link(from, to, opts)
        }
        other => other,
    }
}

// =============================================================================
// TESTS
// =============================================================================
