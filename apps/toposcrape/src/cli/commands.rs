//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands. Each
//! command scrapes its origin into a fresh store, then renders a view of it.

use super::OutputFormat;
use crate::config::Config;
use crate::scraper::FileScraper;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toposcrape_core::{
    Broker, Digester, EntityClass, Graph, GraphKind, Hit, Object, Origin, Query, RunOptions,
    Runner, Store, StoreHandler, TopoError, Traversal, Uid, export_json,
};
use tracing::{info, warn};

// =============================================================================
// PIPELINE
// =============================================================================

/// Scrape `origin` into a new store, directly or through the broker.
pub async fn scrape_into_store(
    config: &Config,
    kind: GraphKind,
    origin: &str,
    via_broker: bool,
) -> Result<Arc<Store>, TopoError> {
    let scraper = FileScraper::open(Origin::parse(origin)?)?;
    let store = Arc::new(Store::new(kind, scraper.plan()?));
    let runner = Runner::new(Arc::clone(&store));
    let ctx = CancellationToken::new();

    if !via_broker {
        runner.run(&ctx, &scraper, &RunOptions::default()).await?;
        return Ok(store);
    }

    let broker = Broker::new(config.broker_config()?);
    broker.open(&ctx)?;
    let topic = config.broker.topic.clone();
    let digester = Digester::new(broker.subscribe(&topic)?);
    let opts = RunOptions {
        broker: Some(broker.clone()),
        topic,
    };
    let mut handler = StoreHandler::new(Arc::clone(&store));

    // The digester stops once the topic has been idle for recv_timeout.
    let (ran, digested) = tokio::join!(
        runner.run(&ctx, &scraper, &opts),
        digester.run(&ctx, &mut handler)
    );
    broker.close().await;
    ran?;

    match digested {
        Ok(handled) => info!(handled, "digester cancelled"),
        Err(TopoError::Timeout) => info!(entities = store.len(), "digester drained"),
        Err(e) => {
            warn!(error = %e, "digester failed");
            return Err(e);
        }
    }
    Ok(store)
}

/// Render a graph in the requested format.
pub fn render(graph: &Graph, format: OutputFormat) -> Result<String, TopoError> {
    match format {
        OutputFormat::Dot => Ok(graph.dot()),
        OutputFormat::Json => export_json(graph),
        OutputFormat::Summary => {
            let nodes = graph.nodes();
            let partial = nodes.iter().filter(|n| n.entity().is_partial()).count();
            Ok(format!(
                "graph:   {}\nnodes:   {}\nedges:   {}\npartial: {}",
                if graph.is_directed() { "directed" } else { "undirected" },
                nodes.len(),
                graph.edge_count(),
                partial
            ))
        }
    }
}

// =============================================================================
// SCRAPE COMMAND
// =============================================================================

pub async fn cmd_scrape(
    config: &Config,
    kind: GraphKind,
    origin: &str,
    via_broker: bool,
    format: OutputFormat,
) -> Result<String, TopoError> {
    let store = scrape_into_store(config, kind, origin, via_broker).await?;
    render(&store.graph(), format)
}

// =============================================================================
// SUBGRAPH COMMAND
// =============================================================================

pub async fn cmd_subgraph(
    config: &Config,
    kind: GraphKind,
    origin: &str,
    uid: &str,
    depth: usize,
    both: bool,
    format: OutputFormat,
) -> Result<String, TopoError> {
    let store = scrape_into_store(config, kind, origin, false).await?;
    let uid = Uid::new(uid);
    let sub = if both {
        store.graph().sub_graph_with(&uid, depth, Traversal::Both)?
    } else {
        store.sub_graph(&CancellationToken::new(), &uid, depth)?
    };
    render(&sub, format)
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Predicates of the `query` command; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub namespace: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub uid: Option<String>,
    pub edges: bool,
}

impl QueryFilter {
    #[must_use]
    pub fn to_query(&self) -> Query {
        let mut q = Query::build();
        if self.edges {
            q = q.entity(EntityClass::Edge);
        }
        if let Some(ns) = &self.namespace {
            q = q.namespace(ns.as_str());
        }
        if let Some(kind) = &self.kind {
            q = q.kind(kind.as_str());
        }
        if let Some(name) = &self.name {
            q = q.name(name.as_str());
        }
        if let Some(uid) = &self.uid {
            q = q.uid(uid.as_str());
        }
        q
    }
}

pub async fn cmd_query(
    config: &Config,
    kind: GraphKind,
    origin: &str,
    filter: &QueryFilter,
) -> Result<String, TopoError> {
    let store = scrape_into_store(config, kind, origin, false).await?;
    let hits = store.query(&CancellationToken::new(), &filter.to_query())?;

    let lines = hits
        .iter()
        .map(|hit| {
            let encoded = match hit {
                Hit::Node(node) => serde_json::to_string(&Object::from(node.entity())),
                Hit::Edge(edge) => serde_json::to_string(edge.link()),
            };
            encoded.map_err(|e| TopoError::SerializationError(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}
