//! # Runner
//!
//! Drives one scrape cycle: hands the store's plan and the store itself to
//! a caller-supplied [`Scraper`]. The runner keeps no state of its own
//! beyond the store; the first scraper error is returned unchanged.

use crate::broker::Broker;
use crate::model::Plan;
use crate::primitives::DEFAULT_TOPIC;
use crate::store::Store;
use crate::TopoError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-run options forwarded to the scraper.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// When set, the scraper publishes through this broker instead of
    /// writing to the store directly.
    pub broker: Option<Broker>,
    pub topic: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            broker: None,
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

/// Source of resources, entities and links.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Read `plan`, produce entities and links, and write them to `store`
    /// (or publish them through `opts.broker`).
    async fn scrape(
        &self,
        ctx: &CancellationToken,
        plan: &Plan,
        store: &Arc<Store>,
        opts: &RunOptions,
    ) -> Result<(), TopoError>;
}

/// Composes a scraper with a store and its plan.
#[derive(Debug, Clone)]
pub struct Runner {
    store: Arc<Store>,
}

impl Runner {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    #[must_use]
    pub fn plan(&self) -> &Plan {
        self.store.plan()
    }

    pub async fn run(
        &self,
        ctx: &CancellationToken,
        scraper: &dyn Scraper,
        opts: &RunOptions,
    ) -> Result<(), TopoError> {
        let plan = self.store.plan();
        info!(
            origin = %plan.origin(),
            resources = plan.len(),
            via_broker = opts.broker.is_some(),
            "scrape started"
        );

        match scraper.scrape(ctx, plan, &self.store, opts).await {
            Ok(()) => {
                info!(entities = self.store.len(), "scrape finished");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "scrape failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphKind;
    use crate::model::{Entity, LinkOptions, Resource};
    use crate::store::AddOptions;
    use crate::{Origin, Uid};

    /// Adds one entity per plan resource and chains them.
    struct PlanScraper;

    #[async_trait]
    impl Scraper for PlanScraper {
        async fn scrape(
            &self,
            ctx: &CancellationToken,
            plan: &Plan,
            store: &Arc<Store>,
            _opts: &RunOptions,
        ) -> Result<(), TopoError> {
            let mut previous: Option<Uid> = None;
            for resource in plan.resources() {
                let uid = Uid::new(format!("e-{}", resource.kind));
                let entity = Entity::new(uid.clone(), "x", "default", resource);
                store.add(ctx, entity, AddOptions::default())?;
                if let Some(prev) = previous.replace(uid.clone()) {
                    store.link(ctx, &prev, &uid, LinkOptions::new())?;
                }
            }
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Scraper for Failing {
        async fn scrape(
            &self,
            _ctx: &CancellationToken,
            _plan: &Plan,
            _store: &Arc<Store>,
            _opts: &RunOptions,
        ) -> Result<(), TopoError> {
            Err(TopoError::MissingResource)
        }
    }

    fn runner() -> Runner {
        let plan = Plan::new(Origin::parse("memory://runner").expect("origin"));
        for kind in ["Pod", "Service"] {
            plan.add(Resource::new(Uid::new(kind), kind, "core", "v1", kind, true))
                .expect("resource");
        }
        Runner::new(Arc::new(Store::new(GraphKind::Directed, plan)))
    }

    #[tokio::test]
    async fn run_drives_the_scraper() {
        let runner = runner();
        let ctx = CancellationToken::new();
        runner
            .run(&ctx, &PlanScraper, &RunOptions::default())
            .await
            .expect("run");

        assert_eq!(runner.store().len(), 2);
        assert_eq!(runner.store().links().len(), 1);
        assert_eq!(runner.plan().len(), 2);
    }

    #[tokio::test]
    async fn run_surfaces_scraper_error() {
        let runner = runner();
        let ctx = CancellationToken::new();
        assert_eq!(
            runner.run(&ctx, &Failing, &RunOptions::default()).await,
            Err(TopoError::MissingResource)
        );
    }

    #[tokio::test]
    async fn cancelled_run_reports_store_error() {
        let runner = runner();
        let ctx = CancellationToken::new();
        ctx.cancel();
        assert_eq!(
            runner.run(&ctx, &PlanScraper, &RunOptions::default()).await,
            Err(TopoError::Cancelled)
        );
    }

    #[test]
    fn default_options_use_default_topic() {
        let opts = RunOptions::default();
        assert!(opts.broker.is_none());
        assert_eq!(opts.topic, DEFAULT_TOPIC);
    }
}
