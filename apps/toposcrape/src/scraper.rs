//! # File Scraper
//!
//! Reads a JSON topology dump from a `file://` origin:
//!
//! ```json
//! {
//!   "resources": [ { "uid": "r-pod", "type": "Pod", "name": "pods", ... } ],
//!   "objects":   [ { "uid": "u1", "type": "Pod", "name": "web", ..., "links": [...] } ]
//! }
//! ```
//!
//! Resources seed the plan. Objects whose resource is not in the plan are
//! skipped; objects without a resource are kept as partials. Links may
//! point at entities the dump never describes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toposcrape_core::{
    AddOptions, Entity, Ingester, Object, Origin, Payload, Plan, Resource, RunOptions, Scraper,
    Store, Top, TopoError,
};
use tracing::{debug, info};

/// On-disk shape of a topology dump.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub objects: Vec<Object>,
}

impl Dump {
    /// Read the dump behind a `file` origin.
    pub fn read(origin: &Origin) -> Result<Self, TopoError> {
        let path = origin.file_path()?;
        let data = std::fs::read_to_string(&path).map_err(|e| {
            TopoError::IoError(format!("Cannot read dump '{}': {}", path.display(), e))
        })?;
        serde_json::from_str(&data)
            .map_err(|e| TopoError::DeserializationError(format!("{}: {}", path.display(), e)))
    }
}

/// Scraper over an in-memory [`Dump`].
#[derive(Debug, Clone)]
pub struct FileScraper {
    origin: Origin,
    dump: Dump,
}

impl FileScraper {
    #[must_use]
    pub fn new(origin: Origin, dump: Dump) -> Self {
        Self { origin, dump }
    }

    pub fn open(origin: Origin) -> Result<Self, TopoError> {
        let dump = Dump::read(&origin)?;
        Ok(Self::new(origin, dump))
    }

    /// A plan holding every resource of the dump.
    pub fn plan(&self) -> Result<Plan, TopoError> {
        let plan = Plan::new(self.origin.clone());
        for resource in &self.dump.resources {
            plan.add(resource.clone())?;
        }
        Ok(plan)
    }

    /// Entities of the dump that belong to `plan`, links attached.
    pub fn topology(&self, plan: &Plan) -> Result<Top, TopoError> {
        let top = Top::new();
        let mut skipped = 0usize;
        for object in &self.dump.objects {
            let entity = Entity::from(object.clone());
            if let Some(resource) = &entity.resource {
                if plan.get(&resource.uid).is_err() {
                    debug!(uid = %entity.uid, resource = %resource.uid, "resource not in plan");
                    skipped = skipped.saturating_add(1);
                    continue;
                }
            }
            top.add(entity)?;
        }
        info!(entities = top.len(), links = top.links().len(), skipped, "topology loaded");
        Ok(top)
    }
}

#[async_trait]
impl Scraper for FileScraper {
    async fn scrape(
        &self,
        ctx: &CancellationToken,
        plan: &Plan,
        store: &Arc<Store>,
        opts: &RunOptions,
    ) -> Result<(), TopoError> {
        let top = self.topology(plan)?;

        match &opts.broker {
            Some(broker) => {
                let ingester = Ingester::new(broker.clone());
                for entity in top.entities() {
                    let payload = Payload::Object(Object::from(&entity));
                    ingester.publish(ctx, &opts.topic, &payload).await?;
                }
            }
            None => {
                for entity in top.entities() {
                    store.add(ctx, entity, AddOptions::upsert())?;
                }
            }
        }
        Ok(())
    }
}
