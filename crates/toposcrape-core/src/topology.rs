//! # Topology
//!
//! `Top` is the flat collection of entities and links a scraper discovers
//! from one plan, before any of it reaches a graph.
//!
//! Besides the UID map it maintains a three-level index
//! `Namespace -> Kind -> Name -> Uid`, built incrementally on insert, so
//! callers can pull every entity under a namespace, a kind, or a single
//! name without scanning.

use crate::model::{Entity, Link, LinkOptions};
use crate::{TopoError, Uid};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type NameIndex = BTreeMap<String, Uid>;
type KindIndex = BTreeMap<String, NameIndex>;

#[derive(Debug, Default)]
struct TopInner {
    entities: BTreeMap<Uid, Entity>,
    /// namespace -> kind -> name -> uid
    index: BTreeMap<String, KindIndex>,
    /// Link cache keyed by link UID.
    links: BTreeMap<Uid, Link>,
}

/// Entities and links discovered by one scrape.
#[derive(Debug, Default)]
pub struct Top {
    inner: RwLock<TopInner>,
}

impl Top {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, TopInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TopInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entity. A second entity with a known UID is ignored.
    pub fn add(&self, entity: Entity) -> Result<(), TopoError> {
        entity.validate()?;
        let mut inner = self.write();
        if inner.entities.contains_key(&entity.uid) {
            return Ok(());
        }

        inner
            .index
            .entry(entity.namespace.clone())
            .or_default()
            .entry(entity.kind().to_string())
            .or_default()
            .insert(entity.name.clone(), entity.uid.clone());
        for link in entity.links() {
            inner.links.insert(link.uid.clone(), link);
        }
        inner.entities.insert(entity.uid.clone(), entity);
        Ok(())
    }

    pub fn get(&self, uid: &Uid) -> Result<Entity, TopoError> {
        self.read()
            .entities
            .get(uid)
            .cloned()
            .ok_or_else(|| TopoError::EntityNotFound(uid.clone()))
    }

    /// Every entity, ordered by UID.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.read().entities.values().cloned().collect()
    }

    /// Entities under the given index path. `None` at any level matches
    /// every key at that level.
    #[must_use]
    pub fn lookup(
        &self,
        namespace: Option<&str>,
        kind: Option<&str>,
        name: Option<&str>,
    ) -> Vec<Entity> {
        let inner = self.read();
        let mut uids = Vec::new();

        for (ns, kinds) in &inner.index {
            if namespace.is_some_and(|want| want != ns) {
                continue;
            }
            for (k, names) in kinds {
                if kind.is_some_and(|want| want != k) {
                    continue;
                }
                match name {
                    Some(want) => uids.extend(names.get(want).cloned()),
                    None => uids.extend(names.values().cloned()),
                }
            }
        }

        uids.iter()
            .filter_map(|uid| inner.entities.get(uid).cloned())
            .collect()
    }

    /// Link two known entities. The link is recorded on the source entity
    /// and in the link cache; re-linking a pair returns the existing link.
    pub fn link(&self, from: &Uid, to: &Uid, opts: LinkOptions) -> Result<Link, TopoError> {
        let mut inner = self.write();
        if !inner.entities.contains_key(to) {
            return Err(TopoError::EntityNotFound(to.clone()));
        }
        let source = inner
            .entities
            .get_mut(from)
            .ok_or_else(|| TopoError::EntityNotFound(from.clone()))?;

        let link = source.link(to.clone(), opts);
        inner.links.insert(link.uid.clone(), link.clone());
        Ok(link)
    }

    /// Every cached link, ordered by link UID.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        self.read().links.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().entities.is_empty()
    }
}
