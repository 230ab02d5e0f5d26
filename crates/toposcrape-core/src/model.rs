//! # Entity Model
//!
//! Value types produced by scrapers:
//! - `Resource`: a kind of thing that can be scraped (group/version/kind + name)
//! - `Entity`: an instance of a resource at some namespace/name
//! - `Object`: an entity with its links materialised as a list
//! - `Link`: a weighted, attributed connection between two entities
//! - `Plan`: the catalogue of resources a scraper works through
//!
//! Entities reference each other by `Uid` only. Links are owned by the
//! entity they were created on and keyed by the opposite endpoint, so an
//! entity holds at most one link per peer.

use crate::primitives::{ATTR_WEIGHT, DEFAULT_WEIGHT, PARTIAL_TYPE};
use crate::query::Query;
use crate::{Attrs, Origin, TopoError, Uid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// =============================================================================
// RESOURCE
// =============================================================================

/// A scrapeable kind of thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub uid: Uid,
    /// Fully qualified type string; `group/version/kind` unless overridden.
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Whether instances live inside a namespace.
    pub namespaced: bool,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Resource {
    #[must_use]
    pub fn new(
        uid: Uid,
        name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        let group = group.into();
        let version = version.into();
        let kind = kind.into();
        Self {
            uid,
            resource_type: format!("{}/{}/{}", group, version, kind),
            name: name.into(),
            group,
            version,
            kind,
            namespaced,
            attrs: Attrs::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Check the identity and naming fields.
    pub fn validate(&self) -> Result<(), TopoError> {
        if self.uid.is_empty() {
            return Err(TopoError::InvalidUid);
        }
        if self.name.is_empty() {
            return Err(TopoError::InvalidName);
        }
        if self.group.is_empty() {
            return Err(TopoError::InvalidGroup);
        }
        if self.version.is_empty() {
            return Err(TopoError::InvalidVersion);
        }
        if self.kind.is_empty() {
            return Err(TopoError::InvalidKind);
        }
        Ok(())
    }
}

// =============================================================================
// LINK
// =============================================================================

/// Options for creating a link. Unset fields fall back to defaults
/// (fresh UID, weight 1.0, no attributes).
///
/// The reserved `weight` attribute never reaches the link: a numeric value
/// stands in for an unset `weight`, anything else is dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkOptions {
    pub uid: Option<Uid>,
    pub weight: Option<f64>,
    pub attrs: Attrs,
}

impl LinkOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.uid = Some(uid);
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub(crate) fn into_link(self, from: Uid, to: Uid) -> Link {
        let mut attrs = self.attrs;
        let carried = attrs
            .remove(ATTR_WEIGHT)
            .and_then(|raw| raw.parse::<f64>().ok());
        Link {
            uid: self.uid.unwrap_or_else(Uid::generate),
            from,
            to,
            attrs,
            weight: self.weight.or(carried).unwrap_or(DEFAULT_WEIGHT),
        }
    }
}

impl From<&Link> for LinkOptions {
    fn from(link: &Link) -> Self {
        Self {
            uid: Some(link.uid.clone()),
            weight: Some(link.weight),
            attrs: link.attrs.clone(),
        }
    }
}

/// A directional connection between two entities.
///
/// On the wire the weight travels in the reserved `weight` attribute and is
/// omitted when it equals the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "LinkWire", try_from = "LinkWire")]
pub struct Link {
    pub uid: Uid,
    pub from: Uid,
    pub to: Uid,
    pub attrs: Attrs,
    pub weight: f64,
}

impl Link {
    #[must_use]
    pub fn new(from: Uid, to: Uid) -> Self {
        LinkOptions::default().into_link(from, to)
    }

    /// The endpoint that is not `uid`. Self-loops return `uid` itself.
    #[must_use]
    pub fn peer_of(&self, uid: &Uid) -> &Uid {
        if &self.from == uid { &self.to } else { &self.from }
    }
}

#[derive(Serialize, Deserialize)]
struct LinkWire {
    uid: Uid,
    from: Uid,
    to: Uid,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,
}

impl From<Link> for LinkWire {
    fn from(link: Link) -> Self {
        let mut attrs = link.attrs;
        attrs.remove(ATTR_WEIGHT);
        if link.weight != DEFAULT_WEIGHT {
            attrs.set(ATTR_WEIGHT, link.weight.to_string());
        }
        Self {
            uid: link.uid,
            from: link.from,
            to: link.to,
            attrs,
        }
    }
}

impl TryFrom<LinkWire> for Link {
    type Error = TopoError;

    fn try_from(wire: LinkWire) -> Result<Self, Self::Error> {
        let mut attrs = wire.attrs;
        let weight = match attrs.remove(ATTR_WEIGHT) {
            Some(raw) => raw.parse::<f64>().map_err(|e| {
                TopoError::DeserializationError(format!("link weight '{}': {}", raw, e))
            })?,
            None => DEFAULT_WEIGHT,
        };
        Ok(Self {
            uid: wire.uid,
            from: wire.from,
            to: wire.to,
            attrs,
            weight,
        })
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// An instance of a resource.
///
/// An entity without a resource is *partial*: a placeholder for a link
/// endpoint that has not been scraped yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EntityWire", from = "EntityWire")]
pub struct Entity {
    pub uid: Uid,
    pub entity_type: String,
    pub name: String,
    pub namespace: String,
    pub resource: Option<Resource>,
    pub attrs: Attrs,
    /// Links keyed by the opposite endpoint.
    links: BTreeMap<Uid, Link>,
}

impl Entity {
    /// Create a full entity; its type is the resource kind.
    #[must_use]
    pub fn new(
        uid: Uid,
        name: impl Into<String>,
        namespace: impl Into<String>,
        resource: Resource,
    ) -> Self {
        Self {
            uid,
            entity_type: resource.kind.clone(),
            name: name.into(),
            namespace: namespace.into(),
            resource: Some(resource),
            attrs: Attrs::new(),
            links: BTreeMap::new(),
        }
    }

    /// Create a placeholder for an unresolved link endpoint.
    #[must_use]
    pub fn partial(uid: Uid) -> Self {
        Self {
            uid,
            entity_type: PARTIAL_TYPE.to_string(),
            name: String::new(),
            namespace: String::new(),
            resource: None,
            attrs: Attrs::new(),
            links: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.resource.is_none()
    }

    /// Graphviz identifier: `group/version/kind/namespace/name` when the
    /// resource is known, the UID otherwise.
    #[must_use]
    pub fn dot_id(&self) -> String {
        match &self.resource {
            Some(r) => format!(
                "{}/{}/{}/{}/{}",
                r.group, r.version, r.kind, self.namespace, self.name
            ),
            None => self.uid.to_string(),
        }
    }

    /// Kind of the backing resource. A partial entity reports its type,
    /// `_partial`.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.resource
            .as_ref()
            .map_or(self.entity_type.as_str(), |r| r.kind.as_str())
    }

    pub fn validate(&self) -> Result<(), TopoError> {
        if self.uid.is_empty() {
            return Err(TopoError::InvalidUid);
        }
        let Some(resource) = &self.resource else {
            if self.entity_type != PARTIAL_TYPE {
                return Err(TopoError::InvalidEntity(format!(
                    "{} has no resource but type '{}'",
                    self.uid, self.entity_type
                )));
            }
            return Ok(());
        };
        resource.validate()?;
        if self.name.is_empty() {
            return Err(TopoError::InvalidName);
        }
        if resource.namespaced == self.namespace.is_empty() {
            return Err(TopoError::InvalidNamespace);
        }
        Ok(())
    }

    /// Link this entity to `to`. Re-linking the same peer returns the
    /// existing link unchanged.
    pub fn link(&mut self, to: Uid, opts: LinkOptions) -> Link {
        if let Some(existing) = self.links.get(&to) {
            return existing.clone();
        }
        let link = opts.into_link(self.uid.clone(), to.clone());
        self.links.insert(to, link.clone());
        link
    }

    /// Record an already-built link under its peer UID.
    pub(crate) fn attach(&mut self, link: Link) {
        let peer = link.peer_of(&self.uid).clone();
        self.links.entry(peer).or_insert(link);
    }

    pub fn unlink(&mut self, peer: &Uid) -> Option<Link> {
        self.links.remove(peer)
    }

    #[must_use]
    pub fn link_to(&self, peer: &Uid) -> Option<&Link> {
        self.links.get(peer)
    }

    /// Snapshot of all links, ordered by peer UID.
    #[must_use]
    pub fn links(&self) -> Vec<Link> {
        self.links.values().cloned().collect()
    }

    /// Fill a partial entity in place from its full counterpart.
    ///
    /// Attributes are merged (the full entity wins on conflicts) and links
    /// of both sides are kept.
    pub fn upgrade(&mut self, full: &Entity) {
        self.entity_type.clone_from(&full.entity_type);
        self.name.clone_from(&full.name);
        self.namespace.clone_from(&full.namespace);
        self.resource.clone_from(&full.resource);
        self.attrs.merge(&full.attrs);
        for link in full.links.values() {
            self.attach(link.clone());
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntityWire {
    uid: Uid,
    #[serde(rename = "type")]
    entity_type: String,
    name: String,
    namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,
}

impl From<Entity> for EntityWire {
    fn from(e: Entity) -> Self {
        Self {
            uid: e.uid,
            entity_type: e.entity_type,
            name: e.name,
            namespace: e.namespace,
            resource: e.resource,
            attrs: e.attrs,
        }
    }
}

impl From<EntityWire> for Entity {
    fn from(w: EntityWire) -> Self {
        Self {
            uid: w.uid,
            entity_type: w.entity_type,
            name: w.name,
            namespace: w.namespace,
            resource: w.resource,
            attrs: w.attrs,
            links: BTreeMap::new(),
        }
    }
}

// =============================================================================
// OBJECT
// =============================================================================

/// Object-centric view of an entity: the entity fields plus its links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    #[serde(flatten)]
    pub entity: Entity,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl From<&Entity> for Object {
    fn from(entity: &Entity) -> Self {
        let links = entity.links();
        let mut entity = entity.clone();
        entity.links.clear();
        Self { entity, links }
    }
}

impl From<Object> for Entity {
    fn from(object: Object) -> Self {
        let mut entity = object.entity;
        for link in object.links {
            entity.attach(link);
        }
        entity
    }
}

// =============================================================================
// PLAN
// =============================================================================

#[derive(Debug, Default)]
struct PlanInner {
    order: Vec<Uid>,
    resources: BTreeMap<Uid, Resource>,
}

/// The catalogue of resources a scraper works through for one origin.
///
/// Resources keep their insertion order; lookups go by UID.
#[derive(Debug)]
pub struct Plan {
    origin: Origin,
    inner: RwLock<PlanInner>,
}

impl Plan {
    #[must_use]
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            inner: RwLock::new(PlanInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PlanInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PlanInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Add a new resource. Fails with `AlreadyExists` on a known UID.
    pub fn add(&self, resource: Resource) -> Result<(), TopoError> {
        resource.validate()?;
        let mut inner = self.write();
        if inner.resources.contains_key(&resource.uid) {
            return Err(TopoError::AlreadyExists(resource.uid));
        }
        inner.order.push(resource.uid.clone());
        inner.resources.insert(resource.uid.clone(), resource);
        Ok(())
    }

    /// Add or replace a resource, returning the previous value.
    /// A replaced resource keeps its position.
    pub fn insert(&self, resource: Resource) -> Result<Option<Resource>, TopoError> {
        resource.validate()?;
        let mut inner = self.write();
        if !inner.resources.contains_key(&resource.uid) {
            inner.order.push(resource.uid.clone());
        }
        Ok(inner.resources.insert(resource.uid.clone(), resource))
    }

    pub fn get(&self, uid: &Uid) -> Result<Resource, TopoError> {
        self.read()
            .resources
            .get(uid)
            .cloned()
            .ok_or_else(|| TopoError::ResourceNotFound(uid.clone()))
    }

    /// All resources in insertion order.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|uid| inner.resources.get(uid).cloned())
            .collect()
    }

    /// Resources accepted by every matcher of `query`.
    #[must_use]
    pub fn query(&self, query: &Query) -> Vec<Resource> {
        self.resources()
            .into_iter()
            .filter(|r| query.matches_resource(r))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().resources.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
