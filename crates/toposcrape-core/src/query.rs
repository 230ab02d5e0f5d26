//! # Query Module
//!
//! A small declarative query language over graph entities and plan
//! resources.
//!
//! - A `Predicate` pairs a `PredicateKind` with a `Value`
//! - A `Matcher` pairs a predicate with zero or more `MatchFunc`s
//! - A `Query` holds exactly one matcher per kind
//!
//! A fresh query (`Query::build`) has an "any" matcher for every kind and
//! therefore matches everything. Setting a predicate replaces the matcher
//! for that kind.

use crate::model::Resource;
use crate::{Attrs, Metadata, TopoError, Uid};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// PREDICATES
// =============================================================================

/// What a predicate constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PredicateKind {
    Uid,
    Name,
    Group,
    Version,
    Kind,
    Namespace,
    Weight,
    Entity,
    Attrs,
    Metadata,
}

impl PredicateKind {
    pub const ALL: [Self; 10] = [
        Self::Uid,
        Self::Name,
        Self::Group,
        Self::Version,
        Self::Kind,
        Self::Namespace,
        Self::Weight,
        Self::Entity,
        Self::Attrs,
        Self::Metadata,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Name => "name",
            Self::Group => "group",
            Self::Version => "version",
            Self::Kind => "kind",
            Self::Namespace => "namespace",
            Self::Weight => "weight",
            Self::Entity => "entity",
            Self::Attrs => "attrs",
            Self::Metadata => "metadata",
        }
    }
}

/// Which graph items a query runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityClass {
    #[default]
    Node,
    Edge,
}

impl FromStr for EntityClass {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" | "Node" => Ok(Self::Node),
            "edge" | "Edge" => Ok(Self::Edge),
            other => Err(TopoError::UnknownEntity(other.to_string())),
        }
    }
}

/// A predicate value, or an observed value handed to a matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Matches anything.
    Any,
    /// The candidate has no such field.
    Nil,
    Str(String),
    Float(f64),
    Uid(Uid),
    Attrs(Attrs),
    Metadata(Metadata),
    Entity(EntityClass),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub value: Value,
}

impl Predicate {
    #[must_use]
    pub fn new(kind: PredicateKind, value: Value) -> Self {
        Self { kind, value }
    }

    #[must_use]
    pub fn any(kind: PredicateKind) -> Self {
        Self::new(kind, Value::Any)
    }
}

// =============================================================================
// MATCH FUNCTIONS
// =============================================================================

/// Caller-supplied test of an observed value.
pub type MatchFunc = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Accepts strings (and UIDs) equal to any of `values`.
pub fn string_eq<I, S>(values: I) -> MatchFunc
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let wanted: Vec<String> = values.into_iter().map(Into::into).collect();
    Arc::new(move |v| match v {
        Value::Str(s) => wanted.iter().any(|w| w == s),
        Value::Uid(u) => wanted.iter().any(|w| w == u.as_str()),
        _ => false,
    })
}

/// Bit pattern with `-0.0` folded onto `0.0` and every NaN onto one NaN.
fn normalized_bits(f: f64) -> u64 {
    if f == 0.0 {
        0.0f64.to_bits()
    } else if f.is_nan() {
        f64::NAN.to_bits()
    } else {
        f.to_bits()
    }
}

/// Accepts floats bit-equal to `want` after normalisation.
pub fn float_eq(want: f64) -> MatchFunc {
    let want = normalized_bits(want);
    Arc::new(move |v| matches!(v, Value::Float(f) if normalized_bits(*f) == want))
}

pub fn uid_eq(want: Uid) -> MatchFunc {
    Arc::new(move |v| match v {
        Value::Uid(u) => *u == want,
        Value::Str(s) => s == want.as_str(),
        _ => false,
    })
}

/// Accepts attribute maps containing every key/value of `probe`.
pub fn attrs_contain(probe: Attrs) -> MatchFunc {
    Arc::new(move |v| matches!(v, Value::Attrs(a) if a.contains(&probe)))
}

pub fn metadata_contain(probe: Metadata) -> MatchFunc {
    Arc::new(move |v| matches!(v, Value::Metadata(m) if m.contains(&probe)))
}

pub fn entity_eq(want: EntityClass) -> MatchFunc {
    Arc::new(move |v| matches!(v, Value::Entity(c) if *c == want))
}

// =============================================================================
// MATCHER
// =============================================================================

/// A predicate plus the functions that decide it.
#[derive(Clone)]
pub struct Matcher {
    predicate: Predicate,
    funcs: Vec<MatchFunc>,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("predicate", &self.predicate)
            .field("funcs", &self.funcs.len())
            .finish()
    }
}

impl Matcher {
    #[must_use]
    pub fn new(predicate: Predicate, funcs: Vec<MatchFunc>) -> Self {
        Self { predicate, funcs }
    }

    #[must_use]
    pub fn any(kind: PredicateKind) -> Self {
        Self::new(Predicate::any(kind), Vec::new())
    }

    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self.predicate.value, Value::Any)
    }

    /// True when the predicate is `Any`, or when every function accepts
    /// `value`. A matcher with no functions accepts everything.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        self.is_any() || self.funcs.iter().all(|f| f(value))
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Order in which field matchers are evaluated: the UID first (it narrows
/// to one candidate), then the indexed path fields, then the rest.
pub(crate) const EVAL_ORDER: [PredicateKind; 9] = [
    PredicateKind::Uid,
    PredicateKind::Namespace,
    PredicateKind::Kind,
    PredicateKind::Name,
    PredicateKind::Group,
    PredicateKind::Version,
    PredicateKind::Weight,
    PredicateKind::Attrs,
    PredicateKind::Metadata,
];

/// One matcher per predicate kind.
#[derive(Debug, Clone)]
pub struct Query {
    matchers: BTreeMap<PredicateKind, Matcher>,
}

impl Default for Query {
    fn default() -> Self {
        Self::build()
    }
}

impl Query {
    /// A query that matches everything.
    #[must_use]
    pub fn build() -> Self {
        Self {
            matchers: PredicateKind::ALL
                .into_iter()
                .map(|k| (k, Matcher::any(k)))
                .collect(),
        }
    }

    /// Set the matcher for `predicate.kind`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, predicate: Predicate, funcs: Vec<MatchFunc>) -> Self {
        self.matchers
            .insert(predicate.kind, Matcher::new(predicate, funcs));
        self
    }

    fn with_str(self, kind: PredicateKind, value: String) -> Self {
        let func = string_eq([value.clone()]);
        self.with(Predicate::new(kind, Value::Str(value)), vec![func])
    }

    #[must_use]
    pub fn uid(self, uid: impl Into<Uid>) -> Self {
        let uid = uid.into();
        let func = uid_eq(uid.clone());
        self.with(Predicate::new(PredicateKind::Uid, Value::Uid(uid)), vec![func])
    }

    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.with_str(PredicateKind::Name, name.into())
    }

    /// Match any of several names.
    #[must_use]
    pub fn names<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let value = Value::Str(names.join(","));
        self.with(
            Predicate::new(PredicateKind::Name, value),
            vec![string_eq(names)],
        )
    }

    #[must_use]
    pub fn group(self, group: impl Into<String>) -> Self {
        self.with_str(PredicateKind::Group, group.into())
    }

    #[must_use]
    pub fn version(self, version: impl Into<String>) -> Self {
        self.with_str(PredicateKind::Version, version.into())
    }

    #[must_use]
    pub fn kind(self, kind: impl Into<String>) -> Self {
        self.with_str(PredicateKind::Kind, kind.into())
    }

    #[must_use]
    pub fn namespace(self, namespace: impl Into<String>) -> Self {
        self.with_str(PredicateKind::Namespace, namespace.into())
    }

    #[must_use]
    pub fn weight(self, weight: f64) -> Self {
        self.with(
            Predicate::new(PredicateKind::Weight, Value::Float(weight)),
            vec![float_eq(weight)],
        )
    }

    #[must_use]
    pub fn attrs(self, attrs: Attrs) -> Self {
        let func = attrs_contain(attrs.clone());
        self.with(
            Predicate::new(PredicateKind::Attrs, Value::Attrs(attrs)),
            vec![func],
        )
    }

    #[must_use]
    pub fn metadata(self, metadata: Metadata) -> Self {
        let func = metadata_contain(metadata.clone());
        self.with(
            Predicate::new(PredicateKind::Metadata, Value::Metadata(metadata)),
            vec![func],
        )
    }

    #[must_use]
    pub fn entity(self, class: EntityClass) -> Self {
        self.with(
            Predicate::new(PredicateKind::Entity, Value::Entity(class)),
            vec![entity_eq(class)],
        )
    }

    /// Select the entity class by name; resolved (and possibly rejected
    /// with `UnknownEntity`) when the query runs.
    #[must_use]
    pub fn entity_named(self, class: impl Into<String>) -> Self {
        self.with(
            Predicate::new(PredicateKind::Entity, Value::Str(class.into())),
            Vec::new(),
        )
    }

    #[must_use]
    pub fn matcher(&self, kind: PredicateKind) -> Option<&Matcher> {
        self.matchers.get(&kind)
    }

    /// Whether the matcher for `kind` accepts `value`. Kinds without a
    /// matcher accept everything.
    #[must_use]
    pub fn matches(&self, kind: PredicateKind, value: &Value) -> bool {
        self.matchers.get(&kind).is_none_or(|m| m.matches(value))
    }

    /// The entity class this query runs over. Defaults to nodes.
    pub fn entity_class(&self) -> Result<EntityClass, TopoError> {
        let Some(matcher) = self.matchers.get(&PredicateKind::Entity) else {
            return Ok(EntityClass::Node);
        };
        match &matcher.predicate.value {
            Value::Any => Ok(EntityClass::Node),
            Value::Entity(class) => Ok(*class),
            Value::Str(name) => name.parse(),
            other => Err(TopoError::UnknownEntity(format!("{:?}", other))),
        }
    }

    /// The UID this query pins, if any.
    #[must_use]
    pub fn pinned_uid(&self) -> Option<Uid> {
        match &self.matchers.get(&PredicateKind::Uid)?.predicate.value {
            Value::Uid(uid) => Some(uid.clone()),
            Value::Str(s) => Some(Uid::new(s.clone())),
            _ => None,
        }
    }

    /// Evaluate the query against a plan resource. Fields a resource does
    /// not have are observed as `Nil`.
    #[must_use]
    pub fn matches_resource(&self, resource: &Resource) -> bool {
        EVAL_ORDER.iter().all(|&kind| {
            let observed = match kind {
                PredicateKind::Uid => Value::Uid(resource.uid.clone()),
                PredicateKind::Name => Value::Str(resource.name.clone()),
                PredicateKind::Group => Value::Str(resource.group.clone()),
                PredicateKind::Version => Value::Str(resource.version.clone()),
                PredicateKind::Kind => Value::Str(resource.kind.clone()),
                PredicateKind::Attrs => Value::Attrs(resource.attrs.clone()),
                _ => Value::Nil,
            };
            self.matches(kind, &observed)
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_query_matches_everything() {
        let q = Query::build();
        for kind in PredicateKind::ALL {
            assert!(q.matches(kind, &Value::Nil));
            assert!(q.matches(kind, &Value::Str("whatever".into())));
        }
        assert_eq!(q.entity_class(), Ok(EntityClass::Node));
    }

    #[test]
    fn any_predicate_short_circuits_funcs() {
        let never: MatchFunc = Arc::new(|_| false);
        let m = Matcher::new(Predicate::any(PredicateKind::Name), vec![never.clone()]);
        assert!(m.matches(&Value::Str("x".into())));

        let m = Matcher::new(
            Predicate::new(PredicateKind::Name, Value::Str("x".into())),
            vec![never],
        );
        assert!(!m.matches(&Value::Str("x".into())));
    }

    #[test]
    fn all_funcs_must_agree() {
        let m = Matcher::new(
            Predicate::new(PredicateKind::Name, Value::Str("a".into())),
            vec![string_eq(["a", "b"]), string_eq(["a"])],
        );
        assert!(m.matches(&Value::Str("a".into())));
        assert!(!m.matches(&Value::Str("b".into())));
    }

    #[test]
    fn last_predicate_of_a_kind_wins() {
        let q = Query::build().namespace("prod").namespace("dev");
        assert!(q.matches(PredicateKind::Namespace, &Value::Str("dev".into())));
        assert!(!q.matches(PredicateKind::Namespace, &Value::Str("prod".into())));
    }

    #[test]
    fn float_eq_normalises_signed_zero() {
        let f = float_eq(0.0);
        assert!(f(&Value::Float(-0.0)));
        assert!(!f(&Value::Float(1e-300)));
        assert!(float_eq(f64::NAN)(&Value::Float(f64::NAN)));
        assert!(!float_eq(2.5)(&Value::Nil));
    }

    #[test]
    fn attrs_containment() {
        let probe: Attrs = [("app", "web")].into_iter().collect();
        let target: Attrs = [("app", "web"), ("tier", "front")].into_iter().collect();
        let f = attrs_contain(probe);
        assert!(f(&Value::Attrs(target)));
        assert!(!f(&Value::Attrs(Attrs::new())));
    }

    #[test]
    fn uid_eq_accepts_uid_or_string() {
        let f = uid_eq(Uid::new("u1"));
        assert!(f(&Value::Uid(Uid::new("u1"))));
        assert!(f(&Value::Str("u1".into())));
        assert!(!f(&Value::Uid(Uid::new("u2"))));
    }

    #[test]
    fn entity_class_resolution() {
        assert_eq!(
            Query::build().entity(EntityClass::Edge).entity_class(),
            Ok(EntityClass::Edge)
        );
        assert_eq!(
            Query::build().entity_named("edge").entity_class(),
            Ok(EntityClass::Edge)
        );
        assert_eq!(
            Query::build().entity_named("hyperedge").entity_class(),
            Err(TopoError::UnknownEntity("hyperedge".into()))
        );
    }

    #[test]
    fn pinned_uid_only_when_set() {
        assert_eq!(Query::build().pinned_uid(), None);
        assert_eq!(Query::build().uid("u1").pinned_uid(), Some(Uid::new("u1")));
    }

    #[test]
    fn resource_matching() {
        let r = Resource::new(Uid::new("r1"), "deployments", "apps", "v1", "Deployment", true);
        assert!(Query::build().kind("Deployment").group("apps").matches_resource(&r));
        assert!(!Query::build().version("v2").matches_resource(&r));
        assert!(!Query::build().namespace("prod").matches_resource(&r));
        assert!(Query::build().names(["pods", "deployments"]).matches_resource(&r));
    }
}
