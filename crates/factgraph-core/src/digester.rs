//! # Digester
//!
//! Flattens nested data into facts and rebuilds it from them.
//!
//! ## Digestion
//!
//! Depth-first over the input:
//! - A map gets a fresh id; each value is digested, then
//!   `(id, key, digested value)` is recorded
//! - A list gets a fresh id; each member is digested, then
//!   `(id, "includes", digested member)` is recorded, in input order
//! - A scalar is returned unchanged and never gets an id
//!
//! Children are therefore recorded before the fact that links them to their
//! parent. Digesting a bare scalar yields that scalar and no facts.
//!
//! ## Undigestion
//!
//! Facts are grouped by entity in first-seen order. An entity with only
//! `includes` facts becomes a list; any other entity becomes a map. String
//! values naming another grouped entity are replaced by that entity's
//! reconstruction. The root is the first entity that no other entity
//! references. A reference cycle is an error.
//!
//! ## Empty containers
//!
//! An empty map or list gets an id but records no facts, so nothing marks
//! that id as an entity. The parent keeps the id as a plain string:
//! `{"a": {}}` rebuilds as `{"a": "<id>"}`, and a top-level `[]` or `{}`
//! rebuilds as `None`. Digest then undigest is the identity only for data
//! whose containers are non-empty.

use crate::ids::SharedIds;
use crate::primitives::{INCLUDES, MAX_DIGEST_DEPTH};
use crate::{Blob, FactGraphError, Fact, Value};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::{IndexMap, IndexSet};
use rust_decimal::Decimal;

// =============================================================================
// DATA
// =============================================================================

/// A nested structure of maps, lists and scalars.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Keyed attributes in insertion order. Equality ignores order.
    Map(IndexMap<String, Data>),
    List(Vec<Data>),
    Scalar(Value),
}

impl Data {
    /// Build a map from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Data>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list from members.
    pub fn list<V: Into<Data>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&IndexMap<String, Data>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Look up a key of a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Data> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<Data>> for Data {
    fn from(items: Vec<Data>) -> Self {
        Self::List(items)
    }
}

impl From<IndexMap<String, Data>> for Data {
    fn from(map: IndexMap<String, Data>) -> Self {
        Self::Map(map)
    }
}

macro_rules! scalar_data {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Data {
                fn from(value: $t) -> Self {
                    Self::Scalar(Value::from(value))
                }
            }
        )*
    };
}

scalar_data!(
    &str,
    String,
    i64,
    i32,
    f64,
    bool,
    Decimal,
    NaiveDate,
    NaiveDateTime,
    Blob,
);

// =============================================================================
// DIGESTER
// =============================================================================

/// Digests nested data into facts.
///
/// `known` holds the facts of the last `digest` call.
pub struct Digester {
    ids: SharedIds,
    known: Vec<Fact>,
}

impl std::fmt::Debug for Digester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Digester")
            .field("known", &self.known.len())
            .finish_non_exhaustive()
    }
}

impl Digester {
    #[must_use]
    pub fn new(ids: SharedIds) -> Self {
        Self {
            ids,
            known: Vec::new(),
        }
    }

    /// Digest `data`, replacing `known` with its facts.
    ///
    /// Returns the id of the top-level structure, or the scalar itself.
    pub fn digest(&mut self, data: &Data) -> Result<Value, FactGraphError> {
        let mut known = Vec::new();
        let top = self.walk(data, 1, &mut known)?;
        self.known = known;
        Ok(top)
    }

    /// Facts produced by the last `digest`.
    #[must_use]
    pub fn known(&self) -> &[Fact] {
        &self.known
    }

    #[must_use]
    pub fn into_facts(self) -> Vec<Fact> {
        self.known
    }

    fn walk(
        &self,
        data: &Data,
        depth: usize,
        known: &mut Vec<Fact>,
    ) -> Result<Value, FactGraphError> {
        let entries: Vec<(&str, &Data)> = match data {
            Data::Scalar(value) => return Ok(value.clone()),
            Data::Map(map) => map.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            Data::List(items) => items.iter().map(|item| (INCLUDES, item)).collect(),
        };
        if depth > MAX_DIGEST_DEPTH {
            return Err(FactGraphError::DepthLimitExceeded(MAX_DIGEST_DEPTH));
        }

        let id = self.ids.new_id();
        for (attribute, value) in entries {
            let value = self.walk(value, depth + 1, known)?;
            known.push(Fact::new(id.as_str(), attribute, value));
        }
        Ok(Value::Str(id))
    }
}

/// Digest `data` into a fresh list of facts.
pub fn digested(data: &Data, ids: SharedIds) -> Result<Vec<Fact>, FactGraphError> {
    let mut digester = Digester::new(ids);
    digester.digest(data)?;
    Ok(digester.into_facts())
}

// =============================================================================
// UNDIGESTER
// =============================================================================

/// Facts grouped under one entity id.
#[derive(Debug, Default)]
struct Group {
    attributes: IndexMap<String, Value>,
    members: Vec<Value>,
}

/// Rebuilds nested data from facts.
#[derive(Debug, Default)]
pub struct Undigester {
    groups: IndexMap<String, Group>,
}

impl Undigester {
    /// Group facts by entity, in the order entities first appear.
    #[must_use]
    pub fn new(facts: &[Fact]) -> Self {
        let mut groups: IndexMap<String, Group> = IndexMap::new();
        for fact in facts {
            let group = groups.entry(fact.entity.clone()).or_default();
            if fact.is_membership() {
                group.members.push(fact.value.clone());
            } else {
                group
                    .attributes
                    .insert(fact.attribute.clone(), fact.value.clone());
            }
        }
        Self { groups }
    }

    /// The first entity that no other entity references.
    ///
    /// Falls back to the first entity when every entity is referenced, so
    /// that rebuilding reports the cycle.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        let referenced: IndexSet<&str> = self
            .groups
            .iter()
            .flat_map(|(id, group)| {
                group
                    .attributes
                    .values()
                    .chain(&group.members)
                    .filter_map(Value::as_str)
                    .filter(move |value| *value != id.as_str())
            })
            .filter(|value| self.groups.contains_key(*value))
            .collect();
        self.groups
            .keys()
            .find(|id| !referenced.contains(id.as_str()))
            .or_else(|| self.groups.keys().next())
            .map(String::as_str)
    }

    /// Rebuild the structure rooted at `id`, or `None` if it has no facts.
    pub fn rebuild(&self, id: &str) -> Result<Option<Data>, FactGraphError> {
        if !self.groups.contains_key(id) {
            return Ok(None);
        }
        let mut path = IndexSet::new();
        self.build(id, &mut path).map(Some)
    }

    fn build<'a>(&'a self, id: &'a str, path: &mut IndexSet<&'a str>) -> Result<Data, FactGraphError> {
        let Some(group) = self.groups.get(id) else {
            return Ok(Data::Scalar(Value::Str(id.to_string())));
        };
        if !path.insert(id) {
            return Err(FactGraphError::CyclicReference(id.to_string()));
        }

        let members = group
            .members
            .iter()
            .map(|value| self.resolve(value, path))
            .collect::<Result<Vec<_>, _>>()?;
        let data = if group.attributes.is_empty() {
            Data::List(members)
        } else {
            let mut map = IndexMap::with_capacity(group.attributes.len() + 1);
            for (attribute, value) in &group.attributes {
                map.insert(attribute.clone(), self.resolve(value, path)?);
            }
            if !members.is_empty() {
                map.insert(INCLUDES.to_string(), Data::List(members));
            }
            Data::Map(map)
        };

        path.shift_remove(id);
        Ok(data)
    }

    fn resolve<'a>(
        &'a self,
        value: &'a Value,
        path: &mut IndexSet<&'a str>,
    ) -> Result<Data, FactGraphError> {
        match value.as_str() {
            Some(id) if self.groups.contains_key(id) => self.build(id, path),
            _ => Ok(Data::Scalar(value.clone())),
        }
    }
}

/// Rebuild the structure the facts describe, rooted at `Undigester::root`.
pub fn undigested(facts: &[Fact]) -> Result<Option<Data>, FactGraphError> {
    let undigester = Undigester::new(facts);
    match undigester.root() {
        Some(root) => undigester.rebuild(root),
        None => Ok(None),
    }
}

/// Rebuild the structure rooted at a known id.
pub fn undigested_from(facts: &[Fact], root: &str) -> Result<Option<Data>, FactGraphError> {
    Undigester::new(facts).rebuild(root)
}

// =============================================================================
// TESTS
// =============================================================================
