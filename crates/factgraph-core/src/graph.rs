//! # Graph
//!
//! The public API over a fact store: add nested data, fetch entities,
//! delete by pattern and run conjunctive queries.
//!
//! ## Queries
//!
//! A query is a list of clauses, each a triple of terms. Clauses are
//! evaluated left to right as a nested-loop join:
//! - Each clause is matched against the store once, using its constant
//!   positions as the pattern
//! - Every existing binding is extended with every matching fact whose
//!   values agree with the variables already bound
//! - A variable repeated inside one clause must bind the same value in
//!   each of its positions
//!
//! `?name` variables are reported in the result; `_name` variables join
//! but are dropped from it.

use crate::backend::{StorageBackend, facts_of};
use crate::digester::{Data, Digester, undigested_from};
use crate::ids::{SharedIds, random_ids};
use crate::json::value_from_json;
use crate::store::{FactStore, MemoryFactStore};
use crate::{Entity, FactGraphError, Fact, Pattern, Value, codec};
use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexSet;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// One query result: variable name (without `?`) to value.
pub type Binding = BTreeMap<String, Value>;

// =============================================================================
// TERMS AND CLAUSES
// =============================================================================

/// One position of a query clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// `?name`: bound and reported.
    Var(String),
    /// `_name`: bound and joined, not reported.
    Blank(String),
    /// Matches anything and binds nothing.
    Any,
    /// Must equal this value.
    Const(Value),
}

impl Term {
    /// Parse a term from text.
    ///
    /// `?x` and `_x` are variables, a lone `_` or `?` is a wildcard and
    /// anything else is a string constant.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match text {
            "_" | "?" => Self::Any,
            _ => {
                if let Some(name) = text.strip_prefix('?') {
                    Self::Var(name.to_string())
                } else if let Some(name) = text.strip_prefix('_') {
                    Self::Blank(name.to_string())
                } else {
                    Self::Const(Value::Str(text.to_string()))
                }
            }
        }
    }

    /// Parse a term in value position.
    ///
    /// Variables and wildcards parse as in `parse`. Other text is read as a
    /// JSON scalar when it is one (`12`, `true`, `"12"`, a tagged object)
    /// and as a bare string otherwise.
    #[must_use]
    pub fn parse_value(text: &str) -> Self {
        match Self::parse(text) {
            Self::Const(_) => {
                let value = serde_json::from_str(text)
                    .ok()
                    .and_then(|json| value_from_json(&json).ok())
                    .unwrap_or_else(|| Value::Str(text.to_string()));
                Self::from(value)
            }
            term => term,
        }
    }

    /// Binding key: the sigil keeps `?x` and `_x` apart.
    fn key(&self) -> Option<String> {
        match self {
            Self::Var(name) => Some(format!("?{name}")),
            Self::Blank(name) => Some(format!("_{name}")),
            Self::Any | Self::Const(_) => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "?{name}"),
            Self::Blank(name) => write!(f, "_{name}"),
            Self::Any => f.write_str("_"),
            Self::Const(Value::Str(s)) => f.write_str(s),
            Self::Const(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Term {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for Term {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<Value> for Term {
    /// A `Null` constant constrains nothing.
    fn from(value: Value) -> Self {
        if value.is_null() {
            Self::Any
        } else {
            Self::Const(value)
        }
    }
}

impl<T: Into<Term>> From<Option<T>> for Term {
    fn from(term: Option<T>) -> Self {
        term.map_or(Self::Any, Into::into)
    }
}

macro_rules! const_term {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Term {
                fn from(value: $t) -> Self {
                    Self::Const(Value::from(value))
                }
            }
        )*
    };
}

const_term!(i64, i32, f64, bool, Decimal, NaiveDate, NaiveDateTime);

/// A triple of terms: entity, attribute, value.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause(pub [Term; 3]);

impl Clause {
    pub fn new(entity: impl Into<Term>, attribute: impl Into<Term>, value: impl Into<Term>) -> Self {
        Self([entity.into(), attribute.into(), value.into()])
    }

    /// Parse `"entity attribute value"`.
    ///
    /// The value is everything after the attribute, so it may contain
    /// spaces, and is read with `Term::parse_value`.
    pub fn parse(text: &str) -> Result<Self, FactGraphError> {
        let invalid = || FactGraphError::InvalidQuery(format!("expected \"s p o\", got {text:?}"));
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let entity = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let rest = parts.next().map(str::trim_start).ok_or_else(invalid)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let attribute = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let value = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;
        Ok(Self([
            Term::parse(entity),
            Term::parse(attribute),
            Term::parse_value(value),
        ]))
    }

    /// The store pattern for the constant positions, or `None` when a
    /// constant can never match (a non-string entity or attribute).
    fn pattern(&self) -> Option<Pattern> {
        let [entity, attribute, value] = &self.0;
        let mut pattern = Pattern::any();
        if let Term::Const(v) = entity {
            pattern = pattern.entity(v.as_str()?);
        }
        if let Term::Const(v) = attribute {
            pattern = pattern.attribute(v.as_str()?);
        }
        if let Term::Const(v) = value {
            pattern = pattern.value(v.clone());
        }
        Some(pattern)
    }

    /// Extend `binding` with a fact, or `None` when a variable disagrees.
    fn unify(&self, binding: &BTreeMap<String, Value>, fact: &Fact) -> Option<BTreeMap<String, Value>> {
        let mut extended = binding.clone();
        let values = [
            Value::Str(fact.entity.clone()),
            Value::Str(fact.attribute.clone()),
            fact.value.clone(),
        ];
        for (term, value) in self.0.iter().zip(values) {
            let Some(key) = term.key() else {
                continue;
            };
            match extended.get(&key) {
                Some(bound) if !codec::same_value(bound, &value) => return None,
                Some(_) => {}
                None => {
                    extended.insert(key, value);
                }
            }
        }
        Some(extended)
    }
}

impl<S, P, O> From<(S, P, O)> for Clause
where
    S: Into<Term>,
    P: Into<Term>,
    O: Into<Term>,
{
    fn from((s, p, o): (S, P, O)) -> Self {
        Self::new(s, p, o)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [s, p, o] = &self.0;
        write!(f, "{s} {p} {o}")
    }
}

// =============================================================================
// FILTER
// =============================================================================

/// Criteria for `find`: attributes an entity must have, and attributes
/// that must equal given values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    has: Vec<String>,
    eq: Vec<(String, Value)>,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the attribute to be present.
    #[must_use]
    pub fn has(mut self, attribute: impl Into<String>) -> Self {
        self.has.push(attribute.into());
        self
    }

    /// Require the attribute to equal `value`.
    #[must_use]
    pub fn eq(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((attribute.into(), value.into()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.has.is_empty() && self.eq.is_empty()
    }

    fn clauses(&self) -> Vec<Clause> {
        let subject = || Term::Var("subject".to_string());
        self.has
            .iter()
            .map(|attribute| Clause::new(subject(), Term::Const(attribute.into()), Term::Any))
            .chain(self.eq.iter().map(|(attribute, value)| {
                Clause::new(subject(), Term::Const(attribute.into()), value.clone())
            }))
            .collect()
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// A graph of facts over a store.
pub struct Graph<S: FactStore = StorageBackend> {
    store: S,
    ids: SharedIds,
}

impl<S: FactStore + fmt::Debug> fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Graph<StorageBackend> {
    /// Open the graph for a location; see `facts_of`.
    pub fn open(location: Option<&Path>, ids: SharedIds) -> Result<Self, FactGraphError> {
        let store = facts_of(location, std::sync::Arc::clone(&ids))?;
        Ok(Self::new(store, ids))
    }

    /// A fresh in-memory graph with random ids.
    #[must_use]
    pub fn memory() -> Self {
        let ids = random_ids();
        let store = MemoryFactStore::new(std::sync::Arc::clone(&ids));
        Self::new(StorageBackend::InMemory(store), ids)
    }
}

impl<S: FactStore> Graph<S> {
    /// Wrap a store. `ids` names the structures `add` creates.
    pub fn new(store: S, ids: SharedIds) -> Self {
        Self { store, ids }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Initialize the store. Destructive.
    pub fn setup(&mut self) -> Result<(), FactGraphError> {
        self.store.setup()
    }

    /// Digest and store `data`.
    ///
    /// Returns the id of the top-level structure, or the scalar itself when
    /// `data` is a bare scalar (which stores nothing).
    pub fn add(&mut self, data: &Data) -> Result<Value, FactGraphError> {
        let mut digester = Digester::new(std::sync::Arc::clone(&self.ids));
        let top = digester.digest(data)?;
        let facts = digester.into_facts();
        self.store.add(&facts)?;
        debug!(facts = facts.len(), %top, "added data");
        Ok(top)
    }

    /// The attributes of one entity, or `None` if it has no facts.
    pub fn get(&self, id: &str) -> Result<Option<Entity>, FactGraphError> {
        self.store.get(id)
    }

    /// The entities among `ids` that exist, sorted by id.
    pub fn get_many<I, T>(&self, ids: I) -> Result<Vec<Entity>, FactGraphError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let sorted: BTreeSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        let mut entities = Vec::with_capacity(sorted.len());
        for id in &sorted {
            if let Some(entity) = self.store.get(id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Rebuild the full nested structure rooted at `id`, following every
    /// reference to another entity.
    pub fn fetch(&self, id: &str) -> Result<Option<Data>, FactGraphError> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut pending = vec![id.to_string()];
        let mut facts = Vec::new();
        while let Some(next) = pending.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            let found = self.store.matching(&Pattern::any().entity(next))?;
            pending.extend(
                found
                    .iter()
                    .filter_map(|fact| fact.value.as_str())
                    .filter(|value| !seen.contains(*value))
                    .map(str::to_string),
            );
            facts.extend(found);
        }
        undigested_from(&facts, id)
    }

    /// Remove every fact matching `pattern`, returning how many matched.
    pub fn delete(&mut self, pattern: &Pattern) -> Result<usize, FactGraphError> {
        let facts = self.store.matching(pattern)?;
        self.store.remove(&facts)?;
        debug!(shape = ?pattern.shape(), removed = facts.len(), "deleted facts");
        Ok(facts.len())
    }

    /// All facts matching `pattern`.
    pub fn matching(&self, pattern: &Pattern) -> Result<Vec<Fact>, FactGraphError> {
        self.store.matching(pattern)
    }

    /// Run a conjunctive query. An empty clause list has no results.
    pub fn query(&self, clauses: &[Clause]) -> Result<Vec<Binding>, FactGraphError> {
        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let mut bindings = vec![BTreeMap::new()];
        for clause in clauses {
            let Some(pattern) = clause.pattern() else {
                return Ok(Vec::new());
            };
            let facts = self.store.matching(&pattern)?;
            bindings = bindings
                .iter()
                .flat_map(|binding| facts.iter().filter_map(|fact| clause.unify(binding, fact)))
                .collect();
            if bindings.is_empty() {
                break;
            }
        }
        debug!(clauses = clauses.len(), results = bindings.len(), "query");

        Ok(bindings
            .into_iter()
            .map(|binding| {
                binding
                    .into_iter()
                    .filter_map(|(key, value)| key.strip_prefix('?').map(|name| (name.to_string(), value)))
                    .collect()
            })
            .collect())
    }

    /// Entities satisfying the filter, sorted by id.
    pub fn find(&self, filter: &Filter) -> Result<Vec<Entity>, FactGraphError> {
        let subjects: BTreeSet<String> = self
            .query(&filter.clauses())?
            .into_iter()
            .filter_map(|mut binding| match binding.remove("subject") {
                Some(Value::Str(id)) => Some(id),
                _ => None,
            })
            .collect();
        self.get_many(subjects)
    }

    /// The first entity `find` would return.
    pub fn first(&self, filter: &Filter) -> Result<Option<Entity>, FactGraphError> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Whether any entity satisfies the filter.
    pub fn exists(&self, filter: &Filter) -> Result<bool, FactGraphError> {
        Ok(self.first(filter)?.is_some())
    }

    /// Total number of facts.
    pub fn len(&self) -> Result<usize, FactGraphError> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool, FactGraphError> {
        self.store.is_empty()
    }

    /// Remove every fact.
    pub fn clear(&mut self) -> Result<(), FactGraphError> {
        self.store.clear()
    }
}

// =============================================================================
// TESTS
// =============================================================================
