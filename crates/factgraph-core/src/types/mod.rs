//! # Core Type Definitions
//!
//! This module contains all core types for the factgraph store:
//! - Scalar values (`Value`, `Blob`)
//! - The atomic storage unit (`Fact`) and its query form (`Pattern`, `Shape`)
//! - Reconstructed records (`Entity`)
//! - Error types (`FactGraphError`)
//!
//! ## Value Model
//!
//! Every fact carries exactly one scalar. Nested structures never reach this
//! layer directly; the digester flattens them into facts whose values are
//! scalars or the string ids of other entities.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::fmt;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// BLOB
// =============================================================================

/// An opaque binary payload read through the `std::io::Read` interface.
///
/// Blobs are never stored inline: the fact store writes them through its
/// bucket and keeps only the bucket key in the fact table. A blob read back
/// from a store remembers that key, so the fact holding it can be matched
/// and removed. Equality compares payload bytes only.
#[derive(Debug, Clone, Default)]
pub struct Blob {
    key: Option<String>,
    bytes: Vec<u8>,
}

impl Blob {
    /// Create a blob that owns the given bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key: None,
            bytes: bytes.into(),
        }
    }

    /// A blob already persisted under `key`.
    #[must_use]
    pub fn stored(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            bytes: bytes.into(),
        }
    }

    /// Drain a reader into a new blob.
    pub fn from_reader(reader: &mut dyn Read) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::new(bytes))
    }

    /// A fresh reader positioned at the start of the payload.
    #[must_use]
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.bytes.as_slice())
    }

    /// Bucket key, if this blob came out of a store.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Blob {}

// =============================================================================
// VALUE
// =============================================================================

/// A scalar value stored in the object position of a fact.
///
/// The variant set is closed: the Value Codec matches on it exhaustively and
/// every variant has a persisted type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bool(bool),
    /// Absent value. Never persisted; adding a null fact is a no-op.
    Null,
    /// Streamed payload, offloaded to the blob bucket on write.
    Stream(Blob),
}

impl Value {
    /// Name of the runtime type, identical to the codec's persisted tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Bool(_) => "bool",
            Self::Null => "none",
            Self::Stream(_) => "stream",
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The string content, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Stream(blob) => Some(blob),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::Stream(blob) => write!(f, "<stream of {} bytes>", blob.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Blob> for Value {
    fn from(blob: Blob) -> Self {
        Self::Stream(blob)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

// =============================================================================
// FACT
// =============================================================================

/// The atomic storage unit: `(entity, attribute, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    /// Opaque id of the entity this fact describes.
    pub entity: String,
    /// Attribute name. `"includes"` marks list membership.
    pub attribute: String,
    /// The scalar value or the id of another entity.
    pub value: Value,
}

impl Fact {
    /// Create a new fact.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Whether this fact records list membership.
    #[must_use]
    pub fn is_membership(&self) -> bool {
        self.attribute == crate::primitives::INCLUDES
    }
}

impl<E, A, V> From<(E, A, V)> for Fact
where
    E: Into<String>,
    A: Into<String>,
    V: Into<Value>,
{
    fn from((entity, attribute, value): (E, A, V)) -> Self {
        Self::new(entity, attribute, value)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?}, {})", self.entity, self.attribute, self.value)
    }
}

// =============================================================================
// PATTERN
// =============================================================================

/// Which positions of a pattern are bound.
///
/// Named `s`/`n`, `p`/`n`, `o`/`n` for subject, predicate and object:
/// a letter means bound, `n` means wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Spo,
    Spn,
    Sno,
    Snn,
    Npo,
    Npn,
    Nno,
    Nnn,
}

/// A triple pattern; `None` in any position is a wildcard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pattern {
    pub entity: Option<String>,
    pub attribute: Option<String>,
    pub value: Option<Value>,
}

impl Pattern {
    /// The all-wildcard pattern.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// The pattern matching exactly one triple.
    #[must_use]
    pub fn exact(fact: &Fact) -> Self {
        Self {
            entity: Some(fact.entity.clone()),
            attribute: Some(fact.attribute.clone()),
            value: Some(fact.value.clone()),
        }
    }

    #[must_use]
    pub fn entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Bind the value position. A `Null` value leaves the position unbound.
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.value = (!value.is_null()).then_some(value);
        self
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        match (
            self.entity.is_some(),
            self.attribute.is_some(),
            self.value.is_some(),
        ) {
            (true, true, true) => Shape::Spo,
            (true, true, false) => Shape::Spn,
            (true, false, true) => Shape::Sno,
            (true, false, false) => Shape::Snn,
            (false, true, true) => Shape::Npo,
            (false, true, false) => Shape::Npn,
            (false, false, true) => Shape::Nno,
            (false, false, false) => Shape::Nnn,
        }
    }

    /// Check a fact against every bound position.
    ///
    /// Values compare in their stored form (`codec::same_value`), so NaN
    /// matches NaN and a stream matches only the blob it was stored as.
    #[must_use]
    pub fn matches(&self, fact: &Fact) -> bool {
        self.entity.as_ref().is_none_or(|e| *e == fact.entity)
            && self.attribute.as_ref().is_none_or(|a| *a == fact.attribute)
            && self
                .value
                .as_ref()
                .is_none_or(|v| crate::codec::same_value(v, &fact.value))
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// The attribute map reconstructed from all facts sharing one id.
///
/// Attributes keep insertion order for display; equality ignores order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    attributes: IndexMap<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `insert`.
    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(attribute, value);
        self
    }

    /// Set an attribute, returning the previous value.
    pub fn insert(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.attributes.insert(attribute.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.shift_remove(attribute)
    }

    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// The explicit `uid` attribute, when present as a string.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.get(crate::primitives::UID).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Entity {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entity = Self::new();
        for (k, v) in iter {
            entity.insert(k, v);
        }
        entity
    }
}

impl IntoIterator for Entity {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the factgraph store.
///
/// - Writes fail eagerly; reads of missing keys return `None` instead
/// - Nothing is retried or swallowed inside the store
#[derive(Debug, Error)]
pub enum FactGraphError {
    /// A value's type cannot be encoded or decoded.
    #[error("unsupported type <type {type_name}> in value {attribute:?}")]
    UnsupportedValueType {
        attribute: String,
        type_name: String,
    },

    /// Persisted text does not parse for its type tag.
    #[error("malformed {type_name} value: {text:?}")]
    MalformedValue { type_name: String, text: String },

    /// A bucket put targeted an existing key.
    #[error("duplicate bucket key: {0}")]
    DuplicateKey(String),

    /// A bucket key that cannot name a single item (empty, `.`, `..` or
    /// containing a path separator).
    #[error("invalid bucket key: {0:?}")]
    InvalidKey(String),

    /// A stream fact names a bucket key that no longer exists.
    #[error("missing blob: {0}")]
    MissingBlob(String),

    /// Nested input exceeded the digestion depth limit.
    #[error("data nested deeper than {0} levels")]
    DepthLimitExceeded(usize),

    /// Facts reference each other in a cycle.
    #[error("cyclic reference through entity {0}")]
    CyclicReference(String),

    /// A query clause could not be interpreted.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The location is neither in-memory nor an existing directory.
    #[error("fatal: not a factgraph repository: {0}")]
    NotARepository(PathBuf),

    /// A configuration value is missing or unreadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The storage engine reported an error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl FactGraphError {
    pub(crate) fn unsupported(attribute: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedValueType {
            attribute: attribute.into(),
            type_name: type_name.into(),
        }
    }

    /// Name the attribute on an `UnsupportedValueType` raised without one.
    #[must_use]
    pub(crate) fn for_attribute(self, attribute: &str) -> Self {
        match self {
            Self::UnsupportedValueType { type_name, .. } => {
                Self::unsupported(attribute, type_name)
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for FactGraphError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_shapes_cover_all_combinations() {
        let base = Pattern::any();
        assert_eq!(base.shape(), Shape::Nnn);
        assert_eq!(base.clone().entity("1").shape(), Shape::Snn);
        assert_eq!(base.clone().attribute("a").shape(), Shape::Npn);
        assert_eq!(base.clone().value(1).shape(), Shape::Nno);
        assert_eq!(base.clone().entity("1").attribute("a").shape(), Shape::Spn);
        assert_eq!(base.clone().entity("1").value(1).shape(), Shape::Sno);
        assert_eq!(base.clone().attribute("a").value(1).shape(), Shape::Npo);
        assert_eq!(
            base.entity("1").attribute("a").value(1).shape(),
            Shape::Spo
        );
    }

    #[test]
    fn null_pattern_value_stays_wildcard() {
        let pattern = Pattern::any().value(Value::Null);
        assert_eq!(pattern.shape(), Shape::Nnn);
    }

    #[test]
    fn pattern_matches_typed_values() {
        let fact = Fact::new("2", "age", 12);
        assert!(Pattern::any().value(12).matches(&fact));
        assert!(!Pattern::any().value("12").matches(&fact));
        assert!(!Pattern::any().value(12.0).matches(&fact));
        let nan = Fact::new("2", "ratio", f64::NAN);
        assert!(Pattern::any().value(f64::NAN).matches(&nan));
    }

    #[test]
    fn entity_equality_ignores_order() {
        let a = Entity::new().with("name", "Joe").with("age", 12);
        let b = Entity::new().with("age", 12).with("name", "Joe");
        assert_eq!(a, b);
    }

    #[test]
    fn entity_uid_requires_string() {
        assert_eq!(Entity::new().with("uid", "x1").uid(), Some("x1"));
        assert_eq!(Entity::new().with("uid", 7).uid(), None);
    }

    #[test]
    fn blob_reader_restarts() {
        let blob = Blob::new(b"image".to_vec());
        let mut first = String::new();
        blob.reader().read_to_string(&mut first).expect("read");
        let mut second = Vec::new();
        blob.reader().read_to_end(&mut second).expect("read");
        assert_eq!(first, "image");
        assert_eq!(second, b"image");
    }

    #[test]
    fn unsupported_error_names_attribute_and_type() {
        let err = FactGraphError::unsupported("tags", "list");
        assert_eq!(err.to_string(), "unsupported type <type list> in value \"tags\"");
    }
}
