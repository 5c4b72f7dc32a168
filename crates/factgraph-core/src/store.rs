//! # Fact Store
//!
//! The storage contract shared by every backend, and the in-memory backend.
//!
//! All fallible operations return `Result<T, FactGraphError>` so the
//! in-memory and persistent backends can be driven through one trait.
//!
//! ## Null values
//!
//! A fact whose value is `Value::Null` is never stored. Adding one deletes
//! every stored value of that attribute on that entity, so writing null is
//! the same as deleting the attribute.
//!
//! ## Streams
//!
//! `Value::Stream` payloads are written through the store's bucket on the
//! way in; the fact keeps only the bucket key. Reads resolve the key back
//! into a `Blob` that remembers it, so a fact read from the store can be
//! passed straight back to `remove`.

use crate::bucket::{Bucket, MemoryBucket};
use crate::ids::SharedIds;
use crate::{Blob, Entity, FactGraphError, Fact, Pattern, Value, codec};
use tracing::{debug, warn};

// =============================================================================
// FACTSTORE TRAIT
// =============================================================================

/// Operations every fact store backend provides.
///
/// Reads of missing ids return `None` or an empty list; writes fail eagerly
/// and a failed batch writes nothing.
pub trait FactStore {
    /// Initialize storage. Destructive: existing facts are dropped.
    fn setup(&mut self) -> Result<(), FactGraphError>;

    /// Append facts in order. Null values delete the attribute instead.
    fn add(&mut self, facts: &[Fact]) -> Result<(), FactGraphError>;

    /// Delete every stored copy of each given triple. Absent triples are ignored.
    fn remove(&mut self, facts: &[Fact]) -> Result<(), FactGraphError>;

    /// All stored facts matching the pattern, in insertion order.
    fn matching(&self, pattern: &Pattern) -> Result<Vec<Fact>, FactGraphError>;

    /// Remove every fact and every stored blob.
    fn clear(&mut self) -> Result<(), FactGraphError>;

    /// Total number of stored facts.
    fn len(&self) -> Result<usize, FactGraphError>;

    /// A fresh id from the store's generator.
    fn new_id(&self) -> String;

    fn is_empty(&self) -> Result<bool, FactGraphError> {
        Ok(self.len()? == 0)
    }

    /// Every stored fact.
    fn facts(&self) -> Result<Vec<Fact>, FactGraphError> {
        self.matching(&Pattern::any())
    }

    /// Store every non-null attribute of an entity, returning its id.
    ///
    /// The id is the entity's string `uid` attribute when present, otherwise
    /// a fresh one. Attributes are merged into any facts already stored
    /// under that id.
    fn put(&mut self, entity: &Entity) -> Result<String, FactGraphError> {
        let id = entity
            .uid()
            .map_or_else(|| self.new_id(), str::to_string);
        let facts: Vec<Fact> = entity
            .iter()
            .map(|(attribute, value)| Fact::new(id.as_str(), attribute.as_str(), value.clone()))
            .collect();
        self.add(&facts)?;
        Ok(id)
    }

    /// Reconstruct an entity from its facts, or `None` if it has none.
    ///
    /// When one attribute has several values the last stored wins.
    fn get(&self, id: &str) -> Result<Option<Entity>, FactGraphError> {
        let facts = self.matching(&Pattern::any().entity(id))?;
        if facts.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            facts
                .into_iter()
                .map(|fact| (fact.attribute, fact.value))
                .collect(),
        ))
    }

    /// Remove every fact about an entity.
    fn delete(&mut self, id: &str) -> Result<(), FactGraphError> {
        let facts = self.matching(&Pattern::any().entity(id))?;
        self.remove(&facts)
    }
}

/// Read a stream value back out of a bucket.
pub(crate) fn resolve_blob(bucket: &dyn Bucket, key: &str) -> Result<Value, FactGraphError> {
    bucket
        .gets(key)?
        .map(Value::Stream)
        .ok_or_else(|| FactGraphError::MissingBlob(key.to_string()))
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

/// A stored value: inline, or the key of a payload in the bucket.
#[derive(Debug, Clone)]
enum Stored {
    Inline(Value),
    Blob(String),
}

#[derive(Debug, Clone)]
struct StoredFact {
    entity: String,
    attribute: String,
    value: Stored,
    /// `codec::index_key` of the value, the same key the redb indexes use.
    key: String,
}

impl StoredFact {
    fn new(fact: &Fact, value: Stored, key: String) -> Self {
        Self {
            entity: fact.entity.clone(),
            attribute: fact.attribute.clone(),
            value,
            key,
        }
    }

    fn matches(&self, entity: Option<&str>, attribute: Option<&str>, key: Option<&str>) -> bool {
        entity.is_none_or(|e| e == self.entity)
            && attribute.is_none_or(|a| a == self.attribute)
            && key.is_none_or(|k| k == self.key)
    }
}

/// One fact of a batch after its value has been checked.
enum Pending<'a> {
    Erase,
    Inline(Value, String),
    Stream(&'a Blob),
}

/// One write of a batch, ready to apply.
enum Staged {
    Insert(StoredFact),
    Erase { entity: String, attribute: String },
}

/// The in-memory fact store.
///
/// Facts live in one flat sequence in insertion order and every query is a
/// linear filter over it. Values are kept in their stored form and compared
/// by index key, so results agree with the persistent backend. Streams go
/// to a `MemoryBucket` sharing the store's id generator.
pub struct MemoryFactStore {
    facts: Vec<StoredFact>,
    bucket: MemoryBucket,
    ids: SharedIds,
}

impl std::fmt::Debug for MemoryFactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFactStore")
            .field("facts", &self.facts.len())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl MemoryFactStore {
    #[must_use]
    pub fn new(ids: SharedIds) -> Self {
        Self {
            facts: Vec::new(),
            bucket: MemoryBucket::new(std::sync::Arc::clone(&ids)),
            ids,
        }
    }

    /// The bucket holding this store's stream payloads.
    #[must_use]
    pub fn bucket(&self) -> &MemoryBucket {
        &self.bucket
    }

    fn load(&self, fact: &StoredFact) -> Result<Fact, FactGraphError> {
        let value = match &fact.value {
            Stored::Inline(value) => value.clone(),
            Stored::Blob(key) => resolve_blob(&self.bucket, key)?,
        };
        Ok(Fact::new(fact.entity.as_str(), fact.attribute.as_str(), value))
    }

    /// Check every inline value, then write stream payloads. Nothing in the
    /// fact list changes here; a failure deletes the payloads written so far.
    fn stage(&mut self, facts: &[Fact]) -> Result<Vec<Staged>, FactGraphError> {
        let mut pending = Vec::with_capacity(facts.len());
        for fact in facts {
            pending.push(match &fact.value {
                Value::Null => Pending::Erase,
                Value::Stream(blob) => Pending::Stream(blob),
                value => {
                    let stored = codec::normalize(value).map_err(|e| e.for_attribute(&fact.attribute))?;
                    let key = codec::index_key(&stored)?;
                    Pending::Inline(stored, key)
                }
            });
        }

        let mut staged = Vec::with_capacity(facts.len());
        for (fact, pending) in facts.iter().zip(pending) {
            let step = match pending {
                Pending::Erase => Staged::Erase {
                    entity: fact.entity.clone(),
                    attribute: fact.attribute.clone(),
                },
                Pending::Inline(value, key) => {
                    Staged::Insert(StoredFact::new(fact, Stored::Inline(value), key))
                }
                Pending::Stream(blob) => match self.bucket.puts(&mut blob.reader()) {
                    Ok(bucket_key) => {
                        let key = codec::stream_key(&bucket_key);
                        Staged::Insert(StoredFact::new(fact, Stored::Blob(bucket_key), key))
                    }
                    Err(e) => {
                        self.discard(&staged);
                        return Err(e);
                    }
                },
            };
            staged.push(step);
        }
        Ok(staged)
    }

    /// Delete the payloads of a staged batch that will not be applied.
    fn discard(&mut self, staged: &[Staged]) {
        for step in staged {
            if let Staged::Insert(StoredFact {
                value: Stored::Blob(key),
                ..
            }) = step
            {
                if let Err(e) = self.bucket.delete(key) {
                    warn!(key = %key, error = %e, "failed to discard staged blob");
                }
            }
        }
    }

    /// Drop facts matching `doomed`, collecting the bucket keys they held.
    fn erase(&mut self, doomed: impl Fn(&StoredFact) -> bool, orphans: &mut Vec<String>) {
        self.facts.retain(|fact| {
            if !doomed(fact) {
                return true;
            }
            if let Stored::Blob(key) = &fact.value {
                orphans.push(key.clone());
            }
            false
        });
    }

    fn release(&mut self, orphans: &[String]) -> Result<(), FactGraphError> {
        for key in orphans {
            self.bucket.delete(key)?;
        }
        Ok(())
    }
}

impl FactStore for MemoryFactStore {
    fn setup(&mut self) -> Result<(), FactGraphError> {
        self.clear()
    }

    fn add(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        let staged = self.stage(facts)?;

        let mut orphans = Vec::new();
        for step in staged {
            match step {
                Staged::Erase { entity, attribute } => self.erase(
                    |f| f.entity == entity && f.attribute == attribute,
                    &mut orphans,
                ),
                Staged::Insert(fact) => self.facts.push(fact),
            }
        }
        self.release(&orphans)?;
        debug!(count = facts.len(), total = self.facts.len(), "added facts");
        Ok(())
    }

    fn remove(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        let before = self.facts.len();
        let mut orphans = Vec::new();
        for fact in facts {
            // Values that cannot be encoded were never stored.
            let Ok(key) = codec::index_key(&fact.value) else {
                continue;
            };
            self.erase(
                |f| f.matches(Some(fact.entity.as_str()), Some(fact.attribute.as_str()), Some(key.as_str())),
                &mut orphans,
            );
        }
        self.release(&orphans)?;
        debug!(removed = before - self.facts.len(), blobs = orphans.len(), "removed facts");
        Ok(())
    }

    fn matching(&self, pattern: &Pattern) -> Result<Vec<Fact>, FactGraphError> {
        let key = match &pattern.value {
            None => None,
            Some(value) => match codec::index_key(value) {
                Ok(key) => Some(key),
                Err(_) => return Ok(Vec::new()),
            },
        };
        self.facts
            .iter()
            .filter(|fact| {
                fact.matches(
                    pattern.entity.as_deref(),
                    pattern.attribute.as_deref(),
                    key.as_deref(),
                )
            })
            .map(|fact| self.load(fact))
            .collect()
    }

    fn clear(&mut self) -> Result<(), FactGraphError> {
        self.facts.clear();
        self.bucket.clear()
    }

    fn len(&self) -> Result<usize, FactGraphError> {
        Ok(self.facts.len())
    }

    fn new_id(&self) -> String {
        self.ids.new_id()
    }
}

// =============================================================================
// TESTS
// =============================================================================
