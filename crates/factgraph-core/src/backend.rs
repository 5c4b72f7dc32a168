//! # Storage Backends
//!
//! Selects a fact store at construction time.
//!
//! - `InMemory`: `MemoryFactStore` (fast, volatile)
//! - `Persistent`: `RedbFactStore` (disk-backed, ACID)

use crate::bucket::Bucket;
use crate::ids::SharedIds;
use crate::primitives::MEMORY_LOCATION;
use crate::storage::RedbFactStore;
use crate::store::{FactStore, MemoryFactStore};
use crate::{Entity, FactGraphError, Fact, Pattern};
use std::path::Path;

/// A fact store chosen at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory facts (fast, volatile).
    InMemory(MemoryFactStore),
    /// Disk-backed facts using redb (ACID, persistent).
    Persistent(RedbFactStore),
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbFactStore owns a database handle.

impl StorageBackend {
    /// Whether facts survive the process.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }

    /// Directory of a persistent store.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        match self {
            Self::InMemory(_) => None,
            Self::Persistent(store) => Some(store.location()),
        }
    }

    /// Keys of every stored stream payload.
    pub fn blob_keys(&self) -> Result<Vec<String>, FactGraphError> {
        match self {
            Self::InMemory(store) => store.bucket().keys(),
            Self::Persistent(store) => store.bucket().keys(),
        }
    }

    /// Compact the database file; a no-op in memory.
    pub fn compact(&mut self) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(_) => Ok(()),
            Self::Persistent(store) => store.compact(),
        }
    }
}

impl FactStore for StorageBackend {
    fn setup(&mut self) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(store) => store.setup(),
            Self::Persistent(store) => store.setup(),
        }
    }

    fn add(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(store) => store.add(facts),
            Self::Persistent(store) => store.add(facts),
        }
    }

    fn remove(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(store) => store.remove(facts),
            Self::Persistent(store) => store.remove(facts),
        }
    }

    fn matching(&self, pattern: &Pattern) -> Result<Vec<Fact>, FactGraphError> {
        match self {
            Self::InMemory(store) => store.matching(pattern),
            Self::Persistent(store) => store.matching(pattern),
        }
    }

    fn clear(&mut self) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(store) => store.clear(),
            Self::Persistent(store) => store.clear(),
        }
    }

    fn len(&self) -> Result<usize, FactGraphError> {
        match self {
            Self::InMemory(store) => store.len(),
            Self::Persistent(store) => store.len(),
        }
    }

    fn new_id(&self) -> String {
        match self {
            Self::InMemory(store) => store.new_id(),
            Self::Persistent(store) => store.new_id(),
        }
    }

    fn put(&mut self, entity: &Entity) -> Result<String, FactGraphError> {
        match self {
            Self::InMemory(store) => store.put(entity),
            Self::Persistent(store) => store.put(entity),
        }
    }

    fn get(&self, id: &str) -> Result<Option<Entity>, FactGraphError> {
        match self {
            Self::InMemory(store) => store.get(id),
            Self::Persistent(store) => store.get(id),
        }
    }

    fn delete(&mut self, id: &str) -> Result<(), FactGraphError> {
        match self {
            Self::InMemory(store) => store.delete(id),
            Self::Persistent(store) => store.delete(id),
        }
    }
}

/// Open the fact store for a location.
///
/// `None` or `":memory:"` gives a fresh in-memory store. An existing
/// directory gives a persistent store inside it. Anything else is
/// `NotARepository`.
pub fn facts_of(location: Option<&Path>, ids: SharedIds) -> Result<StorageBackend, FactGraphError> {
    match location {
        None => Ok(StorageBackend::InMemory(MemoryFactStore::new(ids))),
        Some(path) if path.as_os_str() == MEMORY_LOCATION => {
            Ok(StorageBackend::InMemory(MemoryFactStore::new(ids)))
        }
        Some(path) if path.is_dir() => Ok(StorageBackend::Persistent(RedbFactStore::open(
            path, ids,
        )?)),
        Some(path) => Err(FactGraphError::NotARepository(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::sequential_ids;

    #[test]
    fn memory_locations() {
        let none = facts_of(None, sequential_ids()).expect("memory");
        assert!(!none.is_persistent());
        let named = facts_of(Some(Path::new(":memory:")), sequential_ids()).expect("memory");
        assert!(!named.is_persistent());
        assert!(named.location().is_none());
    }

    #[test]
    fn directory_opens_persistent_store() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut store = facts_of(Some(temp.path()), sequential_ids()).expect("persistent");
        assert!(store.is_persistent());
        assert_eq!(store.location(), Some(temp.path()));
        store.add(&[Fact::new("1", "name", "Joe")]).expect("add");
        store.compact().expect("compact");
        assert_eq!(store.len().expect("len"), 1);
    }

    #[test]
    fn missing_directory_is_not_a_repository() {
        let temp = tempfile::tempdir().expect("temp dir");
        let missing = temp.path().join("nowhere");
        let err = facts_of(Some(&missing), sequential_ids()).expect_err("not a repo");
        assert!(matches!(err, FactGraphError::NotARepository(path) if path == missing));
    }
}
