//! # Blob Buckets
//!
//! Key-addressed storage for binary payloads too large to live in the fact
//! table. The fact store writes `Value::Stream` payloads here and keeps only
//! the returned key.
//!
//! Keys come from the bucket's id generator. A generated key that already
//! exists is a hard error (`DuplicateKey`); missing keys on the read path
//! return `None`.

use crate::ids::SharedIds;
use crate::{Blob, FactGraphError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Storage for opaque binary payloads.
pub trait Bucket {
    /// Store bytes under a fresh key.
    fn put(&mut self, bytes: &[u8]) -> Result<String, FactGraphError>;

    /// The bytes stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FactGraphError>;

    /// Drain a reader into storage under a fresh key.
    fn puts(&mut self, reader: &mut dyn Read) -> Result<String, FactGraphError>;

    /// A readable blob for `key`, if any.
    fn gets(&self, key: &str) -> Result<Option<Blob>, FactGraphError> {
        Ok(self.get(key)?.map(|bytes| Blob::stored(key, bytes)))
    }

    /// Remove `key`. Removing a missing key does nothing.
    fn delete(&mut self, key: &str) -> Result<(), FactGraphError>;

    fn exists(&self, key: &str) -> Result<bool, FactGraphError>;

    fn keys(&self) -> Result<Vec<String>, FactGraphError>;

    /// Remove every stored payload.
    fn clear(&mut self) -> Result<(), FactGraphError> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

// =============================================================================
// MEMORY BUCKET
// =============================================================================

/// A process-local bucket backed by a map.
pub struct MemoryBucket {
    ids: SharedIds,
    items: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for MemoryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucket")
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl MemoryBucket {
    #[must_use]
    pub fn new(ids: SharedIds) -> Self {
        Self {
            ids,
            items: BTreeMap::new(),
        }
    }

    fn fresh_key(&self) -> Result<String, FactGraphError> {
        let key = self.ids.new_id();
        if self.items.contains_key(&key) {
            return Err(FactGraphError::DuplicateKey(key));
        }
        Ok(key)
    }
}

impl Bucket for MemoryBucket {
    fn put(&mut self, bytes: &[u8]) -> Result<String, FactGraphError> {
        let key = self.fresh_key()?;
        self.items.insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FactGraphError> {
        Ok(self.items.get(key).cloned())
    }

    fn puts(&mut self, reader: &mut dyn Read) -> Result<String, FactGraphError> {
        let key = self.fresh_key()?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.items.insert(key.clone(), bytes);
        Ok(key)
    }

    fn delete(&mut self, key: &str) -> Result<(), FactGraphError> {
        self.items.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, FactGraphError> {
        Ok(self.items.contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>, FactGraphError> {
        Ok(self.items.keys().cloned().collect())
    }

    fn clear(&mut self) -> Result<(), FactGraphError> {
        self.items.clear();
        Ok(())
    }
}

// =============================================================================
// FILE BUCKET
// =============================================================================

/// A durable bucket storing one file per key inside a directory.
///
/// Keys become file names. A key that is empty, `.` or `..`, or that
/// contains a path separator, is rejected with `InvalidKey`.
pub struct FileBucket {
    path: PathBuf,
    ids: SharedIds,
}

impl std::fmt::Debug for FileBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBucket")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileBucket {
    /// Open a bucket at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>, ids: SharedIds) -> Result<Self, FactGraphError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path, ids })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn item_path(&self, key: &str) -> Result<PathBuf, FactGraphError> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(FactGraphError::InvalidKey(key.to_string()));
        }
        Ok(self.path.join(key))
    }

    /// Create the file for a fresh key, failing if it already exists.
    fn create(&self) -> Result<(String, fs::File), FactGraphError> {
        let key = self.ids.new_id();
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.item_path(&key)?)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => FactGraphError::DuplicateKey(key.clone()),
                _ => FactGraphError::from(e),
            })?;
        Ok((key, file))
    }
}

impl Bucket for FileBucket {
    fn put(&mut self, bytes: &[u8]) -> Result<String, FactGraphError> {
        let (key, mut file) = self.create()?;
        io::Write::write_all(&mut file, bytes)?;
        Ok(key)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, FactGraphError> {
        match fs::read(self.item_path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn puts(&mut self, reader: &mut dyn Read) -> Result<String, FactGraphError> {
        let (key, mut file) = self.create()?;
        io::copy(reader, &mut file)?;
        Ok(key)
    }

    fn delete(&mut self, key: &str) -> Result<(), FactGraphError> {
        match fs::remove_file(self.item_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, FactGraphError> {
        Ok(self.item_path(key)?.is_file())
    }

    fn keys(&self) -> Result<Vec<String>, FactGraphError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                match entry.file_name().into_string() {
                    Ok(name) => keys.push(name),
                    Err(name) => tracing::warn!(?name, "skipping non-utf8 bucket entry"),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

// =============================================================================
// TESTS
// =============================================================================
