//! # redb-backed Fact Storage
//!
//! A disk-backed fact store using the redb embedded database, with stream
//! payloads kept in a `FileBucket` next to the database file.
//!
//! Each fact is one postcard-encoded row `(entity, attribute, value_type,
//! value)` keyed by a monotonically increasing row id. Three index tables
//! hold every row id under the value's comparison key so that each of the
//! eight pattern shapes is answered by a single prefix range scan:
//!
//! | shape | scan |
//! |-------|------|
//! | `Spo`, `Spn`, `Snn` | `eav` |
//! | `Npo`, `Npn` | `ave` |
//! | `Sno`, `Nno` | `ve` |
//! | `Nnn` | `facts` |
//!
//! Results come back in row-id order, which is insertion order.
//!
//! Every write is a single redb write transaction. A batch is fully encoded
//! before the transaction opens, so a bad value writes nothing.

use crate::bucket::{Bucket, FileBucket};
use crate::codec::{self, TypeTag};
use crate::ids::SharedIds;
use crate::primitives::{BLOBS_DIR, FACTS_FILE};
use crate::store::{FactStore, resolve_blob};
use crate::{FactGraphError, Fact, Pattern, Value};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Table for facts: row id(u64) -> serialized `Row` bytes
const FACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("facts");

/// Index: (entity, attribute, value key, row id)
const EAV: TableDefinition<(&str, &str, &str, u64), ()> = TableDefinition::new("eav");

/// Index: (attribute, value key, row id)
const AVE: TableDefinition<(&str, &str, u64), ()> = TableDefinition::new("ave");

/// Index: (value key, entity, row id)
const VE: TableDefinition<(&str, &str, u64), ()> = TableDefinition::new("ve");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_ROW_ID: &str = "next_row_id";

/// One persisted fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row {
    entity: String,
    attribute: String,
    value_type: String,
    value: String,
}

impl Row {
    fn encode(fact: &Fact) -> Result<(Self, String), FactGraphError> {
        let (tag, value) =
            codec::encode(&fact.value).map_err(|e| e.for_attribute(&fact.attribute))?;
        let key = codec::index_key(&fact.value)?;
        let row = Self {
            entity: fact.entity.clone(),
            attribute: fact.attribute.clone(),
            value_type: tag.as_str().to_string(),
            value,
        };
        Ok((row, key))
    }

    /// A row pointing at a payload already written to the bucket.
    fn stream(fact: &Fact, bucket_key: String) -> (Self, String) {
        let key = codec::stream_key(&bucket_key);
        let row = Self {
            entity: fact.entity.clone(),
            attribute: fact.attribute.clone(),
            value_type: TypeTag::Stream.as_str().to_string(),
            value: bucket_key,
        };
        (row, key)
    }

    fn tag(&self) -> Result<TypeTag, FactGraphError> {
        TypeTag::from_str(&self.value_type).map_err(|e| e.for_attribute(&self.attribute))
    }

    /// The index key this row was filed under.
    fn index_key(&self) -> Result<String, FactGraphError> {
        match self.tag()? {
            TypeTag::Stream => Ok(codec::stream_key(&self.value)),
            tag => codec::index_key(&codec::decode(tag, &self.value)?),
        }
    }
}

fn storage_error(e: impl Display) -> FactGraphError {
    FactGraphError::StorageError(e.to_string())
}

fn to_bytes(row: &Row) -> Result<Vec<u8>, FactGraphError> {
    postcard::to_allocvec(row).map_err(|e| FactGraphError::SerializationError(e.to_string()))
}

fn from_bytes(bytes: &[u8]) -> Result<Row, FactGraphError> {
    postcard::from_bytes(bytes).map_err(|e| FactGraphError::SerializationError(e.to_string()))
}

/// A write to apply inside one transaction.
enum Op {
    Insert { row: Row, key: String },
    Erase { entity: String, attribute: String },
}

/// The fact table and its indexes, open inside one write transaction.
struct Tables<'txn> {
    facts: Table<'txn, u64, &'static [u8]>,
    eav: Table<'txn, (&'static str, &'static str, &'static str, u64), ()>,
    ave: Table<'txn, (&'static str, &'static str, u64), ()>,
    ve: Table<'txn, (&'static str, &'static str, u64), ()>,
}

impl<'txn> Tables<'txn> {
    fn open(write_txn: &'txn WriteTransaction) -> Result<Self, FactGraphError> {
        Ok(Self {
            facts: write_txn.open_table(FACTS).map_err(storage_error)?,
            eav: write_txn.open_table(EAV).map_err(storage_error)?,
            ave: write_txn.open_table(AVE).map_err(storage_error)?,
            ve: write_txn.open_table(VE).map_err(storage_error)?,
        })
    }

    fn insert(&mut self, id: u64, row: &Row, key: &str) -> Result<(), FactGraphError> {
        let bytes = to_bytes(row)?;
        self.facts
            .insert(id, bytes.as_slice())
            .map_err(storage_error)?;
        self.eav
            .insert((row.entity.as_str(), row.attribute.as_str(), key, id), ())
            .map_err(storage_error)?;
        self.ave
            .insert((row.attribute.as_str(), key, id), ())
            .map_err(storage_error)?;
        self.ve
            .insert((key, row.entity.as_str(), id), ())
            .map_err(storage_error)?;
        Ok(())
    }

    /// Remove rows by id from the fact table and all three indexes,
    /// collecting the bucket keys of erased stream rows into `orphans`.
    fn erase(&mut self, rows: &[u64], orphans: &mut Vec<String>) -> Result<usize, FactGraphError> {
        let mut erased = 0;
        for &id in rows {
            let Some(row) = self
                .facts
                .remove(id)
                .map_err(storage_error)?
                .map(|bytes| from_bytes(bytes.value()))
                .transpose()?
            else {
                continue;
            };
            let key = row.index_key()?;
            self.eav
                .remove((row.entity.as_str(), row.attribute.as_str(), key.as_str(), id))
                .map_err(storage_error)?;
            self.ave
                .remove((row.attribute.as_str(), key.as_str(), id))
                .map_err(storage_error)?;
            self.ve
                .remove((key.as_str(), row.entity.as_str(), id))
                .map_err(storage_error)?;
            if row.tag()? == TypeTag::Stream {
                orphans.push(row.value);
            }
            erased += 1;
        }
        Ok(erased)
    }
}

// =============================================================================
// PREFIX SCANS
// =============================================================================

fn scan_eav<T>(
    table: &T,
    entity: &str,
    attribute: Option<&str>,
    key: Option<&str>,
) -> Result<Vec<u64>, FactGraphError>
where
    T: ReadableTable<(&'static str, &'static str, &'static str, u64), ()>,
{
    let start = (entity, attribute.unwrap_or(""), key.unwrap_or(""), 0u64);
    let mut rows = Vec::new();
    for entry in table.range(start..).map_err(storage_error)? {
        let (k, _) = entry.map_err(storage_error)?;
        let (e, a, v, row) = k.value();
        if e != entity
            || attribute.is_some_and(|attribute| a != attribute)
            || key.is_some_and(|key| v != key)
        {
            break;
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Scan a two-column index (`ave` or `ve`) by its first column and, when
/// given, its second.
fn scan_pair<T>(table: &T, first: &str, second: Option<&str>) -> Result<Vec<u64>, FactGraphError>
where
    T: ReadableTable<(&'static str, &'static str, u64), ()>,
{
    let start = (first, second.unwrap_or(""), 0u64);
    let mut rows = Vec::new();
    for entry in table.range(start..).map_err(storage_error)? {
        let (k, _) = entry.map_err(storage_error)?;
        let (f, s, row) = k.value();
        if f != first || second.is_some_and(|second| s != second) {
            break;
        }
        rows.push(row);
    }
    Ok(rows)
}

// =============================================================================
// REDB FACT STORE
// =============================================================================

/// A disk-backed fact store using redb.
pub struct RedbFactStore {
    /// The redb database handle.
    db: Database,
    /// Stream payloads.
    bucket: FileBucket,
    ids: SharedIds,
    /// Directory holding the database file and the bucket.
    location: PathBuf,
    /// Next available row id.
    next_row_id: u64,
}

impl std::fmt::Debug for RedbFactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbFactStore")
            .field("location", &self.location)
            .field("next_row_id", &self.next_row_id)
            .finish_non_exhaustive()
    }
}

impl RedbFactStore {
    /// Open or create a fact store inside the given directory.
    ///
    /// The database lives at `<dir>/facts.redb` and stream payloads under
    /// `<dir>/blobs`. Missing tables are created; existing facts are kept.
    pub fn open(dir: impl AsRef<Path>, ids: SharedIds) -> Result<Self, FactGraphError> {
        let location = dir.as_ref().to_path_buf();
        let db = Database::create(location.join(FACTS_FILE)).map_err(storage_error)?;
        let bucket = FileBucket::open(location.join(BLOBS_DIR), std::sync::Arc::clone(&ids))?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(storage_error)?;
        Self::open_tables(&write_txn)?;
        write_txn.commit().map_err(storage_error)?;

        let next_row_id = {
            let read_txn = db.begin_read().map_err(storage_error)?;
            let table = read_txn.open_table(METADATA).map_err(storage_error)?;
            table
                .get(NEXT_ROW_ID)
                .map_err(storage_error)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        debug!(location = %location.display(), next_row_id, "opened fact store");
        Ok(Self {
            db,
            bucket,
            ids,
            location,
            next_row_id,
        })
    }

    /// Directory holding the database and its blobs.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The bucket holding this store's stream payloads.
    #[must_use]
    pub fn bucket(&self) -> &FileBucket {
        &self.bucket
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), FactGraphError> {
        self.db.compact().map_err(storage_error)?;
        Ok(())
    }

    fn open_tables(write_txn: &WriteTransaction) -> Result<(), FactGraphError> {
        write_txn.open_table(FACTS).map_err(storage_error)?;
        write_txn.open_table(EAV).map_err(storage_error)?;
        write_txn.open_table(AVE).map_err(storage_error)?;
        write_txn.open_table(VE).map_err(storage_error)?;
        write_txn.open_table(METADATA).map_err(storage_error)?;
        Ok(())
    }

    /// Drop and recreate every table.
    fn reset(&mut self) -> Result<(), FactGraphError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        write_txn.delete_table(FACTS).map_err(storage_error)?;
        write_txn.delete_table(EAV).map_err(storage_error)?;
        write_txn.delete_table(AVE).map_err(storage_error)?;
        write_txn.delete_table(VE).map_err(storage_error)?;
        write_txn.delete_table(METADATA).map_err(storage_error)?;
        Self::open_tables(&write_txn)?;
        write_txn.commit().map_err(storage_error)?;
        self.next_row_id = 0;
        Ok(())
    }

    /// Encode a batch into write operations, writing stream payloads to the
    /// bucket only once every inline value has encoded cleanly. If a payload
    /// write fails, the payloads already written are deleted.
    fn plan(&mut self, facts: &[Fact]) -> Result<Vec<Op>, FactGraphError> {
        let mut inline = Vec::with_capacity(facts.len());
        for fact in facts {
            inline.push(match fact.value {
                Value::Null | Value::Stream(_) => None,
                _ => Some(Row::encode(fact)?),
            });
        }

        let mut ops = Vec::with_capacity(facts.len());
        for (fact, encoded) in facts.iter().zip(inline) {
            let op = match (&fact.value, encoded) {
                (_, Some((row, key))) => Op::Insert { row, key },
                (Value::Stream(blob), None) => match self.bucket.puts(&mut blob.reader()) {
                    Ok(bucket_key) => {
                        let (row, key) = Row::stream(fact, bucket_key);
                        Op::Insert { row, key }
                    }
                    Err(e) => {
                        self.discard(&ops);
                        return Err(e);
                    }
                },
                (_, None) => Op::Erase {
                    entity: fact.entity.clone(),
                    attribute: fact.attribute.clone(),
                },
            };
            ops.push(op);
        }
        Ok(ops)
    }

    /// Delete the payloads written for a batch that was not committed.
    fn discard(&mut self, ops: &[Op]) {
        for op in ops {
            let Op::Insert { row, .. } = op else {
                continue;
            };
            if row.value_type != TypeTag::Stream.as_str() {
                continue;
            }
            if let Err(e) = self.bucket.delete(&row.value) {
                warn!(key = %row.value, error = %e, "failed to discard staged blob");
            }
        }
    }

    /// Delete the payloads of erased stream rows.
    fn release(&mut self, orphans: &[String]) -> Result<(), FactGraphError> {
        for key in orphans {
            self.bucket.delete(key)?;
        }
        Ok(())
    }

    /// Apply planned operations in one write transaction, returning the
    /// next row id and the bucket keys of erased stream rows.
    fn commit(&self, ops: &[Op]) -> Result<(u64, Vec<String>), FactGraphError> {
        let mut next_id = self.next_row_id;
        let mut orphans = Vec::new();

        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut tables = Tables::open(&write_txn)?;
            for op in ops {
                match op {
                    Op::Erase { entity, attribute } => {
                        let rows = scan_eav(&tables.eav, entity, Some(attribute), None)?;
                        tables.erase(&rows, &mut orphans)?;
                    }
                    Op::Insert { row, key } => {
                        tables.insert(next_id, row, key)?;
                        next_id += 1;
                    }
                }
            }
            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            meta.insert(NEXT_ROW_ID, next_id).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        Ok((next_id, orphans))
    }

    /// Load rows by id, resolving stream values through the bucket.
    fn load<T>(&self, table: &T, rows: &[u64]) -> Result<Vec<Fact>, FactGraphError>
    where
        T: ReadableTable<u64, &'static [u8]>,
    {
        let mut facts = Vec::with_capacity(rows.len());
        for &id in rows {
            let Some(bytes) = table.get(id).map_err(storage_error)? else {
                continue;
            };
            let row = from_bytes(bytes.value())?;
            facts.push(self.to_fact(row)?);
        }
        Ok(facts)
    }

    fn to_fact(&self, row: Row) -> Result<Fact, FactGraphError> {
        let value = match row.tag()? {
            TypeTag::Stream => resolve_blob(&self.bucket, &row.value)?,
            tag => codec::decode(tag, &row.value)?,
        };
        Ok(Fact {
            entity: row.entity,
            attribute: row.attribute,
            value,
        })
    }
}

// =============================================================================
// FACTSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl FactStore for RedbFactStore {
    fn setup(&mut self) -> Result<(), FactGraphError> {
        self.reset()?;
        self.bucket.clear()?;
        debug!(location = %self.location.display(), "fact store set up");
        Ok(())
    }

    fn add(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        let ops = self.plan(facts)?;
        let (next_id, orphans) = match self.commit(&ops) {
            Ok(committed) => committed,
            Err(e) => {
                self.discard(&ops);
                return Err(e);
            }
        };
        self.next_row_id = next_id;
        self.release(&orphans)?;
        debug!(count = facts.len(), next_row_id = next_id, "added facts");
        Ok(())
    }

    fn remove(&mut self, facts: &[Fact]) -> Result<(), FactGraphError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        let mut removed = 0;
        let mut orphans = Vec::new();
        {
            let mut tables = Tables::open(&write_txn)?;
            for fact in facts {
                // Values that cannot be encoded were never stored.
                let Ok(key) = codec::index_key(&fact.value) else {
                    continue;
                };
                let rows = scan_eav(&tables.eav, &fact.entity, Some(&fact.attribute), Some(&key))?;
                removed += tables.erase(&rows, &mut orphans)?;
            }
        }
        write_txn.commit().map_err(storage_error)?;
        self.release(&orphans)?;
        debug!(removed, blobs = orphans.len(), "removed facts");
        Ok(())
    }

    fn matching(&self, pattern: &Pattern) -> Result<Vec<Fact>, FactGraphError> {
        let key = match &pattern.value {
            None => None,
            Some(value) => match codec::index_key(value) {
                Ok(key) => Some(key),
                // Unencodable values (a stream never written, an
                // out-of-range date) can match nothing.
                Err(_) => return Ok(Vec::new()),
            },
        };
        debug!(shape = ?pattern.shape(), "matching");

        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let facts = read_txn.open_table(FACTS).map_err(storage_error)?;

        let mut rows = match (
            pattern.entity.as_deref(),
            pattern.attribute.as_deref(),
            key.as_deref(),
        ) {
            (Some(entity), Some(attribute), key) => {
                let eav = read_txn.open_table(EAV).map_err(storage_error)?;
                scan_eav(&eav, entity, Some(attribute), key)?
            }
            (Some(entity), None, None) => {
                let eav = read_txn.open_table(EAV).map_err(storage_error)?;
                scan_eav(&eav, entity, None, None)?
            }
            (entity, None, Some(key)) => {
                let ve = read_txn.open_table(VE).map_err(storage_error)?;
                scan_pair(&ve, key, entity)?
            }
            (None, Some(attribute), key) => {
                let ave = read_txn.open_table(AVE).map_err(storage_error)?;
                scan_pair(&ave, attribute, key)?
            }
            (None, None, None) => {
                let mut all = Vec::new();
                for entry in facts.iter().map_err(storage_error)? {
                    let (_, bytes) = entry.map_err(storage_error)?;
                    all.push(self.to_fact(from_bytes(bytes.value())?)?);
                }
                return Ok(all);
            }
        };
        rows.sort_unstable();
        self.load(&facts, &rows)
    }

    fn clear(&mut self) -> Result<(), FactGraphError> {
        self.reset()?;
        self.bucket.clear()?;
        debug!(location = %self.location.display(), "cleared fact store");
        Ok(())
    }

    fn len(&self) -> Result<usize, FactGraphError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(FACTS).map_err(storage_error)?;
        let count = table.len().map_err(storage_error)?;
        Ok(count as usize)
    }

    fn new_id(&self) -> String {
        self.ids.new_id()
    }
}

// =============================================================================
// TESTS
// =============================================================================
