//! # factgraph-core
//!
//! A schema-less fact store - THE STORE.
//!
//! Nested data (maps, lists, scalars) is digested into flat
//! `(entity, attribute, value)` facts. Facts live in one of two
//! interchangeable backends and are read back through triple patterns,
//! conjunctive queries, or by rebuilding whole structures.
//!
//! ## Layers
//!
//! - `codec`: the persisted text form of every scalar type
//! - `bucket`: key-value storage for binary payloads
//! - `store` / `storage` / `backend`: the in-memory and redb fact stores
//! - `digester`: nested data to facts and back
//! - `graph`: the public API used by callers
//!
//! ## Constraints
//!
//! - Synchronous: no async, no network dependencies
//! - Both backends answer every operation identically
//! - A failed write batch leaves the store unchanged

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
pub mod bucket;
pub mod codec;
pub mod digester;
pub mod graph;
pub mod ids;
pub mod json;
pub mod primitives;
pub mod repository;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Blob, Entity, Fact, FactGraphError, Pattern, Shape, Value};

// =============================================================================
// RE-EXPORTS: Stores
// =============================================================================

pub use backend::{StorageBackend, facts_of};
pub use bucket::{Bucket, FileBucket, MemoryBucket};
pub use ids::{IdGenerator, RandomIds, SequentialIds, SharedIds, random_ids, sequential_ids};
pub use storage::RedbFactStore;
pub use store::{FactStore, MemoryFactStore};

// =============================================================================
// RE-EXPORTS: Digestion and Graph
// =============================================================================

pub use digester::{Data, Digester, Undigester, digested, undigested, undigested_from};
pub use graph::{Binding, Clause, Filter, Graph, Term};
pub use repository::{Repository, create_repository, locate_repository, remove_repository};
