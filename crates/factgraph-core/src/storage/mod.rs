//! # Persistent Storage
//!
//! Disk-backed fact storage on the redb embedded database.

pub mod redb_facts;

pub use redb_facts::RedbFactStore;
