//! # Id Generation
//!
//! Entity ids and bucket keys are opaque strings drawn from an injectable
//! generator. Production uses random UUIDs; tests swap in a sequential
//! generator for reproducible ids.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh, unique string ids.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// A generator shared between the graph, its digester and its bucket.
pub type SharedIds = Arc<dyn IdGenerator>;

/// Random UUID v4 ids rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Sequential ids `"1"`, `"2"`, ... for deterministic tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn new_id(&self) -> String {
        (self.next.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn new_id(&self) -> String {
        self()
    }
}

/// The default generator.
#[must_use]
pub fn random_ids() -> SharedIds {
    Arc::new(RandomIds)
}

/// A fresh sequential generator.
#[must_use]
pub fn sequential_ids() -> SharedIds {
    Arc::new(SequentialIds::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn sequential_starts_at_one() {
        let ids = SequentialIds::new();
        assert_eq!(ids.new_id(), "1");
        assert_eq!(ids.new_id(), "2");
        assert_eq!(ids.new_id(), "3");
    }

    #[test]
    fn random_ids_are_unique_hex() {
        let ids = RandomIds;
        let drawn: BTreeSet<String> = (0..100).map(|_| ids.new_id()).collect();
        assert_eq!(drawn.len(), 100);
        assert!(drawn.iter().all(|id| id.len() == 32));
        assert!(drawn
            .iter()
            .all(|id| id.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[test]
    fn closures_generate_ids() {
        let ids: SharedIds = Arc::new(|| "fixed".to_string());
        assert_eq!(ids.new_id(), "fixed");
    }

    #[test]
    fn shared_generator_advances_for_every_holder() {
        let ids = sequential_ids();
        let other = Arc::clone(&ids);
        assert_eq!(ids.new_id(), "1");
        assert_eq!(other.new_id(), "2");
    }
}
