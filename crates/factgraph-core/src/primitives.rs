//! # Primitives
//!
//! Hardcoded constants for the factgraph store.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Attribute name marking list membership: `(container, "includes", member)`.
pub const INCLUDES: &str = "includes";

/// Attribute consulted by `FactStore::put` for an explicit entity id.
pub const UID: &str = "uid";

/// Location string selecting the in-memory backend.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Name of the repository directory created inside a project.
pub const REPOSITORY_DIR: &str = ".factgraph";

/// File name of the redb database inside a repository directory.
pub const FACTS_FILE: &str = "facts.redb";

/// Directory name of the file bucket inside a repository directory.
pub const BLOBS_DIR: &str = "blobs";

/// Maximum nesting depth accepted by the digester.
///
/// Digestion recurses once per level; deeper input is rejected with
/// `FactGraphError::DepthLimitExceeded` instead of growing the call stack
/// without bound.
pub const MAX_DIGEST_DEPTH: usize = 256;

/// Fixed width of a persisted date: `YYYY-MM-DD`.
pub const DATE_WIDTH: usize = 10;

/// Fixed width of a persisted datetime: `YYYY-MM-DD HH:MM:SS`.
pub const DATETIME_WIDTH: usize = 19;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_width_extends_date_width() {
        assert_eq!(DATETIME_WIDTH, DATE_WIDTH + " HH:MM:SS".len());
    }
}
