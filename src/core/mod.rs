//! In-memory feed collection and index helpers.

/// Helper index aliases.
pub mod indices;
/// Feed store with optimistic apply, commit, and rollback.
pub mod store;
