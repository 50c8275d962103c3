//! Persistence abstraction for local device snapshots.

/// SQLite-backed snapshot sink.
pub mod sqlite;

use crate::core::store::StoreSnapshotV1;

/// Persistence-layer failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Snapshot payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else (task join failures, format mismatches).
    #[error("{0}")]
    Message(String),
}

/// Result alias for sink operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Snapshot sink for offline boot.
///
/// The runtime writes the latest feed state here on checkpoint and
/// shutdown; at startup the last snapshot seeds the store before the
/// network hydrates it. Pending mutations never reach the sink.
pub trait StateSink: Send {
    /// Persists a snapshot.
    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1) -> PersistResult<()>;

    /// Loads the most recent snapshot, if any.
    fn load_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>>;

    /// Forces buffered writes to stable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
