//! Shared identifier types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonic mutation sequence assigned by the store at apply time.
///
/// Correlates an in-flight request with its pending optimistic write.
/// Session-local; never persisted.
pub type MutationId = u64;

/// Server-assigned post identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    /// Wraps a raw identifier string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Comment identifier: server-assigned, or a local placeholder for a
/// comment inserted optimistically and not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub String);

impl CommentId {
    /// Wraps a raw identifier string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds a placeholder id for an optimistic insertion.
    ///
    /// Includes the mutation sequence so two inserts in the same
    /// millisecond cannot collide.
    pub fn temp(millis: u64, seq: MutationId) -> Self {
        Self(format!("temp-{millis}-{seq}"))
    }

    /// True for locally generated placeholder ids.
    pub fn is_temp(&self) -> bool {
        self.0.starts_with("temp-")
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wraps a raw identifier string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
