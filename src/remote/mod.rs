//! Request seam: error taxonomy, server reply shapes, and envelope
//! decoding for the backend's JSON responses.

/// Decoding of the backend's `{success, message, body}` envelope.
pub mod envelope;

use std::pin::Pin;

use crate::post::{CommentPatch, CommentRecord, PostPatch};

/// Request-level failure, as seen by the mutation controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Timeout or connectivity loss before a response arrived.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Non-success HTTP status with no usable envelope.
    #[error("unexpected status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
    },
    /// Server rejected the mutation (validation error, conflict).
    #[error("rejected: {message}")]
    Rejected {
        /// Server-provided message, surfaced in the rollback notice.
        message: String,
    },
    /// Success response missing an expected field. Treated as failure
    /// rather than committing a partially valid value.
    #[error("malformed reply: {what}")]
    Malformed {
        /// What was missing or undecodable.
        what: String,
    },
}

/// Authoritative reply for a settled mutation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// Server-computed post fields, co-reported fields included.
    PostFields(PostPatch),
    /// Server-computed comment fields.
    CommentFields(CommentPatch),
    /// Confirmed record for an insertion, with its server-assigned id.
    Comment(CommentRecord),
    /// Bare acknowledgement; the optimistic value stands.
    Ack,
}

/// Boxed request future injected per intent by the caller.
pub type RequestFuture = Pin<Box<dyn Future<Output = Result<ServerReply, ApiError>> + Send>>;
