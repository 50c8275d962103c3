//! Mutation intent model: what a mutation changes, how it rolls back,
//! and how it settles.

use crate::{
    post::{CommentDraft, CommentPatch, PostPatch},
    remote::{ApiError, RequestFuture, ServerReply},
    types::{CommentId, MutationId, PostId},
};

/// The local state change one intent applies optimistically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Patch fields of a post (like, bookmark, repost, edit).
    Post {
        /// Post to mutate.
        id: PostId,
        /// Optimistic field values.
        patch: PostPatch,
    },
    /// Patch fields of a comment or reply.
    Comment {
        /// Post owning the comment.
        post: PostId,
        /// Comment to mutate.
        id: CommentId,
        /// Optimistic field values.
        patch: CommentPatch,
    },
    /// Insert a new comment under a temp id.
    InsertComment {
        /// Post to comment on.
        post: PostId,
        /// Comment content and author.
        draft: CommentDraft,
    },
    /// Insert a new reply under a temp id.
    InsertReply {
        /// Post owning the thread.
        post: PostId,
        /// Parent comment.
        parent: CommentId,
        /// Reply content and author.
        draft: CommentDraft,
    },
}

impl Change {
    /// Default failure notice shown when the caller supplies none.
    pub fn default_notice(&self) -> &'static str {
        match self {
            Change::Post { .. } => "Failed to update post",
            Change::Comment { .. } => "Failed to update comment",
            Change::InsertComment { .. } => "Failed to post comment",
            Change::InsertReply { .. } => "Failed to post reply",
        }
    }
}

/// Where a mutation landed, for events and pending introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A post record.
    Post(PostId),
    /// A comment record under a post.
    Comment {
        /// Owning post.
        post: PostId,
        /// Comment id; a temp id for unconfirmed insertions.
        id: CommentId,
    },
}

/// A request to change one target: the optimistic change plus the
/// network call whose outcome decides commit or rollback.
///
/// The request future is supplied by the caller; the store and runtime
/// never construct network requests themselves.
pub struct MutationIntent {
    /// Optimistic change to apply before dispatch.
    pub change: Change,
    /// Network call yielding the authoritative reply.
    pub request: RequestFuture,
    /// Failure notice override; defaults per [`Change::default_notice`].
    pub failure_notice: Option<String>,
}

impl MutationIntent {
    /// Builds an intent from a change and a request future.
    pub fn new<F>(change: Change, request: F) -> Self
    where
        F: Future<Output = Result<ServerReply, ApiError>> + Send + 'static,
    {
        Self {
            change,
            request: Box::pin(request),
            failure_notice: None,
        }
    }

    /// Overrides the failure notice surfaced on rollback.
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.failure_notice = Some(notice.into());
        self
    }
}

/// Captured rollback action, recorded at apply time.
///
/// Field rollbacks restore the captured prior values verbatim; they
/// never recompute a derived value, so a concurrent mutation on the
/// same record cannot be erased by a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOp {
    /// Restore captured post fields.
    PostFields {
        /// Post to restore.
        id: PostId,
        /// Inverse patch captured at apply time.
        prev: PostPatch,
    },
    /// Restore captured comment fields.
    CommentFields {
        /// Owning post.
        post: PostId,
        /// Comment to restore.
        id: CommentId,
        /// Inverse patch captured at apply time.
        prev: CommentPatch,
    },
    /// Remove an optimistically inserted comment.
    RemoveComment {
        /// Owning post.
        post: PostId,
        /// Temp id of the inserted record.
        temp: CommentId,
    },
    /// Remove an optimistically inserted reply.
    RemoveReply {
        /// Owning post.
        post: PostId,
        /// Parent comment.
        parent: CommentId,
        /// Temp id of the inserted record.
        temp: CommentId,
    },
}

/// Registry entry for an in-flight mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    /// Where the optimistic write landed.
    pub target: Target,
    /// How to roll it back.
    pub undo: UndoOp,
}

/// Terminal disposition of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Reconciled with the server reply.
    Committed,
    /// Rolled back to the captured prior state.
    RolledBack {
        /// Non-blocking notice for the UI.
        notice: String,
    },
    /// Resolution arrived after the op was discarded (feed replaced,
    /// duplicate resolve). Silently ignored.
    Superseded,
}

/// Convenience alias used by the runtime's resolution channel.
pub type RequestOutcome = Result<ServerReply, ApiError>;

/// In-flight resolution routed back to the store loop.
#[derive(Debug)]
pub struct Resolution {
    /// Mutation being resolved.
    pub op: MutationId,
    /// Request outcome.
    pub outcome: RequestOutcome,
}
