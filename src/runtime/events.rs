//! Runtime event stream payloads.

use crate::{
    op::Target,
    types::{MutationId, PostId, UserId},
};

/// Coarse scope of an external change notification.
///
/// Push from the backend only says "something changed"; the UI layer
/// re-fetches and hydrates. No ordering guarantee is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    /// The whole feed.
    Feed,
    /// One post (likes, comments, edits).
    Post(PostId),
    /// One user's profile and content.
    Profile(UserId),
}

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// An optimistic mutation was applied locally.
    MutationApplied {
        /// Mutation sequence.
        op: MutationId,
        /// Mutated record.
        target: Target,
    },
    /// A mutation was reconciled with the server reply.
    MutationCommitted {
        /// Mutation sequence.
        op: MutationId,
        /// Mutated record.
        target: Target,
    },
    /// A mutation was rolled back to its captured prior state.
    MutationRolledBack {
        /// Mutation sequence.
        op: MutationId,
        /// Mutated record.
        target: Target,
        /// Non-blocking notice for the UI.
        notice: String,
    },
    /// The feed was replaced by a server fetch.
    FeedReplaced {
        /// New feed size.
        posts: usize,
    },
    /// A post's comment list was replaced by a server fetch.
    CommentsReplaced {
        /// Owning post.
        post: PostId,
    },
    /// A confirmed post was inserted at the front of the feed.
    PostInserted {
        /// Inserted post id.
        id: PostId,
    },
    /// A post was removed.
    PostRemoved {
        /// Removed post id.
        id: PostId,
    },
    /// The backend signalled an external change.
    RemoteChanged {
        /// What changed.
        scope: ChangeScope,
    },
    /// A snapshot was written to the state sink.
    SnapshotSaved {
        /// Posts in the snapshot.
        posts: usize,
    },
}
