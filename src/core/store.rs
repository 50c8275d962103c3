//! Single shared in-memory feed collection.
//!
//! All optimistic writes, reconciliations, and rollbacks go through this
//! store, so every optimistic write has exactly one matching resolution
//! write. Mutations are synchronous; the async runtime in
//! [`crate::runtime`] serializes access from concurrent callers.

use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    core::indices::VecIndex,
    op::{Change, PendingOp, Settlement, Target, UndoOp},
    post::{CommentDraft, CommentPatch, CommentRecord, PostPatch, PostRecord},
    remote::ServerReply,
    types::{CommentId, MutationId, PostId, UserId},
};

/// Defect-class store failure.
///
/// These signal programmer errors (mutating a record that is not in the
/// store), not runtime conditions; request failures never surface here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No post with this id is loaded.
    #[error("unknown post {0}")]
    MissingPost(PostId),
    /// No such comment under the post.
    #[error("unknown comment {id} on post {post}")]
    MissingComment {
        /// Owning post.
        post: PostId,
        /// Missing comment id.
        id: CommentId,
    },
    /// A post with this id is already loaded.
    #[error("post {0} already present")]
    AlreadyExists(PostId),
    /// The patch sets no fields.
    #[error("empty patch")]
    EmptyPatch,
}

/// Serializable snapshot of the feed for offline boot.
///
/// Pending mutations are excluded by construction; an intent lives only
/// for the duration of its request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Feed order, newest first.
    pub order: Vec<PostId>,
    /// Post records in feed order.
    pub posts: Vec<PostRecord>,
    /// Comment lists keyed by post, in feed order.
    pub comments: Vec<(PostId, Vec<CommentRecord>)>,
}

/// In-memory post collection with optimistic mutation bookkeeping.
#[derive(Debug, Default)]
pub struct FeedStore {
    posts: HashMap<PostId, PostRecord>,
    order: Vec<PostId>,
    pos: HashMap<PostId, usize>,
    by_author: VecIndex<UserId>,
    comments: HashMap<PostId, Vec<CommentRecord>>,
    pending: HashMap<MutationId, PendingOp>,
    next_op: MutationId,
}

impl FeedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            next_op: 1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from a persisted snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Self {
        let mut store = Self::new();
        store.order = snapshot.order;
        for (idx, id) in store.order.iter().enumerate() {
            store.pos.insert(id.clone(), idx);
        }
        for rec in snapshot.posts {
            store
                .by_author
                .entry(rec.author.id.clone())
                .or_default()
                .push(rec.id.clone());
            store.posts.insert(rec.id.clone(), rec);
        }
        for (post, list) in snapshot.comments {
            store.comments.insert(post, list);
        }
        store
    }

    /// Exports the current feed for persistence.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let posts = self
            .order
            .iter()
            .filter_map(|id| self.posts.get(id).cloned())
            .collect();
        let comments = self
            .order
            .iter()
            .filter_map(|id| {
                self.comments
                    .get(id)
                    .map(|list| (id.clone(), list.clone()))
            })
            .collect();

        StoreSnapshotV1 {
            order: self.order.clone(),
            posts,
            comments,
        }
    }

    // --- hydration: server-authoritative writes, no pending entry ---

    /// Replaces the whole feed with a server-fetched list.
    ///
    /// Every pending mutation is discarded; returns their ids so the
    /// caller can settle them as superseded. An in-flight resolution
    /// for a discarded op later lands as a silent no-op.
    pub fn replace_feed(&mut self, posts: Vec<PostRecord>) -> Vec<MutationId> {
        let superseded: Vec<MutationId> = self.pending.drain().map(|(op, _)| op).collect();

        self.posts.clear();
        self.order.clear();
        self.pos.clear();
        self.by_author.clear();
        for rec in posts {
            self.pos.insert(rec.id.clone(), self.order.len());
            self.order.push(rec.id.clone());
            self.by_author
                .entry(rec.author.id.clone())
                .or_default()
                .push(rec.id.clone());
            self.posts.insert(rec.id.clone(), rec);
        }

        let posts = &self.posts;
        self.comments.retain(|id, _| posts.contains_key(id));
        superseded
    }

    /// Replaces a post's comment list with a server-fetched one and
    /// re-derives its comment count, replies included.
    ///
    /// Pending mutations targeting the post's comments are discarded as
    /// superseded, like [`FeedStore::replace_feed`]; a late resolution
    /// for one of them would otherwise overwrite the fetched records
    /// with pre-optimistic values. Returns their ids so the caller can
    /// settle them.
    pub fn replace_comments(
        &mut self,
        post: &PostId,
        list: Vec<CommentRecord>,
    ) -> Result<Vec<MutationId>, StoreError> {
        let rec = self
            .posts
            .get_mut(post)
            .ok_or_else(|| StoreError::MissingPost(post.clone()))?;
        rec.comment_count = list.iter().map(|c| 1 + c.replies.len() as u32).sum();
        self.comments.insert(post.clone(), list);

        let mut superseded = Vec::new();
        self.pending.retain(|op, p| {
            let on_post =
                matches!(&p.target, Target::Comment { post: owner, .. } if owner == post);
            if on_post {
                superseded.push(*op);
            }
            !on_post
        });
        Ok(superseded)
    }

    /// Inserts a confirmed post at the front of the feed.
    pub fn insert_post(&mut self, rec: PostRecord) -> Result<(), StoreError> {
        if self.posts.contains_key(&rec.id) {
            return Err(StoreError::AlreadyExists(rec.id.clone()));
        }
        self.order.insert(0, rec.id.clone());
        self.rebuild_pos();
        self.by_author
            .entry(rec.author.id.clone())
            .or_default()
            .push(rec.id.clone());
        self.posts.insert(rec.id.clone(), rec);
        Ok(())
    }

    /// Removes a post, its comments, and its index entries.
    pub fn remove_post(&mut self, id: &PostId) -> Result<PostRecord, StoreError> {
        let rec = self
            .posts
            .remove(id)
            .ok_or_else(|| StoreError::MissingPost(id.clone()))?;
        if let Some(idx) = self.pos.remove(id) {
            self.order.remove(idx);
            self.rebuild_pos();
        }
        if let Some(ids) = self.by_author.get_mut(&rec.author.id) {
            remove_from_vec_index(ids, id);
        }
        self.comments.remove(id);
        Ok(rec)
    }

    /// Applies a server-authoritative patch outside the optimistic flow
    /// (edit confirmation, push-driven refresh of a single post).
    pub fn apply_server_patch(&mut self, id: &PostId, patch: PostPatch) -> Result<(), StoreError> {
        let rec = self
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::MissingPost(id.clone()))?;
        patch.apply_to(rec);
        Ok(())
    }

    // --- optimistic apply: synchronous, registers a pending op ---

    /// Applies an optimistic post field patch and registers the inverse.
    ///
    /// The inverse captures the currently displayed values, so a second
    /// mutation on the same fields chains onto the first rather than
    /// resetting to the last confirmed server value.
    pub fn begin_post_fields(
        &mut self,
        id: &PostId,
        patch: PostPatch,
    ) -> Result<MutationId, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyPatch);
        }
        let rec = self
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::MissingPost(id.clone()))?;
        let prev = patch.capture_inverse_for(rec);
        patch.apply_to(rec);

        let op = self.take_next_op();
        self.pending.insert(
            op,
            PendingOp {
                target: Target::Post(id.clone()),
                undo: UndoOp::PostFields {
                    id: id.clone(),
                    prev,
                },
            },
        );
        Ok(op)
    }

    /// Applies an optimistic comment field patch and registers the inverse.
    pub fn begin_comment_fields(
        &mut self,
        post: &PostId,
        id: &CommentId,
        patch: CommentPatch,
    ) -> Result<MutationId, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyPatch);
        }
        let list = self
            .comments
            .get_mut(post)
            .ok_or_else(|| StoreError::MissingPost(post.clone()))?;
        let rec = find_comment_mut(list, id).ok_or_else(|| StoreError::MissingComment {
            post: post.clone(),
            id: id.clone(),
        })?;
        let prev = patch.capture_inverse_for(rec);
        patch.apply_to(rec);

        let op = self.take_next_op();
        self.pending.insert(
            op,
            PendingOp {
                target: Target::Comment {
                    post: post.clone(),
                    id: id.clone(),
                },
                undo: UndoOp::CommentFields {
                    post: post.clone(),
                    id: id.clone(),
                    prev,
                },
            },
        );
        Ok(op)
    }

    /// Appends an optimistic comment under a temp id and bumps the
    /// post's comment count.
    pub fn begin_insert_comment(
        &mut self,
        post: &PostId,
        draft: CommentDraft,
    ) -> Result<(MutationId, CommentId), StoreError> {
        let rec = self
            .posts
            .get_mut(post)
            .ok_or_else(|| StoreError::MissingPost(post.clone()))?;
        rec.comment_count += 1;

        let op = self.take_next_op();
        let temp = CommentId::temp(now_ms(), op);
        self.comments
            .entry(post.clone())
            .or_default()
            .push(draft.into_record(temp.clone()));
        self.pending.insert(
            op,
            PendingOp {
                target: Target::Comment {
                    post: post.clone(),
                    id: temp.clone(),
                },
                undo: UndoOp::RemoveComment {
                    post: post.clone(),
                    temp: temp.clone(),
                },
            },
        );
        Ok((op, temp))
    }

    /// Appends an optimistic reply under a temp id.
    pub fn begin_insert_reply(
        &mut self,
        post: &PostId,
        parent: &CommentId,
        draft: CommentDraft,
    ) -> Result<(MutationId, CommentId), StoreError> {
        let has_parent = self
            .comments
            .get(post)
            .is_some_and(|list| list.iter().any(|c| &c.id == parent));
        if !self.posts.contains_key(post) {
            return Err(StoreError::MissingPost(post.clone()));
        }
        if !has_parent {
            return Err(StoreError::MissingComment {
                post: post.clone(),
                id: parent.clone(),
            });
        }

        let op = self.take_next_op();
        let temp = CommentId::temp(now_ms(), op);
        if let Some(parent_rec) = self
            .comments
            .get_mut(post)
            .and_then(|list| list.iter_mut().find(|c| &c.id == parent))
        {
            parent_rec.replies.push(draft.into_record(temp.clone()));
        }
        if let Some(rec) = self.posts.get_mut(post) {
            rec.comment_count += 1;
        }
        self.pending.insert(
            op,
            PendingOp {
                target: Target::Comment {
                    post: post.clone(),
                    id: temp.clone(),
                },
                undo: UndoOp::RemoveReply {
                    post: post.clone(),
                    parent: parent.clone(),
                    temp: temp.clone(),
                },
            },
        );
        Ok((op, temp))
    }

    /// Applies an optimistic change of any kind.
    ///
    /// Convenience over the `begin_*` methods; returns the temp id for
    /// insertion-style changes.
    pub fn begin(
        &mut self,
        change: Change,
    ) -> Result<(MutationId, Option<CommentId>, Target), StoreError> {
        match change {
            Change::Post { id, patch } => {
                let op = self.begin_post_fields(&id, patch)?;
                Ok((op, None, Target::Post(id)))
            }
            Change::Comment { post, id, patch } => {
                let op = self.begin_comment_fields(&post, &id, patch)?;
                Ok((op, None, Target::Comment { post, id }))
            }
            Change::InsertComment { post, draft } => {
                let (op, temp) = self.begin_insert_comment(&post, draft)?;
                Ok((
                    op,
                    Some(temp.clone()),
                    Target::Comment { post, id: temp },
                ))
            }
            Change::InsertReply {
                post,
                parent,
                draft,
            } => {
                let (op, temp) = self.begin_insert_reply(&post, &parent, draft)?;
                Ok((
                    op,
                    Some(temp.clone()),
                    Target::Comment { post, id: temp },
                ))
            }
        }
    }

    // --- resolution: exactly one write per settled op ---

    /// Reconciles a pending mutation with the server reply.
    ///
    /// Field ops overwrite with the server patch, co-reported fields
    /// included, or keep the optimistic value on a bare ack. Insertions
    /// replace the temp record in place so the list order is stable. A
    /// reply of the wrong shape for the op rolls back instead of
    /// committing a partially valid value. Resolving an unknown or
    /// already settled op is a no-op.
    pub fn resolve_success(&mut self, op: MutationId, reply: ServerReply) -> Settlement {
        let Some(pending) = self.pending.remove(&op) else {
            return Settlement::Superseded;
        };

        match (pending.undo, reply) {
            (UndoOp::PostFields { id, .. }, ServerReply::PostFields(patch)) => {
                match self.posts.get_mut(&id) {
                    Some(rec) => {
                        patch.apply_to(rec);
                        Settlement::Committed
                    }
                    None => Settlement::Superseded,
                }
            }
            (UndoOp::PostFields { .. }, ServerReply::Ack) => Settlement::Committed,
            (UndoOp::CommentFields { post, id, .. }, ServerReply::CommentFields(patch)) => {
                match self
                    .comments
                    .get_mut(&post)
                    .and_then(|list| find_comment_mut(list, &id))
                {
                    Some(rec) => {
                        patch.apply_to(rec);
                        Settlement::Committed
                    }
                    None => Settlement::Superseded,
                }
            }
            (UndoOp::CommentFields { .. }, ServerReply::Ack) => Settlement::Committed,
            (UndoOp::RemoveComment { post, temp }, ServerReply::Comment(rec)) => {
                match self.comments.get_mut(&post) {
                    Some(list) => match list.iter().position(|c| c.id == temp) {
                        Some(idx) => {
                            list[idx] = rec;
                            Settlement::Committed
                        }
                        None => Settlement::Superseded,
                    },
                    None => Settlement::Superseded,
                }
            }
            (
                UndoOp::RemoveReply {
                    post,
                    parent,
                    temp,
                },
                ServerReply::Comment(rec),
            ) => {
                match self
                    .comments
                    .get_mut(&post)
                    .and_then(|list| list.iter_mut().find(|c| c.id == parent))
                {
                    Some(parent_rec) => {
                        match parent_rec.replies.iter().position(|r| r.id == temp) {
                            Some(idx) => {
                                parent_rec.replies[idx] = rec;
                                Settlement::Committed
                            }
                            None => Settlement::Superseded,
                        }
                    }
                    None => Settlement::Superseded,
                }
            }
            (undo, _) => {
                self.apply_undo(undo);
                Settlement::RolledBack {
                    notice: "malformed server reply".to_string(),
                }
            }
        }
    }

    /// Rolls a pending mutation back to its captured prior state.
    ///
    /// Field rollbacks restore the captured values verbatim; insertion
    /// rollbacks remove the temp record and reverse exactly the count
    /// bump the insert made, saturating at zero. Resolving an unknown or
    /// already settled op is a no-op.
    pub fn resolve_failure(&mut self, op: MutationId, notice: impl Into<String>) -> Settlement {
        let Some(pending) = self.pending.remove(&op) else {
            return Settlement::Superseded;
        };
        self.apply_undo(pending.undo);
        Settlement::RolledBack {
            notice: notice.into(),
        }
    }

    fn apply_undo(&mut self, undo: UndoOp) {
        match undo {
            UndoOp::PostFields { id, prev } => {
                if let Some(rec) = self.posts.get_mut(&id) {
                    prev.apply_to(rec);
                }
            }
            UndoOp::CommentFields { post, id, prev } => {
                if let Some(rec) = self
                    .comments
                    .get_mut(&post)
                    .and_then(|list| find_comment_mut(list, &id))
                {
                    prev.apply_to(rec);
                }
            }
            UndoOp::RemoveComment { post, temp } => {
                let removed = self
                    .comments
                    .get_mut(&post)
                    .and_then(|list| {
                        list.iter()
                            .position(|c| c.id == temp)
                            .map(|idx| list.remove(idx))
                    })
                    .is_some();
                if removed && let Some(rec) = self.posts.get_mut(&post) {
                    rec.comment_count = rec.comment_count.saturating_sub(1);
                }
            }
            UndoOp::RemoveReply { post, parent, temp } => {
                let removed = self
                    .comments
                    .get_mut(&post)
                    .and_then(|list| list.iter_mut().find(|c| c.id == parent))
                    .and_then(|parent_rec| {
                        parent_rec
                            .replies
                            .iter()
                            .position(|r| r.id == temp)
                            .map(|idx| parent_rec.replies.remove(idx))
                    })
                    .is_some();
                if removed && let Some(rec) = self.posts.get_mut(&post) {
                    rec.comment_count = rec.comment_count.saturating_sub(1);
                }
            }
        }
    }

    // --- queries ---

    /// Returns a post by id.
    pub fn get(&self, id: &PostId) -> Option<&PostRecord> {
        self.posts.get(id)
    }

    /// Returns a cloned post by id.
    pub fn get_cloned(&self, id: &PostId) -> Option<PostRecord> {
        self.get(id).cloned()
    }

    /// Returns the full feed in order, newest first.
    pub fn feed(&self) -> Vec<&PostRecord> {
        self.order
            .iter()
            .filter_map(|id| self.posts.get(id))
            .collect()
    }

    /// Returns the full feed cloned.
    pub fn feed_cloned(&self) -> Vec<PostRecord> {
        self.feed().into_iter().cloned().collect()
    }

    /// Returns the first `n` posts of the feed.
    pub fn recent(&self, n: usize) -> Vec<&PostRecord> {
        self.order
            .iter()
            .take(n)
            .filter_map(|id| self.posts.get(id))
            .collect()
    }

    /// Returns the first `n` posts cloned.
    pub fn recent_cloned(&self, n: usize) -> Vec<PostRecord> {
        self.recent(n).into_iter().cloned().collect()
    }

    /// Returns posts authored by `user` in insertion order.
    pub fn by_author(&self, user: &UserId) -> Vec<&PostRecord> {
        self.by_author
            .get(user)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.posts.get(id))
            .collect()
    }

    /// Returns posts authored by `user`, cloned.
    pub fn by_author_cloned(&self, user: &UserId) -> Vec<PostRecord> {
        self.by_author(user).into_iter().cloned().collect()
    }

    /// Returns a post's comment list, empty when never fetched.
    pub fn comments(&self, post: &PostId) -> &[CommentRecord] {
        self.comments.get(post).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns a post's comment list, cloned.
    pub fn comments_cloned(&self, post: &PostId) -> Vec<CommentRecord> {
        self.comments(post).to_vec()
    }

    /// Returns the feed order, newest first.
    pub fn ordered_ids(&self) -> &[PostId] {
        &self.order
    }

    /// Number of loaded posts.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no posts are loaded.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of mutations applied but not yet settled.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Targets of all unsettled mutations.
    pub fn pending_targets(&self) -> Vec<Target> {
        self.pending.values().map(|p| p.target.clone()).collect()
    }

    fn rebuild_pos(&mut self) {
        self.pos.clear();
        for (idx, id) in self.order.iter().enumerate() {
            self.pos.insert(id.clone(), idx);
        }
    }

    fn take_next_op(&mut self) -> MutationId {
        let op = self.next_op;
        self.next_op += 1;
        op
    }
}

fn find_comment_mut<'a>(
    list: &'a mut [CommentRecord],
    id: &CommentId,
) -> Option<&'a mut CommentRecord> {
    for c in list.iter_mut() {
        if &c.id == id {
            return Some(c);
        }
        if let Some(idx) = c.replies.iter().position(|r| &r.id == id) {
            return Some(&mut c.replies[idx]);
        }
    }
    None
}

fn remove_from_vec_index(v: &mut Vec<PostId>, id: &PostId) {
    if let Some(pos) = v.iter().position(|x| x == id) {
        v.remove(pos);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
