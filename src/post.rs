//! Post and comment domain records, drafts, and patch types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentId, PostId, UserId};

/// Embedded author summary carried on posts and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserRef {
    /// Author identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Handle without the leading `@`.
    pub username: String,
    /// Avatar image URL, when set.
    pub avatar_url: Option<String>,
}

/// Post visibility bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to everyone.
    #[default]
    Public,
    /// Visible to followers only.
    Followers,
    /// Visible to the author only.
    Private,
}

/// Fully materialized post record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Stable post identifier.
    pub id: PostId,
    /// Author summary.
    pub author: UserRef,
    /// Body text.
    pub content: String,
    /// Attached image URLs.
    pub images: Vec<String>,
    /// Server-side creation time.
    pub created_at: DateTime<Utc>,
    /// Like count.
    pub likes: u32,
    /// True when the current user has liked this post.
    pub is_liked: bool,
    /// True when the current user has bookmarked this post.
    pub is_bookmarked: bool,
    /// Repost count.
    pub reposts: u32,
    /// True when the current user has reposted this post.
    pub is_reposted: bool,
    /// Comment count, replies included.
    pub comment_count: u32,
    /// Visibility bucket.
    pub visibility: Visibility,
}

/// Comment record, optionally carrying one level of replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Comment identifier; may be a temp placeholder while unconfirmed.
    pub id: CommentId,
    /// Author summary.
    pub author: UserRef,
    /// Body text.
    pub content: String,
    /// Server-side creation time (client time for unconfirmed records).
    pub created_at: DateTime<Utc>,
    /// Like count.
    pub likes: u32,
    /// True when the current user has liked this comment.
    pub is_liked: bool,
    /// Direct replies.
    pub replies: Vec<CommentRecord>,
}

/// Draft payload for an optimistically inserted comment or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentDraft {
    /// The current user, as the record's author.
    pub author: UserRef,
    /// Body text.
    pub content: String,
}

impl CommentDraft {
    /// Materializes the draft into an unconfirmed record under `id`.
    pub fn into_record(self, id: CommentId) -> CommentRecord {
        CommentRecord {
            id,
            author: self.author,
            content: self.content,
            created_at: Utc::now(),
            likes: 0,
            is_liked: false,
            replies: Vec::new(),
        }
    }
}

/// Sparse post patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostPatch {
    /// Optional replacement for the like count.
    pub likes: Option<u32>,
    /// Optional replacement for the liked flag.
    pub is_liked: Option<bool>,
    /// Optional replacement for the bookmarked flag.
    pub is_bookmarked: Option<bool>,
    /// Optional replacement for the repost count.
    pub reposts: Option<u32>,
    /// Optional replacement for the reposted flag.
    pub is_reposted: Option<bool>,
    /// Optional replacement for the comment count.
    pub comment_count: Option<u32>,
    /// Optional replacement for the body text.
    pub content: Option<String>,
    /// Optional replacement for visibility.
    pub visibility: Option<Visibility>,
}

impl PostPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Captures an inverse patch for all fields present in `self`.
    ///
    /// Reads the currently displayed values, which may themselves be
    /// unconfirmed optimistic values from an earlier mutation.
    pub fn capture_inverse_for(&self, rec: &PostRecord) -> Self {
        Self {
            likes: self.likes.map(|_| rec.likes),
            is_liked: self.is_liked.map(|_| rec.is_liked),
            is_bookmarked: self.is_bookmarked.map(|_| rec.is_bookmarked),
            reposts: self.reposts.map(|_| rec.reposts),
            is_reposted: self.is_reposted.map(|_| rec.is_reposted),
            comment_count: self.comment_count.map(|_| rec.comment_count),
            content: self.content.as_ref().map(|_| rec.content.clone()),
            visibility: self.visibility.map(|_| rec.visibility),
        }
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut PostRecord) {
        if let Some(v) = self.likes {
            rec.likes = v;
        }
        if let Some(v) = self.is_liked {
            rec.is_liked = v;
        }
        if let Some(v) = self.is_bookmarked {
            rec.is_bookmarked = v;
        }
        if let Some(v) = self.reposts {
            rec.reposts = v;
        }
        if let Some(v) = self.is_reposted {
            rec.is_reposted = v;
        }
        if let Some(v) = self.comment_count {
            rec.comment_count = v;
        }
        if let Some(v) = &self.content {
            rec.content = v.clone();
        }
        if let Some(v) = self.visibility {
            rec.visibility = v;
        }
    }
}

/// Sparse comment patch where each `Some` field overwrites the record value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommentPatch {
    /// Optional replacement for the like count.
    pub likes: Option<u32>,
    /// Optional replacement for the liked flag.
    pub is_liked: Option<bool>,
    /// Optional replacement for the body text.
    pub content: Option<String>,
}

impl CommentPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Captures an inverse patch for all fields present in `self`.
    pub fn capture_inverse_for(&self, rec: &CommentRecord) -> Self {
        Self {
            likes: self.likes.map(|_| rec.likes),
            is_liked: self.is_liked.map(|_| rec.is_liked),
            content: self.content.as_ref().map(|_| rec.content.clone()),
        }
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut CommentRecord) {
        if let Some(v) = self.likes {
            rec.likes = v;
        }
        if let Some(v) = self.is_liked {
            rec.is_liked = v;
        }
        if let Some(v) = &self.content {
            rec.content = v.clone();
        }
    }
}
