//! Backend envelope decoding.
//!
//! Every endpoint wraps its payload as `{success, message, body}`. Field
//! naming is inconsistent across endpoints (`id` vs `_id`, `content` vs
//! `text`, `likes` vs `likesCount`), so the wire structs accept the
//! aliases the backend actually emits and default everything that can
//! legitimately be absent.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    post::{CommentPatch, CommentRecord, PostPatch, PostRecord, UserRef, Visibility},
    types::{CommentId, PostId, UserId},
};

use super::{ApiError, ServerReply};

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    body: Option<Value>,
}

fn open_envelope(raw: &[u8]) -> Result<Value, ApiError> {
    let env: Envelope = serde_json::from_slice(raw).map_err(|e| ApiError::Malformed {
        what: format!("envelope: {e}"),
    })?;
    if !env.success {
        return Err(ApiError::Rejected {
            message: env
                .message
                .unwrap_or_else(|| "request rejected".to_string()),
        });
    }
    Ok(env.body.unwrap_or(Value::Null))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    #[serde(default, alias = "_id")]
    id: String,
    #[serde(default, alias = "fullName")]
    name: String,
    #[serde(default)]
    username: String,
    #[serde(default, alias = "avatar")]
    avatar_url: Option<String>,
}

impl WireUser {
    fn into_ref(self) -> UserRef {
        UserRef {
            id: UserId::new(self.id),
            name: self.name,
            username: self.username,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePostFields {
    #[serde(default, alias = "likesCount")]
    likes: Option<u32>,
    #[serde(default)]
    is_liked: Option<bool>,
    #[serde(default)]
    is_bookmarked: Option<bool>,
    #[serde(default, alias = "repostsCount")]
    reposts: Option<u32>,
    #[serde(default)]
    is_reposted: Option<bool>,
    #[serde(default, alias = "commentsCount")]
    comment_count: Option<u32>,
    #[serde(default, alias = "text")]
    content: Option<String>,
    #[serde(default)]
    visibility: Option<Visibility>,
}

impl WirePostFields {
    fn into_patch(self) -> PostPatch {
        PostPatch {
            likes: self.likes,
            is_liked: self.is_liked,
            is_bookmarked: self.is_bookmarked,
            reposts: self.reposts,
            is_reposted: self.is_reposted,
            comment_count: self.comment_count,
            content: self.content,
            visibility: self.visibility,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireCommentFields {
    #[serde(default, alias = "likesCount")]
    likes: Option<u32>,
    #[serde(default)]
    is_liked: Option<bool>,
    #[serde(default, alias = "text")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default, alias = "user")]
    author: Option<WireUser>,
    #[serde(default, alias = "text")]
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "likesCount")]
    likes: u32,
    #[serde(default)]
    is_liked: bool,
    #[serde(default)]
    replies: Vec<WireComment>,
}

impl WireComment {
    fn into_record(self) -> CommentRecord {
        CommentRecord {
            id: CommentId::new(self.id),
            author: self.author.unwrap_or_default().into_ref(),
            content: self.content,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            likes: self.likes,
            is_liked: self.is_liked,
            replies: self.replies.into_iter().map(Self::into_record).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePost {
    #[serde(alias = "_id")]
    id: String,
    #[serde(default, alias = "user")]
    author: Option<WireUser>,
    #[serde(default, alias = "text")]
    content: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "likesCount")]
    likes: u32,
    #[serde(default)]
    is_liked: bool,
    #[serde(default)]
    is_bookmarked: bool,
    #[serde(default, alias = "repostsCount")]
    reposts: u32,
    #[serde(default)]
    is_reposted: bool,
    #[serde(default, alias = "commentsCount")]
    comment_count: u32,
    #[serde(default)]
    visibility: Visibility,
}

impl WirePost {
    fn into_record(self) -> PostRecord {
        PostRecord {
            id: PostId::new(self.id),
            author: self.author.unwrap_or_default().into_ref(),
            content: self.content,
            images: self.images,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            likes: self.likes,
            is_liked: self.is_liked,
            is_bookmarked: self.is_bookmarked,
            reposts: self.reposts,
            is_reposted: self.is_reposted,
            comment_count: self.comment_count,
            visibility: self.visibility,
        }
    }
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Decodes a post field mutation response (like, bookmark, repost, edit).
///
/// An empty body is a bare [`ServerReply::Ack`]; the optimistic value
/// stands. Co-reported counts become a [`PostPatch`].
pub fn decode_post_mutation(raw: &[u8]) -> Result<ServerReply, ApiError> {
    let body = open_envelope(raw)?;
    if is_empty_body(&body) {
        return Ok(ServerReply::Ack);
    }
    let fields: WirePostFields =
        serde_json::from_value(body).map_err(|e| ApiError::Malformed {
            what: format!("post fields: {e}"),
        })?;
    let patch = fields.into_patch();
    if patch.is_empty() {
        return Ok(ServerReply::Ack);
    }
    Ok(ServerReply::PostFields(patch))
}

/// Decodes a comment field mutation response (comment like).
pub fn decode_comment_mutation(raw: &[u8]) -> Result<ServerReply, ApiError> {
    let body = open_envelope(raw)?;
    if is_empty_body(&body) {
        return Ok(ServerReply::Ack);
    }
    let fields: WireCommentFields =
        serde_json::from_value(body).map_err(|e| ApiError::Malformed {
            what: format!("comment fields: {e}"),
        })?;
    let patch = CommentPatch {
        likes: fields.likes,
        is_liked: fields.is_liked,
        content: fields.content,
    };
    if patch.is_empty() {
        return Ok(ServerReply::Ack);
    }
    Ok(ServerReply::CommentFields(patch))
}

/// Decodes a comment/reply creation response into the confirmed record.
///
/// The body must carry a server-assigned id; anything else is malformed
/// and takes the rollback path.
pub fn decode_comment_insert(raw: &[u8]) -> Result<ServerReply, ApiError> {
    let body = open_envelope(raw)?;
    let comment: WireComment =
        serde_json::from_value(body).map_err(|e| ApiError::Malformed {
            what: format!("comment record: {e}"),
        })?;
    Ok(ServerReply::Comment(comment.into_record()))
}

/// Decodes a feed list response; accepts a bare array or `{posts: [...]}`.
pub fn decode_feed(raw: &[u8]) -> Result<Vec<PostRecord>, ApiError> {
    let body = open_envelope(raw)?;
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("posts") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ApiError::Malformed {
                    what: "feed list".to_string(),
                });
            }
        },
        _ => {
            return Err(ApiError::Malformed {
                what: "feed list".to_string(),
            });
        }
    };

    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let post: WirePost = serde_json::from_value(item).map_err(|e| ApiError::Malformed {
            what: format!("feed post: {e}"),
        })?;
        out.push(post.into_record());
    }
    Ok(out)
}

/// Decodes a comment list response; accepts a bare array or
/// `{comments: [...]}`.
pub fn decode_comment_list(raw: &[u8]) -> Result<Vec<CommentRecord>, ApiError> {
    let body = open_envelope(raw)?;
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("comments") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ApiError::Malformed {
                    what: "comment list".to_string(),
                });
            }
        },
        _ => {
            return Err(ApiError::Malformed {
                what: "comment list".to_string(),
            });
        }
    };

    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let comment: WireComment =
            serde_json::from_value(item).map_err(|e| ApiError::Malformed {
                what: format!("comment: {e}"),
            })?;
        out.push(comment.into_record());
    }
    Ok(out)
}
