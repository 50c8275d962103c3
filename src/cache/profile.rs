//! Profile aggregation: a user's record plus their filtered content,
//! cached with a TTL.

use serde::{Deserialize, Serialize};

use crate::{
    post::{PostRecord, UserRef},
    types::UserId,
};

use super::ReadCache;

/// A user's profile view: their record and content slices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileBundle {
    /// Profile owner.
    pub user: UserRef,
    /// Posts authored by the user, feed order.
    pub posts: Vec<PostRecord>,
    /// Authored posts carrying images.
    pub showcase: Vec<PostRecord>,
}

impl ProfileBundle {
    /// Builds a bundle by filtering an already-loaded feed.
    pub fn from_feed(user: UserRef, feed: &[PostRecord]) -> Self {
        let posts = filter_user_content(&user.id, feed);
        let showcase = posts
            .iter()
            .filter(|p| !p.images.is_empty())
            .cloned()
            .collect();
        Self {
            user,
            posts,
            showcase,
        }
    }
}

/// Returns the posts in `feed` authored by `user`, preserving order.
pub fn filter_user_content(user: &UserId, feed: &[PostRecord]) -> Vec<PostRecord> {
    feed.iter()
        .filter(|p| &p.author.id == user)
        .cloned()
        .collect()
}

/// Read cache keyed by user id, holding profile bundles.
pub type ProfileCache = ReadCache<UserId, ProfileBundle>;
