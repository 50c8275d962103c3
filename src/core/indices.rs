//! Index type aliases shared by the store.

use hashbrown::HashMap;

use crate::types::PostId;

/// Multi-valued index from a key to post ids in insertion order.
pub type VecIndex<K> = HashMap<K, Vec<PostId>>;
