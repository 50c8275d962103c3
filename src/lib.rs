//! Client-side state layer for a social feed: optimistic mutations with
//! server reconciliation and rollback, over an in-memory post store.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::FeedStore`]:
//! ```
//! use chrono::Utc;
//! use feedstore::{
//!     core::store::FeedStore,
//!     post::{PostPatch, PostRecord, UserRef, Visibility},
//!     remote::ServerReply,
//!     types::{PostId, UserId},
//! };
//!
//! let p1 = PostId::new("p1");
//! let mut store = FeedStore::new();
//! store.replace_feed(vec![PostRecord {
//!     id: p1.clone(),
//!     author: UserRef {
//!         id: UserId::new("u1"),
//!         name: "Ada".to_string(),
//!         username: "ada".to_string(),
//!         avatar_url: None,
//!     },
//!     content: "hello".to_string(),
//!     images: vec![],
//!     created_at: Utc::now(),
//!     likes: 10,
//!     is_liked: false,
//!     is_bookmarked: false,
//!     reposts: 0,
//!     is_reposted: false,
//!     comment_count: 0,
//!     visibility: Visibility::Public,
//! }]);
//!
//! // Optimistic like: visible immediately.
//! let op = store.begin_post_fields(&p1, PostPatch {
//!     likes: Some(11),
//!     is_liked: Some(true),
//!     ..PostPatch::default()
//! }).expect("begin");
//! assert_eq!(store.get(&p1).expect("post").likes, 11);
//!
//! // Server reconciles with its own count.
//! store.resolve_success(op, ServerReply::PostFields(PostPatch {
//!     likes: Some(12),
//!     is_liked: Some(true),
//!     ..PostPatch::default()
//! }));
//! assert_eq!(store.get(&p1).expect("post").likes, 12);
//! assert_eq!(store.pending_len(), 0);
//! ```
//!
//! Runtime usage with an injected request future and SQLite snapshots:
//! ```no_run
//! use feedstore::{
//!     op::{Change, MutationIntent},
//!     persist::sqlite::SqliteStateSink,
//!     post::PostPatch,
//!     remote::ServerReply,
//!     runtime::handle::{spawn_feed, RuntimeConfig},
//!     types::PostId,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteStateSink::open("feed.db").expect("open sqlite");
//! let store = sink.load_store().expect("load snapshot");
//! let handle = spawn_feed(store, Some(Box::new(sink)), RuntimeConfig::default());
//!
//! let intent = MutationIntent::new(
//!     Change::Post {
//!         id: PostId::new("p1"),
//!         patch: PostPatch { is_bookmarked: Some(true), ..PostPatch::default() },
//!     },
//!     async {
//!         // The caller's API client issues the real request here.
//!         Ok(ServerReply::Ack)
//!     },
//! );
//! let ticket = handle.perform(intent).await.expect("perform");
//! let _settlement = ticket.settled().await;
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Time-boxed read cache and profile aggregation.
pub mod cache;
/// Core in-memory store and index helpers.
pub mod core;
/// Mutation intent model and settlement types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Post and comment domain records and patches.
pub mod post;
/// Request seam, error taxonomy, and envelope decoding.
pub mod remote;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared identifier types.
pub mod types;
