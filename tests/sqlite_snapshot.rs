use chrono::Utc;
use tempfile::TempDir;

use feedstore::{
    core::store::FeedStore,
    persist::{StateSink, sqlite::SqliteStateSink},
    post::{CommentRecord, PostPatch, PostRecord, UserRef, Visibility},
    types::{CommentId, PostId, UserId},
};

fn author(id: &str) -> UserRef {
    UserRef {
        id: UserId::new(id),
        name: format!("User {id}"),
        username: id.to_string(),
        avatar_url: None,
    }
}

fn post(id: &str, likes: u32) -> PostRecord {
    PostRecord {
        id: PostId::new(id),
        author: author("u1"),
        content: format!("post {id}"),
        images: vec![format!("https://img/{id}.jpg")],
        created_at: Utc::now(),
        likes,
        is_liked: false,
        is_bookmarked: false,
        reposts: 0,
        is_reposted: false,
        comment_count: 0,
        visibility: Visibility::Public,
    }
}

fn comment(id: &str) -> CommentRecord {
    CommentRecord {
        id: CommentId::new(id),
        author: author("u2"),
        content: format!("comment {id}"),
        created_at: Utc::now(),
        likes: 2,
        is_liked: true,
        replies: vec![],
    }
}

#[test]
fn snapshot_round_trips_feed_and_comments() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("feed.db");

    let mut store = FeedStore::new();
    store.replace_feed(vec![post("p1", 10), post("p2", 3)]);
    store
        .replace_comments(&PostId::new("p1"), vec![comment("c_1"), comment("c_2")])
        .unwrap();

    let mut sink = SqliteStateSink::open(&db_path).expect("open sqlite");
    sink.write_snapshot(&store.export_snapshot()).expect("write");
    drop(sink);

    let reopened = SqliteStateSink::open(&db_path).expect("reopen");
    let loaded = reopened.load_store().expect("load");

    assert_eq!(loaded.ordered_ids(), store.ordered_ids());
    assert_eq!(loaded.feed_cloned(), store.feed_cloned());
    assert_eq!(
        loaded.comments(&PostId::new("p1")),
        store.comments(&PostId::new("p1"))
    );
    assert_eq!(
        loaded.by_author_cloned(&UserId::new("u1")),
        store.by_author_cloned(&UserId::new("u1"))
    );
}

#[test]
fn latest_snapshot_wins() {
    let mut sink = SqliteStateSink::open_in_memory().expect("open");

    let mut first = FeedStore::new();
    first.replace_feed(vec![post("p1", 1)]);
    sink.write_snapshot(&first.export_snapshot()).expect("write");

    let mut second = FeedStore::new();
    second.replace_feed(vec![post("p1", 99), post("p2", 7)]);
    sink.write_snapshot(&second.export_snapshot()).expect("write");

    let loaded = sink.load_store().expect("load");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get(&PostId::new("p1")).unwrap().likes, 99);
}

#[test]
fn pending_mutations_never_reach_the_sink() {
    let mut sink = SqliteStateSink::open_in_memory().expect("open");

    let mut store = FeedStore::new();
    store.replace_feed(vec![post("p1", 10)]);
    let _op = store
        .begin_post_fields(
            &PostId::new("p1"),
            PostPatch {
                likes: Some(11),
                is_liked: Some(true),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert_eq!(store.pending_len(), 1);

    sink.write_snapshot(&store.export_snapshot()).expect("write");
    let loaded = sink.load_store().expect("load");

    // The loaded store carries the field values but no pending ops; the
    // network hydration that follows boot makes them authoritative.
    assert_eq!(loaded.pending_len(), 0);
}

#[test]
fn compact_keeps_only_the_latest_snapshot() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("feed.db");
    let mut sink = SqliteStateSink::open(&db_path).expect("open");

    for likes in 0..5u32 {
        let mut store = FeedStore::new();
        store.replace_feed(vec![post("p1", likes)]);
        sink.write_snapshot(&store.export_snapshot()).expect("write");
    }

    let removed = sink.compact().expect("compact");
    assert_eq!(removed, 4);

    let loaded = sink.load_store().expect("load");
    assert_eq!(loaded.get(&PostId::new("p1")).unwrap().likes, 4);
}

#[test]
fn empty_sink_loads_an_empty_store() {
    let sink = SqliteStateSink::open_in_memory().expect("open");
    let loaded = sink.load_store().expect("load");
    assert!(loaded.is_empty());
    assert!(sink.load_snapshot().expect("snapshot").is_none());
}
