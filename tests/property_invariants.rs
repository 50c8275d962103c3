use chrono::Utc;
use proptest::prelude::*;

use feedstore::{
    core::store::FeedStore,
    op::Settlement,
    post::{CommentDraft, PostPatch, PostRecord, UserRef, Visibility},
    remote::ServerReply,
    types::{MutationId, PostId, UserId},
};

const POSTS: u8 = 6;

fn author(idx: u8) -> UserRef {
    UserRef {
        id: UserId::new(format!("u{}", idx % 3)),
        name: format!("User {}", idx % 3),
        username: format!("user{}", idx % 3),
        avatar_url: None,
    }
}

fn post(idx: u8) -> PostRecord {
    PostRecord {
        id: PostId::new(format!("p{idx}")),
        author: author(idx),
        content: format!("post {idx}"),
        images: vec![],
        created_at: Utc::now(),
        likes: u32::from(idx) * 3,
        is_liked: false,
        is_bookmarked: false,
        reposts: 0,
        is_reposted: false,
        comment_count: 0,
        visibility: Visibility::Public,
    }
}

fn seeded_store() -> FeedStore {
    let mut store = FeedStore::new();
    store.replace_feed((0..POSTS).map(post).collect());
    store
}

#[derive(Debug, Clone)]
enum Action {
    BeginLike { target: u8, likes: u32 },
    BeginBookmark { target: u8, on: bool },
    BeginComment { target: u8 },
    ResolveOk { pick: u8, likes: u32 },
    ResolveErr { pick: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..POSTS, 0u32..100).prop_map(|(target, likes)| Action::BeginLike { target, likes }),
        (0u8..POSTS, any::<bool>()).prop_map(|(target, on)| Action::BeginBookmark { target, on }),
        (0u8..POSTS).prop_map(|target| Action::BeginComment { target }),
        (0u8..16, 0u32..100).prop_map(|(pick, likes)| Action::ResolveOk { pick, likes }),
        (0u8..16).prop_map(|pick| Action::ResolveErr { pick }),
    ]
}

fn feed_state(store: &FeedStore) -> Vec<PostRecord> {
    store.feed_cloned()
}

proptest! {
    /// Any interleaving of applies and resolutions converges: once every
    /// dispatched op has settled, nothing is pending, and a record is
    /// never left in a state that is neither committed nor the captured
    /// prior.
    #[test]
    fn random_interleavings_always_converge(actions in prop::collection::vec(action_strategy(), 1..120)) {
        let mut store = seeded_store();
        let mut open: Vec<(MutationId, bool)> = Vec::new(); // (op, is_insert)

        for action in actions {
            match action {
                Action::BeginLike { target, likes } => {
                    let id = PostId::new(format!("p{target}"));
                    let op = store.begin_post_fields(&id, PostPatch {
                        likes: Some(likes),
                        is_liked: Some(likes % 2 == 0),
                        ..PostPatch::default()
                    }).expect("begin like");
                    open.push((op, false));
                }
                Action::BeginBookmark { target, on } => {
                    let id = PostId::new(format!("p{target}"));
                    let op = store.begin_post_fields(&id, PostPatch {
                        is_bookmarked: Some(on),
                        ..PostPatch::default()
                    }).expect("begin bookmark");
                    open.push((op, false));
                }
                Action::BeginComment { target } => {
                    let id = PostId::new(format!("p{target}"));
                    let (op, temp) = store.begin_insert_comment(&id, CommentDraft {
                        author: author(target),
                        content: format!("c by {target}"),
                    }).expect("begin comment");
                    prop_assert!(temp.is_temp());
                    open.push((op, true));
                }
                Action::ResolveOk { pick, likes } => {
                    if open.is_empty() {
                        continue;
                    }
                    let (op, is_insert) = open.remove(usize::from(pick) % open.len());
                    let reply = if is_insert {
                        ServerReply::Comment(feedstore::post::CommentRecord {
                            id: feedstore::types::CommentId::new(format!("c_{op}")),
                            author: author(0),
                            content: "ok".to_string(),
                            created_at: Utc::now(),
                            likes: 0,
                            is_liked: false,
                            replies: vec![],
                        })
                    } else {
                        ServerReply::PostFields(PostPatch {
                            likes: Some(likes),
                            ..PostPatch::default()
                        })
                    };
                    let settlement = store.resolve_success(op, reply);
                    prop_assert_ne!(settlement, Settlement::Superseded);
                }
                Action::ResolveErr { pick } => {
                    if open.is_empty() {
                        continue;
                    }
                    let (op, _) = open.remove(usize::from(pick) % open.len());
                    let settlement = store.resolve_failure(op, "failed");
                    prop_assert!(
                        matches!(settlement, Settlement::RolledBack { .. }),
                        "expected Settlement::RolledBack"
                    );
                }
            }

            prop_assert_eq!(store.pending_len(), open.len());
        }

        // Settle everything still open; the registry must drain.
        for (op, _) in open.drain(..) {
            store.resolve_failure(op, "failed");
        }
        prop_assert_eq!(store.pending_len(), 0);

        // No duplicate or leftover temp records anywhere.
        for rec in store.feed() {
            let list = store.comments(&rec.id);
            prop_assert!(!list.iter().any(|c| c.id.is_temp()));
            prop_assert_eq!(u32::try_from(list.len()).unwrap(), rec.comment_count);
        }
    }

    /// Rolling every open mutation back restores the exact pre-mutation
    /// records, verbatim.
    #[test]
    fn full_rollback_restores_initial_records(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let mut store = seeded_store();
        let initial = feed_state(&store);
        let mut open: Vec<MutationId> = Vec::new();

        for action in actions {
            match action {
                Action::BeginLike { target, likes } => {
                    let id = PostId::new(format!("p{target}"));
                    let op = store.begin_post_fields(&id, PostPatch {
                        likes: Some(likes),
                        is_liked: Some(true),
                        ..PostPatch::default()
                    }).expect("begin");
                    open.push(op);
                }
                Action::BeginBookmark { target, on } => {
                    let id = PostId::new(format!("p{target}"));
                    let op = store.begin_post_fields(&id, PostPatch {
                        is_bookmarked: Some(on),
                        ..PostPatch::default()
                    }).expect("begin");
                    open.push(op);
                }
                Action::BeginComment { target } => {
                    let id = PostId::new(format!("p{target}"));
                    let (op, _) = store.begin_insert_comment(&id, CommentDraft {
                        author: author(target),
                        content: "c".to_string(),
                    }).expect("begin");
                    open.push(op);
                }
                // Resolutions are not exercised here; this property is
                // about pure rollback.
                Action::ResolveOk { .. } | Action::ResolveErr { .. } => {}
            }
        }

        // Reverse order unwinds chained priors on the same field.
        for op in open.into_iter().rev() {
            store.resolve_failure(op, "failed");
        }

        prop_assert_eq!(feed_state(&store), initial);
        prop_assert_eq!(store.pending_len(), 0);
        for rec in store.feed() {
            prop_assert!(store.comments(&rec.id).is_empty());
        }
    }

    /// Hydration and removal keep order, position, and author index
    /// consistent.
    #[test]
    fn hydrate_insert_remove_keep_indices_consistent(removals in prop::collection::vec(0u8..POSTS, 0..8)) {
        let mut store = seeded_store();

        for (i, target) in removals.iter().enumerate() {
            let id = PostId::new(format!("p{target}"));
            let _ = store.remove_post(&id);

            let new_id = format!("n{i}");
            store.insert_post({
                let mut rec = post(*target);
                rec.id = PostId::new(new_id.clone());
                rec
            }).expect("insert");

            // Front insertion: newest first.
            prop_assert_eq!(store.ordered_ids()[0].clone(), PostId::new(new_id));

            // Author index agrees with a full scan.
            for uidx in 0u8..3 {
                let user = UserId::new(format!("u{uidx}"));
                let indexed: Vec<PostId> = store.by_author(&user).into_iter().map(|r| r.id.clone()).collect();
                let mut scanned: Vec<PostId> = store
                    .ordered_ids()
                    .iter()
                    .filter(|id| store.get(id).is_some_and(|r| r.author.id == user))
                    .cloned()
                    .collect();
                let mut indexed_sorted = indexed.clone();
                indexed_sorted.sort_by(|a, b| a.0.cmp(&b.0));
                scanned.sort_by(|a, b| a.0.cmp(&b.0));
                prop_assert_eq!(indexed_sorted, scanned);
            }

            prop_assert_eq!(store.ordered_ids().len(), store.feed().len());
        }
    }
}
