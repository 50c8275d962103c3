use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use feedstore::{
    core::store::FeedStore,
    post::{PostPatch, PostRecord, UserRef, Visibility},
    remote::ServerReply,
    types::{PostId, UserId},
};

fn post(idx: u64) -> PostRecord {
    PostRecord {
        id: PostId::new(format!("p{idx}")),
        author: UserRef {
            id: UserId::new(format!("u{}", idx % 50)),
            name: format!("User {}", idx % 50),
            username: format!("user{}", idx % 50),
            avatar_url: None,
        },
        content: format!("post {idx}"),
        images: vec![],
        created_at: Utc::now(),
        likes: (idx % 100) as u32,
        is_liked: false,
        is_bookmarked: false,
        reposts: 0,
        is_reposted: false,
        comment_count: 0,
        visibility: Visibility::Public,
    }
}

fn bench_hydrate(c: &mut Criterion) {
    let posts: Vec<PostRecord> = (0..10_000u64).map(post).collect();
    c.bench_function("replace_feed_10k", |b| {
        b.iter(|| {
            let mut store = FeedStore::new();
            store.replace_feed(posts.clone());
        });
    });
}

fn bench_begin_resolve_churn(c: &mut Criterion) {
    c.bench_function("begin_resolve_10k", |b| {
        b.iter(|| {
            let mut store = FeedStore::new();
            store.replace_feed((0..1_000u64).map(post).collect());
            for i in 0..10_000u64 {
                let id = PostId::new(format!("p{}", i % 1_000));
                let likes = (i % 100) as u32;
                let op = store
                    .begin_post_fields(
                        &id,
                        PostPatch {
                            likes: Some(likes + 1),
                            is_liked: Some(true),
                            ..PostPatch::default()
                        },
                    )
                    .expect("begin");
                store.resolve_success(
                    op,
                    ServerReply::PostFields(PostPatch {
                        likes: Some(likes + 2),
                        ..PostPatch::default()
                    }),
                );
            }
        });
    });
}

fn bench_recent_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("recent_query");
    let mut store = FeedStore::new();
    store.replace_feed((0..50_000u64).map(post).collect());

    for n in [10usize, 100usize, 1000usize] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let _ = store.recent(n);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hydrate, bench_begin_resolve_churn, bench_recent_query);
criterion_main!(benches);
