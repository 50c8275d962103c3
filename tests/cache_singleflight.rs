use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use tokio::{
    sync::oneshot,
    time::{Duration, advance, sleep},
};

use feedstore::{
    cache::{CacheError, ReadCache},
    remote::ApiError,
};

const TTL: Duration = Duration::from_secs(60);

fn counting_cache(
    fail_from_call: usize,
) -> (Arc<ReadCache<String, String>>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_loader = Arc::clone(&calls);
    let cache = ReadCache::new(TTL, move |key: String| {
        let calls = Arc::clone(&calls_loader);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            // Yield so concurrent callers pile up on one flight.
            sleep(Duration::from_millis(10)).await;
            if n >= fail_from_call {
                Err(ApiError::Status { code: 503 })
            } else {
                Ok(format!("{key}:v{n}"))
            }
        }
    });
    (Arc::new(cache), calls)
}

#[tokio::test(start_paused = true)]
async fn concurrent_gets_share_one_fetch() {
    let (cache, calls) = counting_cache(usize::MAX);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            cache.get("profile".to_string()).await
        }));
    }

    for task in tasks {
        let value = task.await.expect("join").expect("get");
        assert_eq!(value, "profile:v1");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_hits_skip_the_loader_until_ttl_expires() {
    let (cache, calls) = counting_cache(usize::MAX);

    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    advance(TTL / 2).await;
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    advance(TTL).await;
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn forced_refresh_ignores_ttl() {
    let (cache, calls) = counting_cache(usize::MAX);

    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    assert_eq!(
        cache.refresh("k".to_string(), false).await.expect("refresh"),
        "k:v1"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(
        cache.refresh("k".to_string(), true).await.expect("refresh"),
        "k:v2"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_keeps_serving_last_good_value() {
    let (cache, calls) = counting_cache(2);

    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");

    advance(TTL * 2).await;
    // Expired, re-fetch fails: the stale value is better than a blank.
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failure_with_nothing_cached_is_an_error() {
    let (cache, _) = counting_cache(1);

    let err = cache.get("k".to_string()).await.expect_err("no value");
    assert_eq!(err, CacheError::Fetch(ApiError::Status { code: 503 }));
    assert!(cache.peek(&"k".to_string()).is_none());
}

#[tokio::test(start_paused = true)]
async fn invalidation_discards_inflight_result() {
    // The first call blocks on a gate; later calls return immediately.
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let gate: Arc<Mutex<Option<oneshot::Receiver<()>>>> = Arc::new(Mutex::new(Some(gate_rx)));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_loader = Arc::clone(&calls);
    let gate_loader = Arc::clone(&gate);
    let cache: Arc<ReadCache<String, String>> = Arc::new(ReadCache::new(TTL, move |key: String| {
        let calls = Arc::clone(&calls_loader);
        let gate = Arc::clone(&gate_loader);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let rx = gate.lock().unwrap().take();
            if let Some(rx) = rx {
                let _ = rx.await;
            }
            Ok(format!("{key}:v{n}"))
        }
    }));

    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("k".to_string()).await })
    };
    // Let the first fetch reach the gate, then invalidate under it.
    tokio::task::yield_now().await;
    cache.invalidate(&"k".to_string());
    gate_tx.send(()).expect("gate");

    // The first caller still gets its answer, but the cache must not
    // have stored it.
    assert_eq!(first.await.expect("join").expect("get"), "k:v1");
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_fetch_does_not_wedge_the_key() {
    let (cache, calls) = counting_cache(usize::MAX);

    // The fetch runs inside the first caller; dropping that caller
    // mid-flight abandons the fetch.
    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("k".to_string()).await })
    };
    tokio::task::yield_now().await;
    first.abort();
    assert!(first.await.expect_err("aborted").is_cancelled());

    // The next read must start a fresh fetch, not join the dead one.
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidated_value_still_serves_as_fallback() {
    let (cache, calls) = counting_cache(2);

    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    cache.invalidate(&"k".to_string());

    // Invalidation forces the fetch even inside the TTL; the fetch
    // fails, and the old value still serves.
    assert_eq!(cache.get("k".to_string()).await.expect("get"), "k:v1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.peek(&"k".to_string()), Some("k:v1".to_string()));
}
