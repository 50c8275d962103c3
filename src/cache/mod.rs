//! Time-boxed read cache with single-flight de-duplication.
//!
//! For data that changes infrequently (a user's profile and filtered
//! content): a fresh entry is served without a fetch, concurrent
//! misses join one underlying fetch, and a failed fetch keeps serving
//! the last good value instead of blanking the caller.

/// Profile aggregation variant.
pub mod profile;

use std::pin::Pin;
use std::sync::Mutex;

use hashbrown::HashMap;
use tokio::{
    sync::watch,
    time::{Duration, Instant},
};
use tracing::{debug, trace};

use crate::remote::ApiError;

/// Read-path failure, returned only when there is no value to serve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The fetch failed and no prior value is cached.
    #[error(transparent)]
    Fetch(#[from] ApiError),
}

type LoadResult<V> = Result<V, ApiError>;
type Loader<K, V> =
    Box<dyn Fn(K) -> Pin<Box<dyn Future<Output = LoadResult<V>> + Send>> + Send + Sync>;

struct Stored<V> {
    value: V,
    fetched_at: Instant,
    stale: bool,
}

struct Slot<V> {
    /// Bumped on invalidation; an in-flight fetch started under an
    /// older epoch must not write its result back.
    epoch: u64,
    stored: Option<Stored<V>>,
    inflight: Option<(u64, watch::Receiver<Option<LoadResult<V>>>)>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            epoch: 0,
            stored: None,
            inflight: None,
        }
    }
}

/// TTL-stamped cache keyed by a stable identity, backed by a loader.
pub struct ReadCache<K, V> {
    ttl: Duration,
    loader: Loader<K, V>,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

enum Plan<V> {
    Hit(V),
    Join(watch::Receiver<Option<LoadResult<V>>>),
    Run {
        tx: watch::Sender<Option<LoadResult<V>>>,
        epoch: u64,
    },
}

impl<K, V> ReadCache<K, V>
where
    K: Clone + Eq + std::hash::Hash,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache over `loader` with entries fresh for `ttl`.
    pub fn new<F, Fut>(ttl: Duration, loader: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        Self {
            ttl,
            loader: Box::new(move |key| Box::pin(loader(key))),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value when fresh, otherwise fetches.
    ///
    /// Concurrent calls for the same uncached key join one underlying
    /// fetch. A fetch abandoned by a cancelled caller is restarted on
    /// the next read.
    pub async fn get(&self, key: K) -> Result<V, CacheError> {
        self.read(key, false).await
    }

    /// Re-fetches regardless of TTL when `force` is set; otherwise
    /// behaves like [`ReadCache::get`]. A fetch already in flight is
    /// joined rather than duplicated.
    pub async fn refresh(&self, key: K, force: bool) -> Result<V, CacheError> {
        self.read(key, force).await
    }

    /// Marks the entry stale and discards any in-flight fetch result.
    ///
    /// The stored value is kept as a fallback for fetch failures; the
    /// next read always goes to the loader.
    pub fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().expect("cache lock");
        if let Some(slot) = slots.get_mut(key) {
            slot.epoch += 1;
            if let Some(stored) = &mut slot.stored {
                stored.stale = true;
            }
            slot.inflight = None;
            debug!(epoch = slot.epoch, "cache entry invalidated");
        }
    }

    /// Returns whatever is stored for `key`, fresh or stale, without
    /// fetching.
    pub fn peek(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().expect("cache lock");
        slots
            .get(key)
            .and_then(|slot| slot.stored.as_ref())
            .map(|stored| stored.value.clone())
    }

    async fn read(&self, key: K, force: bool) -> Result<V, CacheError> {
        loop {
            let plan = {
                let mut slots = self.slots.lock().expect("cache lock");
                let slot = slots.entry(key.clone()).or_insert_with(Slot::new);

                if !force
                    && let Some(stored) = slot.stored.as_ref()
                    && !stored.stale
                    && stored.fetched_at.elapsed() < self.ttl
                {
                    trace!("cache hit");
                    Plan::Hit(stored.value.clone())
                } else if let Some((_, rx)) = &slot.inflight {
                    trace!("joining in-flight fetch");
                    Plan::Join(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    let epoch = slot.epoch;
                    slot.inflight = Some((epoch, rx));
                    Plan::Run { tx, epoch }
                }
            };

            match plan {
                Plan::Hit(value) => return Ok(value),
                Plan::Join(rx) => match join_flight(rx.clone()).await {
                    Some(Ok(value)) => return Ok(value),
                    Some(Err(err)) => return self.serve_last_good(&key, err),
                    None => {
                        // The fetch owner was dropped before publishing.
                        // Clear its registration and start a fresh fetch.
                        debug!("abandoned fetch, retrying");
                        let mut slots = self.slots.lock().expect("cache lock");
                        if let Some(slot) = slots.get_mut(&key)
                            && slot
                                .inflight
                                .as_ref()
                                .is_some_and(|(_, cur)| cur.same_channel(&rx))
                        {
                            slot.inflight = None;
                        }
                    }
                },
                Plan::Run { tx, epoch } => {
                    debug!("cache miss, fetching");
                    let result = (self.loader)(key.clone()).await;

                    {
                        let mut slots = self.slots.lock().expect("cache lock");
                        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
                        if slot.epoch == epoch {
                            if let Ok(value) = &result {
                                slot.stored = Some(Stored {
                                    value: value.clone(),
                                    fetched_at: Instant::now(),
                                    stale: false,
                                });
                            }
                        } else {
                            debug!("stale fetch result discarded");
                        }
                        if slot.inflight.as_ref().is_some_and(|(e, _)| *e == epoch) {
                            slot.inflight = None;
                        }
                    }

                    let _ = tx.send(Some(result.clone()));
                    return match result {
                        Ok(value) => Ok(value),
                        Err(err) => self.serve_last_good(&key, err),
                    };
                }
            }
        }
    }

    fn serve_last_good(&self, key: &K, err: ApiError) -> Result<V, CacheError> {
        match self.peek(key) {
            Some(value) => {
                debug!(%err, "fetch failed, serving last good value");
                Ok(value)
            }
            None => Err(CacheError::Fetch(err)),
        }
    }
}

/// Follows another caller's in-flight fetch. `None` means the owner was
/// dropped before publishing a result.
async fn join_flight<V: Clone>(
    mut rx: watch::Receiver<Option<LoadResult<V>>>,
) -> Option<LoadResult<V>> {
    loop {
        if let Some(result) = rx.borrow_and_update().clone() {
            return Some(result);
        }
        if rx.changed().await.is_err() {
            return None;
        }
    }
}
