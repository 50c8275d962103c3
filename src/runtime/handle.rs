//! Single-writer actor over the feed store.
//!
//! All store writes happen inside one task; request futures run
//! detached and re-enter only through the resolution channel, so no
//! other code path can interleave with an apply or a rollback.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    core::store::{FeedStore, StoreError},
    op::{MutationIntent, Resolution, Settlement, Target},
    persist::{PersistError, StateSink},
    post::{CommentRecord, PostPatch, PostRecord},
    remote::ApiError,
    types::{CommentId, MutationId, PostId, UserId},
};

use super::events::{ChangeScope, FeedEvent};

/// Runtime-level failure.
///
/// Only defect-class conditions surface here; a failed request settles
/// its ticket as a rollback and never returns an error from `perform`.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Persistence failure during checkpoint or shutdown.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The runtime task is gone.
    #[error("runtime channel closed")]
    ChannelClosed,
}

/// Runtime tuning knobs.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Command queue capacity.
    pub command_queue_bound: usize,
    /// Broadcast event buffer capacity.
    pub event_capacity: usize,
    /// Auto-checkpoint after this many settled mutations. Zero disables.
    pub snapshot_every_settled: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
            snapshot_every_settled: 256,
        }
    }
}

/// Receipt for a dispatched mutation.
#[derive(Debug)]
pub struct MutationTicket {
    /// Mutation sequence assigned at apply time.
    pub op: MutationId,
    /// Temp id for insertion-style mutations.
    pub temp_id: Option<CommentId>,
    settled_rx: oneshot::Receiver<Settlement>,
}

impl MutationTicket {
    /// Waits for the mutation's terminal disposition.
    ///
    /// A dropped runtime settles as [`Settlement::Superseded`]; the
    /// caller is no longer interested, never an error.
    pub async fn settled(self) -> Settlement {
        self.settled_rx.await.unwrap_or(Settlement::Superseded)
    }
}

/// Cloneable handle to the feed runtime.
pub struct FeedHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<FeedEvent>,
}

impl Clone for FeedHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Perform {
        intent: MutationIntent,
        resp: oneshot::Sender<Result<MutationTicket, RuntimeError>>,
    },
    ReplaceFeed {
        posts: Vec<PostRecord>,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    ReplaceComments {
        post: PostId,
        list: Vec<CommentRecord>,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    InsertPost {
        rec: PostRecord,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    RemovePost {
        id: PostId,
        resp: oneshot::Sender<Result<PostRecord, RuntimeError>>,
    },
    ApplyServerPatch {
        id: PostId,
        patch: PostPatch,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Get {
        id: PostId,
        resp: oneshot::Sender<Option<PostRecord>>,
    },
    Feed {
        resp: oneshot::Sender<Vec<PostRecord>>,
    },
    Recent {
        n: usize,
        resp: oneshot::Sender<Vec<PostRecord>>,
    },
    ByAuthor {
        user: UserId,
        resp: oneshot::Sender<Vec<PostRecord>>,
    },
    Comments {
        post: PostId,
        resp: oneshot::Sender<Vec<CommentRecord>>,
    },
    PendingLen {
        resp: oneshot::Sender<usize>,
    },
    NotifyRemoteChange {
        scope: ChangeScope,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

struct OpMeta {
    target: Target,
    notice: String,
    settle: oneshot::Sender<Settlement>,
}

type SharedSink = Arc<Mutex<Box<dyn StateSink>>>;

/// Spawns the feed runtime and returns its handle.
pub fn spawn_feed(
    store: FeedStore,
    sink: Option<Box<dyn StateSink>>,
    config: RuntimeConfig,
) -> FeedHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound);
    let (events_tx, _) = broadcast::channel::<FeedEvent>(config.event_capacity);
    let (res_tx, mut res_rx) = mpsc::unbounded_channel::<Resolution>();

    let sink = sink.map(|s| Arc::new(Mutex::new(s)));
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        let mut inflight = hashbrown::HashMap::<MutationId, OpMeta>::new();
        let mut settled_since_snapshot = 0usize;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    let done = handle_command(
                        cmd,
                        &mut store,
                        &events_tx_loop,
                        &res_tx,
                        sink.as_ref(),
                        &mut inflight,
                    )
                    .await;
                    if done {
                        break;
                    }
                }
                res = res_rx.recv() => {
                    let Some(res) = res else { break };
                    if !handle_resolution(res, &mut store, &events_tx_loop, &mut inflight) {
                        continue;
                    }
                    settled_since_snapshot += 1;
                    maybe_auto_checkpoint(
                        &store,
                        sink.as_ref(),
                        &events_tx_loop,
                        &config,
                        &mut settled_since_snapshot,
                    )
                    .await;
                }
            }
        }
    });

    FeedHandle { cmd_tx, events_tx }
}

impl FeedHandle {
    /// Subscribes to the runtime event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events_tx.subscribe()
    }

    /// Applies an intent optimistically and dispatches its request.
    ///
    /// The optimistic value is in the store before this returns; any
    /// subsequent query observes it. The request runs detached and the
    /// returned ticket settles when it commits, rolls back, or is
    /// superseded. `Err` here means a defect-class condition (unknown
    /// target, runtime gone), never a request failure.
    pub async fn perform(&self, intent: MutationIntent) -> Result<MutationTicket, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Perform { intent, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Replaces the whole feed with a server-fetched list.
    ///
    /// Pending mutations are superseded; their in-flight resolutions
    /// are discarded silently.
    pub async fn replace_feed(&self, posts: Vec<PostRecord>) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ReplaceFeed { posts, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Replaces a post's comment list with a server-fetched one.
    ///
    /// Pending mutations targeting the post's comments are superseded.
    pub async fn replace_comments(
        &self,
        post: PostId,
        list: Vec<CommentRecord>,
    ) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ReplaceComments {
                post,
                list,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Inserts a confirmed post at the front of the feed.
    pub async fn insert_post(&self, rec: PostRecord) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::InsertPost { rec, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Removes a post and returns its last record.
    pub async fn remove_post(&self, id: PostId) -> Result<PostRecord, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RemovePost { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Applies a server-authoritative patch outside the optimistic flow.
    pub async fn apply_server_patch(
        &self,
        id: PostId,
        patch: PostPatch,
    ) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ApplyServerPatch { id, patch, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Returns a post by id.
    pub async fn get(&self, id: PostId) -> Result<Option<PostRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Returns the full feed in order.
    pub async fn feed(&self) -> Result<Vec<PostRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Feed { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Returns the first `n` posts of the feed.
    pub async fn recent(&self, n: usize) -> Result<Vec<PostRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Recent { n, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Returns posts authored by `user`.
    pub async fn by_author(&self, user: UserId) -> Result<Vec<PostRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::ByAuthor { user, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Returns a post's comment list.
    pub async fn comments(&self, post: PostId) -> Result<Vec<CommentRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Comments { post, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Number of mutations applied but not yet settled.
    pub async fn pending_len(&self) -> Result<usize, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PendingLen { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Forwards an external change notification to subscribers.
    pub async fn notify_remote_change(&self, scope: ChangeScope) -> Result<(), RuntimeError> {
        self.cmd_tx
            .send(Command::NotifyRemoteChange { scope })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Writes a snapshot to the state sink, when one is configured.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Checkpoint { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Writes a final snapshot and stops the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

async fn handle_command(
    cmd: Command,
    store: &mut FeedStore,
    events_tx: &broadcast::Sender<FeedEvent>,
    res_tx: &mpsc::UnboundedSender<Resolution>,
    sink: Option<&SharedSink>,
    inflight: &mut hashbrown::HashMap<MutationId, OpMeta>,
) -> bool {
    match cmd {
        Command::Perform { intent, resp } => {
            let MutationIntent {
                change,
                request,
                failure_notice,
            } = intent;
            let notice =
                failure_notice.unwrap_or_else(|| change.default_notice().to_string());

            match store.begin(change) {
                Ok((op, temp_id, target)) => {
                    debug!(op, ?target, "optimistic mutation applied");
                    let _ = events_tx.send(FeedEvent::MutationApplied {
                        op,
                        target: target.clone(),
                    });

                    let (settle_tx, settled_rx) = oneshot::channel();
                    inflight.insert(
                        op,
                        OpMeta {
                            target,
                            notice,
                            settle: settle_tx,
                        },
                    );

                    let res_tx = res_tx.clone();
                    tokio::spawn(async move {
                        let outcome = request.await;
                        let _ = res_tx.send(Resolution { op, outcome });
                    });

                    let _ = resp.send(Ok(MutationTicket {
                        op,
                        temp_id,
                        settled_rx,
                    }));
                }
                Err(err) => {
                    // The request is dropped undispatched; apply failed,
                    // so there is nothing to reconcile.
                    let _ = resp.send(Err(RuntimeError::Store(err)));
                }
            }
        }
        Command::ReplaceFeed { posts, resp } => {
            let superseded = store.replace_feed(posts);
            for op in superseded {
                if let Some(meta) = inflight.remove(&op) {
                    debug!(op, "pending mutation superseded by feed replace");
                    let _ = meta.settle.send(Settlement::Superseded);
                }
            }
            let _ = events_tx.send(FeedEvent::FeedReplaced { posts: store.len() });
            let _ = resp.send(Ok(()));
        }
        Command::ReplaceComments { post, list, resp } => {
            let res = match store.replace_comments(&post, list) {
                Ok(superseded) => {
                    for op in superseded {
                        if let Some(meta) = inflight.remove(&op) {
                            debug!(op, "pending mutation superseded by comment refetch");
                            let _ = meta.settle.send(Settlement::Superseded);
                        }
                    }
                    let _ = events_tx.send(FeedEvent::CommentsReplaced { post });
                    Ok(())
                }
                Err(err) => Err(RuntimeError::Store(err)),
            };
            let _ = resp.send(res);
        }
        Command::InsertPost { rec, resp } => {
            let id = rec.id.clone();
            let res = store
                .insert_post(rec)
                .map_err(RuntimeError::from)
                .map(|()| {
                    let _ = events_tx.send(FeedEvent::PostInserted { id });
                });
            let _ = resp.send(res);
        }
        Command::RemovePost { id, resp } => {
            let res = store
                .remove_post(&id)
                .map_err(RuntimeError::from)
                .inspect(|_| {
                    let _ = events_tx.send(FeedEvent::PostRemoved { id });
                });
            let _ = resp.send(res);
        }
        Command::ApplyServerPatch { id, patch, resp } => {
            let res = store
                .apply_server_patch(&id, patch)
                .map_err(RuntimeError::from);
            let _ = resp.send(res);
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get_cloned(&id));
        }
        Command::Feed { resp } => {
            let _ = resp.send(store.feed_cloned());
        }
        Command::Recent { n, resp } => {
            let _ = resp.send(store.recent_cloned(n));
        }
        Command::ByAuthor { user, resp } => {
            let _ = resp.send(store.by_author_cloned(&user));
        }
        Command::Comments { post, resp } => {
            let _ = resp.send(store.comments_cloned(&post));
        }
        Command::PendingLen { resp } => {
            let _ = resp.send(store.pending_len());
        }
        Command::NotifyRemoteChange { scope } => {
            let _ = events_tx.send(FeedEvent::RemoteChanged { scope });
        }
        Command::Checkpoint { resp } => {
            let out = match sink {
                Some(sink) => run_checkpoint(sink, store, events_tx)
                    .await
                    .map_err(RuntimeError::from),
                None => Ok(()),
            };
            let _ = resp.send(out);
        }
        Command::Shutdown { resp } => {
            let out = match sink {
                Some(sink) => run_checkpoint(sink, store, events_tx)
                    .await
                    .map_err(RuntimeError::from),
                None => Ok(()),
            };
            let _ = resp.send(out);
            return true;
        }
    }

    false
}

/// Returns true when the resolution settled a mutation; discarded and
/// superseded resolutions do not count toward the checkpoint cadence.
fn handle_resolution(
    res: Resolution,
    store: &mut FeedStore,
    events_tx: &broadcast::Sender<FeedEvent>,
    inflight: &mut hashbrown::HashMap<MutationId, OpMeta>,
) -> bool {
    let Resolution { op, outcome } = res;
    let Some(meta) = inflight.remove(&op) else {
        debug!(op, "stale resolution discarded");
        return false;
    };

    let settlement = match outcome {
        Ok(reply) => store.resolve_success(op, reply),
        Err(err) => {
            let notice = match err {
                ApiError::Rejected { message } => message,
                _ => meta.notice.clone(),
            };
            store.resolve_failure(op, notice)
        }
    };

    let settled = match &settlement {
        Settlement::Committed => {
            debug!(op, target = ?meta.target, "mutation committed");
            let _ = events_tx.send(FeedEvent::MutationCommitted {
                op,
                target: meta.target.clone(),
            });
            true
        }
        Settlement::RolledBack { notice } => {
            warn!(op, target = ?meta.target, %notice, "mutation rolled back");
            let _ = events_tx.send(FeedEvent::MutationRolledBack {
                op,
                target: meta.target.clone(),
                notice: notice.clone(),
            });
            true
        }
        Settlement::Superseded => {
            debug!(op, "resolution superseded");
            false
        }
    };

    let _ = meta.settle.send(settlement);
    settled
}

async fn run_checkpoint(
    sink: &SharedSink,
    store: &FeedStore,
    events_tx: &broadcast::Sender<FeedEvent>,
) -> Result<(), PersistError> {
    let snapshot = store.export_snapshot();
    let posts = snapshot.posts.len();
    let sink_ref = Arc::clone(sink);

    tokio::task::spawn_blocking(move || {
        let mut sink = sink_ref.blocking_lock();
        sink.write_snapshot(&snapshot)?;
        sink.flush()
    })
    .await
    .map_err(|e| PersistError::Message(format!("join error: {e}")))??;

    let _ = events_tx.send(FeedEvent::SnapshotSaved { posts });
    Ok(())
}

async fn maybe_auto_checkpoint(
    store: &FeedStore,
    sink: Option<&SharedSink>,
    events_tx: &broadcast::Sender<FeedEvent>,
    config: &RuntimeConfig,
    settled_since_snapshot: &mut usize,
) {
    if config.snapshot_every_settled == 0 || *settled_since_snapshot < config.snapshot_every_settled
    {
        return;
    }
    let Some(sink) = sink else {
        return;
    };
    if let Err(err) = run_checkpoint(sink, store, events_tx).await {
        warn!(%err, "auto checkpoint failed");
    }
    *settled_since_snapshot = 0;
}
