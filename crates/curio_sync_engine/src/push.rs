//! Background push engine.
//!
//! An explicitly constructed service object (no ambient global): it
//! owns a dedicated worker thread fed by a command channel. Callers
//! schedule pushes fire-and-forget; the channel's receive timeout
//! doubles as the periodic retry tick, which is the sole mechanism that
//! recovers records after a failed push.

use crate::config::SyncConfig;
use crate::transport::{Connectivity, RemoteTransport};
use curio_core::{Feed, LocalId, Record, RecordStore, RemoteId, Timestamp};
use curio_sync_protocol::PushRequest;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A push outcome observable by UIs (e.g. a per-record sync indicator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A record was accepted by the remote store.
    Pushed {
        /// The pushed record.
        local_id: LocalId,
        /// The remote ID assigned or confirmed.
        remote_id: RemoteId,
    },
    /// A push attempt failed; the record stays dirty and will be
    /// retried on the next periodic pass.
    PushFailed {
        /// The record whose push failed.
        local_id: LocalId,
        /// Human-readable failure reason (non-blocking warning).
        reason: String,
    },
}

/// Counters maintained by the background engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Pushes accepted by the remote store.
    pub pushes_succeeded: u64,
    /// Push attempts that failed (transient or rejected).
    pub pushes_failed: u64,
    /// Batch passes executed (periodic ticks, flushes, online edges).
    pub passes: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

enum Command {
    Push(LocalId),
    Flush,
    Online(bool),
    Shutdown,
}

/// Asynchronously converges dirty local records with the remote store
/// without blocking callers.
///
/// At most one push is in flight at a time (the worker is single
/// threaded); scheduling a record that is already queued coalesces into
/// a single follow-up attempt. Failures never propagate to the caller
/// that scheduled the push.
pub struct BackgroundSync {
    tx: Sender<Command>,
    handle: Option<JoinHandle<()>>,
    connectivity: Arc<Connectivity>,
    queued: Arc<Mutex<HashSet<LocalId>>>,
    feed: Arc<Feed<SyncEvent>>,
    stats: Arc<RwLock<SyncStats>>,
}

impl BackgroundSync {
    /// Creates the engine and starts its worker thread.
    #[must_use]
    pub fn new(
        store: Arc<RecordStore>,
        transport: Arc<dyn RemoteTransport>,
        config: SyncConfig,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let queued = Arc::new(Mutex::new(HashSet::new()));
        let feed = Arc::new(Feed::new());
        let stats = Arc::new(RwLock::new(SyncStats::default()));

        let worker = Worker {
            store,
            transport,
            config,
            connectivity: Arc::clone(&connectivity),
            queued: Arc::clone(&queued),
            feed: Arc::clone(&feed),
            stats: Arc::clone(&stats),
        };
        let handle = std::thread::Builder::new()
            .name("curio-sync".into())
            .spawn(move || worker.run(rx))
            .ok();

        Self {
            tx,
            handle,
            connectivity,
            queued,
            feed,
            stats,
        }
    }

    /// Enqueues a push attempt for one record and returns immediately.
    ///
    /// Scheduling the same record again while an attempt is queued or
    /// in flight folds into one follow-up attempt.
    pub fn schedule_push(&self, local_id: LocalId) {
        if self.queued.lock().insert(local_id) {
            // A send failure means the worker is gone; the record stays
            // dirty and a later engine owns the retry.
            let _ = self.tx.send(Command::Push(local_id));
        }
    }

    /// Triggers one batch pass over all dirty records (manual sync).
    pub fn flush(&self) {
        let _ = self.tx.send(Command::Flush);
    }

    /// Updates the online state.
    ///
    /// The offline→online transition triggers an immediate batch pass
    /// instead of waiting for the next periodic tick; while offline,
    /// push attempts are suppressed.
    pub fn set_online(&self, online: bool) {
        let was_online = self.connectivity.set_online(online);
        if online && !was_online {
            let _ = self.tx.send(Command::Online(true));
        }
    }

    /// Returns true if the engine considers itself online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Subscribes to push outcomes.
    pub fn subscribe(&self) -> Receiver<SyncEvent> {
        self.feed.subscribe()
    }

    /// Returns a snapshot of the engine counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    store: Arc<RecordStore>,
    transport: Arc<dyn RemoteTransport>,
    config: SyncConfig,
    connectivity: Arc<Connectivity>,
    queued: Arc<Mutex<HashSet<LocalId>>>,
    feed: Arc<Feed<SyncEvent>>,
    stats: Arc<RwLock<SyncStats>>,
}

impl Worker {
    fn run(self, rx: Receiver<Command>) {
        loop {
            match rx.recv_timeout(self.config.retry_interval) {
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Command::Push(local_id)) => self.handle_push(local_id),
                Ok(Command::Flush) | Ok(Command::Online(true)) => self.push_pass(),
                Ok(Command::Online(false)) => {}
                // Periodic tick: the only retry path for failed pushes.
                Err(RecvTimeoutError::Timeout) => self.push_pass(),
            }
        }
    }

    fn handle_push(&self, local_id: LocalId) {
        self.queued.lock().remove(&local_id);
        if !self.connectivity.is_online() {
            // Suppressed while offline; the online edge or a later tick
            // recovers the record via list_dirty.
            return;
        }
        if let Some(record) = self.store.get(local_id) {
            if record.dirty && !record.deleted_locally {
                self.push_record(record);
            }
        }
    }

    /// Pushes up to one batch of dirty records, oldest sync time first,
    /// serialized to bound remote-side load.
    fn push_pass(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        self.stats.write().passes += 1;

        let batch = self.store.list_dirty();
        for record in batch.into_iter().take(self.config.push_batch_size as usize) {
            self.queued.lock().remove(&record.local_id);
            self.push_record(record);
        }
    }

    /// Pushes one captured snapshot. Never returns an error: failures
    /// are logged, counted, surfaced on the event feed, and left for
    /// the periodic pass.
    fn push_record(&self, record: Record) {
        let local_id = record.local_id;
        let snapshot_revision = record.revision;
        let request = PushRequest::for_record(&record);

        match self.transport.push(&request) {
            Ok(response) if response.success => match response.remote_id {
                Some(remote_id) => {
                    match self.store.apply_push_result(
                        local_id,
                        remote_id,
                        snapshot_revision,
                        Timestamp::now(),
                    ) {
                        Ok(_) => {
                            self.stats.write().pushes_succeeded += 1;
                            self.feed.emit(SyncEvent::Pushed {
                                local_id,
                                remote_id,
                            });
                        }
                        Err(e) => self.push_failed(local_id, e.to_string()),
                    }
                }
                None => {
                    self.push_failed(local_id, "push accepted without a remote id".into());
                }
            },
            Ok(response) => {
                let reason = response
                    .error
                    .unwrap_or_else(|| "rejected by remote store".into());
                self.push_failed(local_id, reason);
            }
            Err(e) => self.push_failed(local_id, e.to_string()),
        }
    }

    fn push_failed(&self, local_id: LocalId, reason: String) {
        tracing::warn!(record = %local_id, %reason, "push failed, record stays dirty");
        {
            let mut stats = self.stats.write();
            stats.pushes_failed += 1;
            stats.last_error = Some(reason.clone());
        }
        self.feed.emit(SyncEvent::PushFailed { local_id, reason });
    }
}
