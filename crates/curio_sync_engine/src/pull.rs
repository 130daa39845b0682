//! Pull reconciliation.
//!
//! Merges a batch of remote records into the record store exactly once
//! per batch, never losing local edits and never resurrecting local
//! deletions. Failures on one record do not abort the rest of the
//! batch, and re-applying the same batch is idempotent.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::transport::{Connectivity, RemoteTransport};
use curio_core::{CoreError, Record, RecordStore, RemoteSeed, Timestamp};
use curio_sync_protocol::{PullRequest, RemoteRecord};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-batch reconciliation tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Records created locally (first sighting).
    pub created: usize,
    /// Records whose payload was overwritten from the remote copy.
    pub updated: usize,
    /// Records skipped because of pending local changes.
    pub skipped_dirty: usize,
    /// Records skipped because they are tombstoned locally.
    pub skipped_deleted: usize,
    /// Records that failed to apply (batch continued).
    pub failed: usize,
}

impl PullReport {
    /// Folds another page's tallies into this one.
    pub fn merge(&mut self, other: PullReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped_dirty += other.skipped_dirty;
        self.skipped_deleted += other.skipped_deleted;
        self.failed += other.failed;
    }
}

/// Outcome of a [`Reconciler::pull_once`] attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The pull ran to completion.
    Completed(PullReport),
    /// Another pull was already in flight; this attempt was coalesced.
    /// It is simply dropped: a later periodic or manual trigger covers
    /// the same ground.
    AlreadyRunning,
    /// Pulls are suppressed while offline.
    Offline,
}

/// Merges incoming remote batches into the record store.
///
/// Stateless with respect to business data: everything goes through the
/// store's API, which enforces the overwrite policy atomically per
/// record.
pub struct Reconciler {
    store: Arc<RecordStore>,
    transport: Arc<dyn RemoteTransport>,
    connectivity: Arc<Connectivity>,
    config: SyncConfig,
    // Non-reentrant guard: at most one pull in flight.
    in_flight: AtomicBool,
    pull_cursor: Mutex<Option<Timestamp>>,
}

impl Reconciler {
    /// Creates a reconciler over the given store and transport.
    #[must_use]
    pub fn new(
        store: Arc<RecordStore>,
        transport: Arc<dyn RemoteTransport>,
        config: SyncConfig,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
            config,
            in_flight: AtomicBool::new(false),
            pull_cursor: Mutex::new(None),
        }
    }

    /// Fetches remote pages through the transport and reconciles them.
    ///
    /// A pull attempted while one is already running is coalesced, and
    /// pulls are suppressed while offline.
    pub fn pull_once(&self, now: Timestamp) -> SyncResult<PullOutcome> {
        if !self.connectivity.is_online() {
            return Ok(PullOutcome::Offline);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(PullOutcome::AlreadyRunning);
        }

        let result = self.pull_pages(now);
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(PullOutcome::Completed)
    }

    fn pull_pages(&self, now: Timestamp) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let mut since = *self.pull_cursor.lock();
        let mut newest_seen = since;

        loop {
            let request = PullRequest::new(since, self.config.pull_batch_size);
            let response = self.transport.pull(&request)?;

            report.merge(self.reconcile(&response.records, now));
            newest_seen = newest_seen.max(response.records.iter().map(|r| r.updated_at).max());

            // An empty page that still claims more would never advance
            // the cursor; treat it as final.
            if !response.has_more || response.records.is_empty() {
                break;
            }
            // Advance the page cursor past the newest record seen.
            since = newest_seen;
        }

        // The persistent cursor lives in the remote's clock domain:
        // `since` filters on `updated_at`, so it must track the newest
        // remote timestamp seen, never the local clock. It also holds
        // still when any record failed to apply, so those rows are
        // requested again on the next pull.
        if report.failed == 0 {
            *self.pull_cursor.lock() = newest_seen;
        }
        tracing::info!(
            created = report.created,
            updated = report.updated,
            skipped_dirty = report.skipped_dirty,
            skipped_deleted = report.skipped_deleted,
            failed = report.failed,
            "pull completed"
        );
        Ok(report)
    }

    /// Merges one batch of remote records into the store.
    ///
    /// Per incoming record: match by remote ID, then by normalized name;
    /// skip tombstones; skip records with pending local changes;
    /// overwrite confirmed-remote records; create the rest.
    pub fn reconcile(&self, batch: &[RemoteRecord], now: Timestamp) -> PullReport {
        let mut report = PullReport::default();
        for remote in batch {
            self.apply_one(remote, now, &mut report);
        }
        report
    }

    fn apply_one(&self, remote: &RemoteRecord, now: Timestamp, report: &mut PullReport) {
        match self.find_match(remote) {
            Some(m) if m.deleted_locally => {
                tracing::info!(
                    remote_id = %remote.remote_id,
                    record = %m.local_id,
                    reason = "deleted locally",
                    "pull skipped"
                );
                report.skipped_deleted += 1;
            }
            Some(m) if m.dirty || m.sync_state.is_local() => {
                tracing::info!(
                    remote_id = %remote.remote_id,
                    record = %m.local_id,
                    reason = "has pending local changes",
                    "pull skipped"
                );
                report.skipped_dirty += 1;
            }
            Some(m) => {
                match self.store.apply_remote_overwrite(
                    m.local_id,
                    remote.remote_id,
                    remote.payload.clone(),
                    now,
                ) {
                    Ok(_) => report.updated += 1,
                    // The store re-checks under its own lock; an edit
                    // that raced the lookup is still a skip, not a loss.
                    Err(CoreError::PendingLocalChanges { .. }) => report.skipped_dirty += 1,
                    Err(CoreError::RecordTombstoned { .. }) => report.skipped_deleted += 1,
                    Err(e) => {
                        tracing::warn!(remote_id = %remote.remote_id, error = %e, "pull overwrite failed");
                        report.failed += 1;
                    }
                }
            }
            None => {
                let seed = RemoteSeed {
                    remote_id: remote.remote_id,
                    shared_id: remote.shared_id,
                    origin_id: remote.origin_id,
                    owner_id: remote.owner_id,
                    payload: remote.payload.clone(),
                };
                match self.store.create_from_remote(seed, now) {
                    Ok(_) => report.created += 1,
                    Err(e) => {
                        tracing::warn!(remote_id = %remote.remote_id, error = %e, "pull create failed");
                        report.failed += 1;
                    }
                }
            }
        }
    }

    /// Finds the local record an incoming remote record corresponds to.
    ///
    /// The stable remote ID wins; the normalized-name fallback covers
    /// records created independently on both sides before ever syncing.
    /// The name heuristic can mismatch two distinct real-world entities
    /// that happen to share a normalized name; same-owner candidates are
    /// preferred to narrow that window.
    fn find_match(&self, remote: &RemoteRecord) -> Option<Record> {
        if let Some(found) = self.store.find_by_remote_id(remote.remote_id) {
            return Some(found);
        }
        let candidates = self.store.find_by_normalized_name(&remote.payload.name);
        candidates
            .iter()
            .find(|r| r.owner_id == remote.owner_id)
            .cloned()
            .or_else(|| candidates.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use curio_core::{CuratorId, Payload, RemoteId, SyncState};
    use curio_sync_protocol::PullResponse;

    fn curator(byte: u8) -> CuratorId {
        CuratorId::from_bytes([byte; 16])
    }

    fn reconciler(store: &Arc<RecordStore>) -> (Arc<MockTransport>, Reconciler) {
        let transport = Arc::new(MockTransport::new());
        let r = Reconciler::new(
            Arc::clone(store),
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            SyncConfig::new(),
            Arc::new(Connectivity::new(true)),
        );
        (transport, r)
    }

    fn remote(id: u64, owner: CuratorId, name: &str) -> RemoteRecord {
        RemoteRecord::new(
            RemoteId::from_raw(id),
            owner,
            Payload::named(name),
            Timestamp::from_millis(id),
        )
    }

    #[test]
    fn first_sighting_creates_record() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let report = engine.reconcile(&[remote(1, curator(9), "Museum")], Timestamp::from_millis(10));
        assert_eq!(report.created, 1);

        let created = store.find_by_remote_id(RemoteId::from_raw(1)).unwrap();
        assert_eq!(created.sync_state, SyncState::Remote);
        assert_eq!(created.owner_id, curator(9));
        assert_eq!(created.origin_id, curator(9)); // synthesized
        assert_eq!(created.last_synced_at, Some(Timestamp::from_millis(10)));
    }

    #[test]
    fn provenance_is_preserved_when_present() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let shared = curio_core::SharedId::new();
        let batch =
            [remote(1, curator(2), "Museum").with_provenance(shared, curator(1))];
        engine.reconcile(&batch, Timestamp::from_millis(1));

        let created = store.find_by_remote_id(RemoteId::from_raw(1)).unwrap();
        assert_eq!(created.shared_id, shared);
        assert_eq!(created.origin_id, curator(1));
    }

    #[test]
    fn dirty_record_is_skipped() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        // Local record, pushed, then edited again: dirty with remote id.
        let record = store.create(curator(1), Payload::named("Cafe X"));
        store
            .apply_push_result(record.local_id, RemoteId::from_raw(7), record.revision, Timestamp::from_millis(1))
            .unwrap();
        store
            .update_payload(record.local_id, curator(1), Payload::named("Cafe X local edit"))
            .unwrap();

        let report =
            engine.reconcile(&[remote(7, curator(1), "Cafe X remote")], Timestamp::from_millis(2));
        assert_eq!(report.skipped_dirty, 1);
        assert_eq!(report.updated, 0);

        // Local payload untouched.
        let unchanged = store.get(record.local_id).unwrap();
        assert_eq!(unchanged.payload.name, "Cafe X local edit");
        assert!(unchanged.dirty);
    }

    #[test]
    fn tombstone_is_never_resurrected() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let record = store.create(curator(1), Payload::named("Cafe X"));
        store
            .apply_push_result(record.local_id, RemoteId::from_raw(7), record.revision, Timestamp::from_millis(1))
            .unwrap();
        store.delete(record.local_id).unwrap();

        let report = engine.reconcile(&[remote(7, curator(1), "Cafe X")], Timestamp::from_millis(2));
        assert_eq!(report.skipped_deleted, 1);

        let still_deleted = store.get(record.local_id).unwrap();
        assert!(still_deleted.deleted_locally);
        assert!(store.list_active().is_empty());
    }

    #[test]
    fn clean_record_is_overwritten() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let record = store.create(curator(1), Payload::named("Cafe X"));
        store
            .apply_push_result(record.local_id, RemoteId::from_raw(7), record.revision, Timestamp::from_millis(1))
            .unwrap();

        let report =
            engine.reconcile(&[remote(7, curator(1), "Cafe X renamed")], Timestamp::from_millis(5));
        assert_eq!(report.updated, 1);

        let updated = store.get(record.local_id).unwrap();
        assert_eq!(updated.payload.name, "Cafe X renamed");
        assert_eq!(updated.local_id, record.local_id); // kept
        assert_eq!(updated.last_synced_at, Some(Timestamp::from_millis(5)));
    }

    #[test]
    fn name_fallback_matches_unsynced_twins() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        // Created independently on both sides, synced here once so the
        // local twin is clean, but under a different remote id.
        let record = store.create(curator(1), Payload::named("  Cafe X "));
        store
            .apply_push_result(record.local_id, RemoteId::from_raw(7), record.revision, Timestamp::from_millis(1))
            .unwrap();

        let report =
            engine.reconcile(&[remote(8, curator(1), "cafe x")], Timestamp::from_millis(2));
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);

        // Matched by name; the original remote id assignment stays.
        let matched = store.get(record.local_id).unwrap();
        assert_eq!(matched.remote_id, Some(RemoteId::from_raw(7)));
    }

    #[test]
    fn batch_continues_past_failures() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let shared = curio_core::SharedId::new();
        let batch = [
            remote(1, curator(1), "one").with_provenance(shared, curator(1)),
            // Same (shared id, owner) fork under a second remote id:
            // refused by the store, but the batch keeps going.
            remote(2, curator(1), "one again").with_provenance(shared, curator(1)),
            remote(3, curator(2), "three"),
        ];
        let report = engine.reconcile(&batch, Timestamp::from_millis(1));

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn repeated_batch_is_idempotent() {
        let store = Arc::new(RecordStore::new());
        let (_, engine) = reconciler(&store);

        let batch = [
            remote(1, curator(1), "one"),
            remote(2, curator(2), "two"),
        ];
        let now = Timestamp::from_millis(9);
        engine.reconcile(&batch, now);
        let snapshot = store.list_active();

        let second = engine.reconcile(&batch, now);
        assert_eq!(second.created, 0);
        assert_eq!(store.list_active(), snapshot);
    }

    #[test]
    fn pull_once_respects_offline_and_guard() {
        let store = Arc::new(RecordStore::new());
        let transport = Arc::new(MockTransport::new());
        let connectivity = Arc::new(Connectivity::new(false));
        let engine = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&transport) as Arc<dyn RemoteTransport>,
            SyncConfig::new(),
            Arc::clone(&connectivity),
        );

        assert_eq!(
            engine.pull_once(Timestamp::from_millis(1)).unwrap(),
            PullOutcome::Offline
        );

        connectivity.set_online(true);
        transport.set_pull_response(PullResponse::new(
            vec![remote(1, curator(1), "one")],
            false,
        ));
        let outcome = engine.pull_once(Timestamp::from_millis(2)).unwrap();
        let PullOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.created, 1);

        // Guard check: a pull started while the flag is held coalesces.
        engine.in_flight.store(true, Ordering::SeqCst);
        assert_eq!(
            engine.pull_once(Timestamp::from_millis(3)).unwrap(),
            PullOutcome::AlreadyRunning
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn batch_strategy() -> impl Strategy<Value = Vec<(u64, u8, String)>> {
            prop::collection::vec(
                (1u64..20, 1u8..4, "[a-c]{1,3}"),
                0..12,
            )
        }

        proptest! {
            // Pulling the same remote batch twice produces no further
            // change on the second application.
            #[test]
            fn reconcile_is_idempotent(entries in batch_strategy()) {
                let store = Arc::new(RecordStore::new());
                let (_, engine) = reconciler(&store);
                let batch: Vec<RemoteRecord> = entries
                    .iter()
                    .map(|(id, owner, name)| remote(*id, curator(*owner), name))
                    .collect();

                let now = Timestamp::from_millis(5);
                engine.reconcile(&batch, now);
                let snapshot = store.list_active();

                let second = engine.reconcile(&batch, now);
                prop_assert_eq!(second.created, 0);
                prop_assert_eq!(store.list_active(), snapshot);
            }
        }
    }
}
