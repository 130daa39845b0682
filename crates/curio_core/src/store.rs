//! The record store: CRUD plus the query surface used by the sync
//! engines.
//!
//! All mutating operations update sync metadata atomically with the
//! payload change: there is no window where payload and sync state
//! disagree. The store is the only shared mutable resource: one
//! foreground actor (caller edits/reads) and one background actor (the
//! sync worker) share it through interior locking.

use crate::error::{CoreError, CoreResult};
use crate::feed::{Feed, RecordEvent};
use crate::id::{CuratorId, LocalId, RemoteId, SharedId, Timestamp};
use crate::record::{normalize_name, Payload, Record, SyncState};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::mpsc::Receiver;

/// A remote copy to be inserted by the reconciliation engine.
///
/// `shared_id`/`origin_id` are optional because legacy remote rows may
/// predate fork provenance; the store synthesizes them on first sighting.
#[derive(Debug, Clone)]
pub struct RemoteSeed {
    /// The remote store's identifier for this record.
    pub remote_id: RemoteId,
    /// Shared entity identity, if the remote row carries one.
    pub shared_id: Option<SharedId>,
    /// Fork provenance, if the remote row carries one.
    pub origin_id: Option<CuratorId>,
    /// The owning curator.
    pub owner_id: CuratorId,
    /// The curated content.
    pub payload: Payload,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<LocalId, Record>,
    next_local_id: u64,
    by_remote: HashMap<RemoteId, LocalId>,
    by_shared: HashMap<SharedId, Vec<LocalId>>,
    by_name: HashMap<String, Vec<LocalId>>,
}

impl StoreInner {
    fn allocate_id(&mut self) -> LocalId {
        self.next_local_id += 1;
        LocalId::from_raw(self.next_local_id)
    }

    fn index(&mut self, record: &Record) {
        if let Some(remote_id) = record.remote_id {
            self.by_remote.insert(remote_id, record.local_id);
        }
        self.by_shared
            .entry(record.shared_id)
            .or_default()
            .push(record.local_id);
        self.by_name
            .entry(record.payload.normalized_name())
            .or_default()
            .push(record.local_id);
    }

    fn reindex_name(&mut self, local_id: LocalId, old: &str, new: &str) {
        if old == new {
            return;
        }
        if let Some(ids) = self.by_name.get_mut(old) {
            ids.retain(|id| *id != local_id);
            if ids.is_empty() {
                self.by_name.remove(old);
            }
        }
        self.by_name.entry(new.to_string()).or_default().push(local_id);
    }

    fn fork_exists(&self, shared_id: SharedId, owner: CuratorId) -> bool {
        self.by_shared
            .get(&shared_id)
            .is_some_and(|ids| {
                ids.iter().any(|id| {
                    self.records
                        .get(id)
                        .is_some_and(|r| r.owner_id == owner)
                })
            })
    }
}

/// Sync-aware store of curated records.
///
/// Reads return snapshots (clones); writes go through methods that keep
/// payload, sync metadata and indexes consistent under one lock.
pub struct RecordStore {
    inner: RwLock<StoreInner>,
    feed: Feed<RecordEvent>,
}

impl RecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            feed: Feed::new(),
        }
    }

    /// Subscribes to committed store mutations.
    pub fn subscribe(&self) -> Receiver<RecordEvent> {
        self.feed.subscribe()
    }

    // ---- mutations ------------------------------------------------------

    /// Creates a record authored by `owner`.
    ///
    /// The record starts `Local`/dirty with a fresh shared ID and
    /// `origin = owner`.
    pub fn create(&self, owner: CuratorId, payload: Payload) -> Record {
        let record = {
            let mut inner = self.inner.write();
            let local_id = inner.allocate_id();
            let record = Record::new_local(local_id, owner, payload);
            inner.index(&record);
            inner.records.insert(local_id, record.clone());
            record
        };
        self.feed.emit(RecordEvent::Created {
            local_id: record.local_id,
        });
        record
    }

    /// Creates a record from a remote copy (first local sighting).
    ///
    /// The record starts `Remote`/clean with `last_synced_at = now`.
    /// Missing provenance is synthesized: fresh shared ID,
    /// `origin = owner`.
    pub fn create_from_remote(&self, seed: RemoteSeed, now: Timestamp) -> CoreResult<Record> {
        let record = {
            let mut inner = self.inner.write();
            if inner.by_remote.contains_key(&seed.remote_id) {
                return Err(CoreError::DuplicateRemoteId {
                    remote_id: seed.remote_id,
                });
            }

            let shared_id = seed.shared_id.unwrap_or_default();
            let origin_id = seed.origin_id.unwrap_or(seed.owner_id);
            if inner.fork_exists(shared_id, seed.owner_id) {
                return Err(CoreError::DuplicateFork {
                    shared_id,
                    owner: seed.owner_id,
                });
            }

            let local_id = inner.allocate_id();
            let record = Record::new_from_remote(
                local_id,
                seed.remote_id,
                shared_id,
                seed.owner_id,
                origin_id,
                seed.payload,
                now,
            );
            inner.index(&record);
            inner.records.insert(local_id, record.clone());
            record
        };
        self.feed.emit(RecordEvent::Created {
            local_id: record.local_id,
        });
        Ok(record)
    }

    /// Creates `new_owner`'s personal fork of an existing record.
    ///
    /// Shared ID, origin and payload are copied from the source; the
    /// fork gets a fresh local ID, no remote ID, and starts
    /// `Local`/dirty. The source record is not touched.
    pub fn create_fork(&self, source_id: LocalId, new_owner: CuratorId) -> CoreResult<Record> {
        let (record, source_local_id, origin) = {
            let mut inner = self.inner.write();
            let source = inner
                .records
                .get(&source_id)
                .ok_or(CoreError::RecordNotFound { local_id: source_id })?;
            if source.deleted_locally {
                return Err(CoreError::RecordTombstoned { local_id: source_id });
            }
            if inner.fork_exists(source.shared_id, new_owner) {
                return Err(CoreError::DuplicateFork {
                    shared_id: source.shared_id,
                    owner: new_owner,
                });
            }

            let shared_id = source.shared_id;
            let origin_id = source.origin_id;
            let payload = source.payload.clone();

            let local_id = inner.allocate_id();
            let mut record = Record::new_local(local_id, new_owner, payload);
            record.shared_id = shared_id;
            record.origin_id = origin_id;
            inner.index(&record);
            inner.records.insert(local_id, record.clone());
            (record, source_id, origin_id)
        };

        tracing::debug!(
            fork = %record.local_id,
            source = %source_local_id,
            origin = %origin,
            "created copy-on-write fork"
        );
        self.feed.emit(RecordEvent::Forked {
            local_id: record.local_id,
            source: source_local_id,
            origin,
        });
        Ok(record)
    }

    /// Edits a record's payload on behalf of `curator`.
    ///
    /// Only the owner may edit directly; cross-owner callers must go
    /// through [`resolve_for_edit`](crate::resolve_for_edit). The record
    /// goes `Local`/dirty synchronously, before this method returns.
    pub fn update_payload(
        &self,
        local_id: LocalId,
        curator: CuratorId,
        payload: Payload,
    ) -> CoreResult<Record> {
        let record = {
            let mut inner = self.inner.write();
            let record = inner
                .records
                .get_mut(&local_id)
                .ok_or(CoreError::RecordNotFound { local_id })?;
            if record.deleted_locally {
                return Err(CoreError::RecordTombstoned { local_id });
            }
            if record.owner_id != curator {
                return Err(CoreError::NotOwner { local_id, curator });
            }

            let old_name = record.payload.normalized_name();
            let new_name = payload.normalized_name();
            record.mark_edited(payload);
            let record = record.clone();
            inner.reindex_name(local_id, &old_name, &new_name);
            record
        };
        self.feed.emit(RecordEvent::Updated { local_id });
        Ok(record)
    }

    /// Tombstones a record.
    ///
    /// The record is hidden from active listings but retained so a
    /// stale remote pull can never resurrect it.
    pub fn delete(&self, local_id: LocalId) -> CoreResult<()> {
        {
            let mut inner = self.inner.write();
            let record = inner
                .records
                .get_mut(&local_id)
                .ok_or(CoreError::RecordNotFound { local_id })?;
            if record.deleted_locally {
                return Err(CoreError::RecordTombstoned { local_id });
            }
            record.deleted_locally = true;
        }
        tracing::debug!(record = %local_id, "record tombstoned");
        self.feed.emit(RecordEvent::Deleted { local_id });
        Ok(())
    }

    /// Records the outcome of a successful push.
    ///
    /// Assigns the remote ID if absent and clears `dirty` unless the
    /// payload was edited again after the pushed snapshot was taken.
    pub fn apply_push_result(
        &self,
        local_id: LocalId,
        remote_id: RemoteId,
        snapshot_revision: u64,
        now: Timestamp,
    ) -> CoreResult<Record> {
        let record = {
            let mut inner = self.inner.write();
            let record = inner
                .records
                .get_mut(&local_id)
                .ok_or(CoreError::RecordNotFound { local_id })?;
            record.mark_pushed(remote_id, snapshot_revision, now)?;
            let record = record.clone();
            inner.by_remote.insert(remote_id, local_id);
            record
        };
        self.feed.emit(RecordEvent::Synced { local_id });
        Ok(record)
    }

    /// Replaces a record's payload from a pulled remote copy.
    ///
    /// Refuses tombstoned records and records with pending local
    /// changes; the check and the write happen under one lock so the
    /// skip policy cannot race a concurrent edit.
    pub fn apply_remote_overwrite(
        &self,
        local_id: LocalId,
        remote_id: RemoteId,
        payload: Payload,
        now: Timestamp,
    ) -> CoreResult<Record> {
        let record = {
            let mut inner = self.inner.write();
            let record = inner
                .records
                .get_mut(&local_id)
                .ok_or(CoreError::RecordNotFound { local_id })?;

            let old_name = record.payload.normalized_name();
            let new_name = payload.normalized_name();
            record.apply_remote(remote_id, payload, now)?;
            let assigned = record.remote_id;
            let record = record.clone();

            inner.reindex_name(local_id, &old_name, &new_name);
            if let Some(assigned) = assigned {
                inner.by_remote.insert(assigned, local_id);
            }
            record
        };
        self.feed.emit(RecordEvent::Synced { local_id });
        Ok(record)
    }

    // ---- queries --------------------------------------------------------

    /// Returns a record by local ID (tombstoned records included).
    #[must_use]
    pub fn get(&self, local_id: LocalId) -> Option<Record> {
        self.inner.read().records.get(&local_id).cloned()
    }

    /// Returns all forks of a shared entity.
    #[must_use]
    pub fn find_by_shared_id(&self, shared_id: SharedId) -> Vec<Record> {
        let inner = self.inner.read();
        inner
            .by_shared
            .get(&shared_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns `owner`'s fork of a shared entity, if one exists.
    #[must_use]
    pub fn find_by_owner_and_shared(
        &self,
        owner: CuratorId,
        shared_id: SharedId,
    ) -> Option<Record> {
        self.find_by_shared_id(shared_id)
            .into_iter()
            .find(|r| r.owner_id == owner)
    }

    /// Returns the record with the given remote ID, if present.
    #[must_use]
    pub fn find_by_remote_id(&self, remote_id: RemoteId) -> Option<Record> {
        let inner = self.inner.read();
        inner
            .by_remote
            .get(&remote_id)
            .and_then(|id| inner.records.get(id).cloned())
    }

    /// Returns records whose normalized name matches `name`.
    ///
    /// Tombstoned records are included: the reconciliation engine needs
    /// to find them to honor the tombstone.
    #[must_use]
    pub fn find_by_normalized_name(&self, name: &str) -> Vec<Record> {
        let normalized = normalize_name(name);
        let inner = self.inner.read();
        inner
            .by_name
            .get(&normalized)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns all dirty (unsynced) records in push order: ascending
    /// `last_synced_at`, never-synced records first.
    ///
    /// Tombstoned records are excluded; deletions are not pushed.
    #[must_use]
    pub fn list_dirty(&self) -> Vec<Record> {
        let inner = self.inner.read();
        let mut dirty: Vec<Record> = inner
            .records
            .values()
            .filter(|r| r.dirty && !r.deleted_locally)
            .cloned()
            .collect();
        dirty.sort_by_key(|r| (r.last_synced_at, r.local_id));
        dirty
    }

    /// Returns all records visible to the UI (tombstones excluded).
    #[must_use]
    pub fn list_active(&self) -> Vec<Record> {
        let inner = self.inner.read();
        let mut active: Vec<Record> = inner
            .records
            .values()
            .filter(|r| r.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|r| r.local_id);
        active
    }

    /// Returns the total number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curator(byte: u8) -> CuratorId {
        CuratorId::from_bytes([byte; 16])
    }

    #[test]
    fn create_assigns_fresh_local_ids() {
        let store = RecordStore::new();
        let a = store.create(curator(1), Payload::named("one"));
        let b = store.create(curator(1), Payload::named("two"));
        assert_ne!(a.local_id, b.local_id);
        assert_ne!(a.shared_id, b.shared_id);
    }

    #[test]
    fn edit_sets_dirty_synchronously() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("cafe"));
        store
            .update_payload(r.local_id, curator(1), Payload::named("cafe two"))
            .unwrap();

        // A caller that immediately re-reads must observe `Local`.
        let reread = store.get(r.local_id).unwrap();
        assert_eq!(reread.sync_state, SyncState::Local);
        assert!(reread.dirty);
        assert_eq!(reread.payload.name, "cafe two");
    }

    #[test]
    fn non_owner_edit_is_rejected() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("cafe"));
        let err = store
            .update_payload(r.local_id, curator(2), Payload::named("hijack"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotOwner { .. }));
    }

    #[test]
    fn tombstoned_edit_is_rejected() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("cafe"));
        store.delete(r.local_id).unwrap();

        let err = store
            .update_payload(r.local_id, curator(1), Payload::named("zombie"))
            .unwrap_err();
        assert!(matches!(err, CoreError::RecordTombstoned { .. }));
    }

    #[test]
    fn delete_hides_from_active_listing() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("cafe"));
        assert_eq!(store.list_active().len(), 1);

        store.delete(r.local_id).unwrap();
        assert!(store.list_active().is_empty());
        // Still present for tombstone checks.
        assert_eq!(store.len(), 1);
        assert!(store.get(r.local_id).unwrap().deleted_locally);
    }

    #[test]
    fn name_index_follows_edits() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("  Cafe X "));
        assert_eq!(store.find_by_normalized_name("cafe x").len(), 1);

        store
            .update_payload(r.local_id, curator(1), Payload::named("Bakery Y"))
            .unwrap();
        assert!(store.find_by_normalized_name("cafe x").is_empty());
        assert_eq!(store.find_by_normalized_name("BAKERY Y").len(), 1);
    }

    #[test]
    fn list_dirty_orders_never_synced_first() {
        let store = RecordStore::new();
        let a = store.create(curator(1), Payload::named("a"));
        let b = store.create(curator(1), Payload::named("b"));

        // Push `a`, then edit it again: it now has a sync time.
        store
            .apply_push_result(a.local_id, RemoteId::from_raw(1), a.revision, Timestamp::from_millis(100))
            .unwrap();
        store
            .update_payload(a.local_id, curator(1), Payload::named("a2"))
            .unwrap();

        let dirty = store.list_dirty();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0].local_id, b.local_id); // never synced
        assert_eq!(dirty[1].local_id, a.local_id);
    }

    #[test]
    fn list_dirty_excludes_tombstones() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("a"));
        store.delete(r.local_id).unwrap();
        assert!(store.list_dirty().is_empty());
    }

    #[test]
    fn push_result_indexes_remote_id() {
        let store = RecordStore::new();
        let r = store.create(curator(1), Payload::named("cafe"));
        store
            .apply_push_result(r.local_id, RemoteId::from_raw(77), r.revision, Timestamp::from_millis(1))
            .unwrap();

        let found = store.find_by_remote_id(RemoteId::from_raw(77)).unwrap();
        assert_eq!(found.local_id, r.local_id);
        assert_eq!(found.sync_state, SyncState::Remote);
    }

    #[test]
    fn create_from_remote_rejects_duplicate_remote_id() {
        let store = RecordStore::new();
        let seed = RemoteSeed {
            remote_id: RemoteId::from_raw(5),
            shared_id: None,
            origin_id: None,
            owner_id: curator(1),
            payload: Payload::named("cafe"),
        };
        store
            .create_from_remote(seed.clone(), Timestamp::from_millis(1))
            .unwrap();
        let err = store
            .create_from_remote(seed, Timestamp::from_millis(2))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRemoteId { .. }));
    }

    #[test]
    fn create_from_remote_synthesizes_provenance() {
        let store = RecordStore::new();
        let r = store
            .create_from_remote(
                RemoteSeed {
                    remote_id: RemoteId::from_raw(5),
                    shared_id: None,
                    origin_id: None,
                    owner_id: curator(3),
                    payload: Payload::named("cafe"),
                },
                Timestamp::from_millis(1),
            )
            .unwrap();
        assert_eq!(r.origin_id, curator(3));
        assert_eq!(r.sync_state, SyncState::Remote);
        assert!(!r.dirty);
        assert_eq!(r.last_synced_at, Some(Timestamp::from_millis(1)));
    }

    #[test]
    fn fork_enforces_one_per_owner() {
        let store = RecordStore::new();
        let source = store.create(curator(1), Payload::named("cafe"));

        store.create_fork(source.local_id, curator(2)).unwrap();
        let err = store.create_fork(source.local_id, curator(2)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateFork { .. }));
    }

    #[test]
    fn fork_copies_identity_not_sync_state() {
        let store = RecordStore::new();
        let source = store.create(curator(1), Payload::named("cafe"));
        store
            .apply_push_result(source.local_id, RemoteId::from_raw(9), source.revision, Timestamp::from_millis(1))
            .unwrap();

        let fork = store.create_fork(source.local_id, curator(2)).unwrap();
        assert_eq!(fork.shared_id, source.shared_id);
        assert_eq!(fork.origin_id, curator(1));
        assert_eq!(fork.owner_id, curator(2));
        assert!(fork.remote_id.is_none());
        assert_eq!(fork.sync_state, SyncState::Local);
        assert_eq!(fork.payload, source.payload);
    }

    #[test]
    fn find_by_owner_and_shared() {
        let store = RecordStore::new();
        let source = store.create(curator(1), Payload::named("cafe"));
        let fork = store.create_fork(source.local_id, curator(2)).unwrap();

        let found = store
            .find_by_owner_and_shared(curator(2), source.shared_id)
            .unwrap();
        assert_eq!(found.local_id, fork.local_id);
        assert!(store
            .find_by_owner_and_shared(curator(3), source.shared_id)
            .is_none());
    }

    #[test]
    fn events_are_emitted_after_commit() {
        let store = RecordStore::new();
        let rx = store.subscribe();

        let r = store.create(curator(1), Payload::named("cafe"));
        assert_eq!(
            rx.recv().unwrap(),
            RecordEvent::Created { local_id: r.local_id }
        );

        store
            .update_payload(r.local_id, curator(1), Payload::named("cafe 2"))
            .unwrap();
        assert_eq!(
            rx.recv().unwrap(),
            RecordEvent::Updated { local_id: r.local_id }
        );

        let fork = store.create_fork(r.local_id, curator(2)).unwrap();
        assert_eq!(
            rx.recv().unwrap(),
            RecordEvent::Forked {
                local_id: fork.local_id,
                source: r.local_id,
                origin: curator(1),
            }
        );
    }
}
