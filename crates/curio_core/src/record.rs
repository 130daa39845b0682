//! The curated record and its sync state machine.

use crate::error::{CoreError, CoreResult};
use crate::id::{CuratorId, LocalId, RemoteId, SharedId, Timestamp};
use serde::{Deserialize, Serialize};

/// A geographic point attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// The curated content of a record.
///
/// The payload is opaque to the sync machinery except for `name`, which
/// feeds the normalized-name index used as a reconciliation fallback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Display name of the entity.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Structured tags.
    pub tags: Vec<String>,
    /// Optional geolocation.
    pub location: Option<GeoPoint>,
    /// References to attachments (opaque to the core).
    pub attachments: Vec<String>,
}

impl Payload {
    /// Creates a payload with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the normalized form of the name: trimmed and lowercased.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalizes a name for index lookup: trim plus Unicode lowercase.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Per-record sync state.
///
/// `Local` covers both "never synced" and "synced then modified again";
/// `Remote` means the payload is confirmed identical to the remote copy
/// as of `last_synced_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Not known to be identical to the remote copy.
    Local,
    /// Confirmed identical to the remote copy.
    Remote,
}

impl SyncState {
    /// Returns true for the `Local` state.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, SyncState::Local)
    }
}

/// A curated entity instance with sync metadata and a fork identity.
///
/// All state transitions live here; this is the single source of truth
/// for "is it safe to overwrite this record from the network" and must
/// be consulted before every pull-driven write.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Process-local identity, never reused.
    pub local_id: LocalId,
    /// Assigned by the remote store on first successful push; write-once.
    pub remote_id: Option<RemoteId>,
    /// Identity shared by every fork of the same conceptual entity.
    pub shared_id: SharedId,
    /// The curator who owns this fork and may edit it directly.
    pub owner_id: CuratorId,
    /// The curator who authored the first-ever fork of `shared_id`.
    pub origin_id: CuratorId,
    /// The curated content.
    pub payload: Payload,
    /// Sync state (see [`SyncState`]).
    pub sync_state: SyncState,
    /// Redundant with `sync_state`, kept for fast filtering.
    pub dirty: bool,
    /// Time of the last successful push or pull touching this record.
    pub last_synced_at: Option<Timestamp>,
    /// Tombstone flag; blocks edits and pull resurrection.
    pub deleted_locally: bool,
    /// Payload revision, bumped on every local edit.
    ///
    /// Pushes capture the revision with the payload snapshot; a push
    /// acknowledgement for a stale revision must not clear `dirty`.
    pub revision: u64,
}

impl Record {
    /// Creates a locally authored record (no remote counterpart yet).
    #[must_use]
    pub fn new_local(
        local_id: LocalId,
        owner_id: CuratorId,
        payload: Payload,
    ) -> Self {
        Self {
            local_id,
            remote_id: None,
            shared_id: SharedId::new(),
            owner_id,
            origin_id: owner_id,
            payload,
            sync_state: SyncState::Local,
            dirty: true,
            last_synced_at: None,
            deleted_locally: false,
            revision: 1,
        }
    }

    /// Creates a record from a remote copy (e.g. first sighting in a pull).
    #[must_use]
    pub fn new_from_remote(
        local_id: LocalId,
        remote_id: RemoteId,
        shared_id: SharedId,
        owner_id: CuratorId,
        origin_id: CuratorId,
        payload: Payload,
        now: Timestamp,
    ) -> Self {
        Self {
            local_id,
            remote_id: Some(remote_id),
            shared_id,
            owner_id,
            origin_id,
            payload,
            sync_state: SyncState::Remote,
            dirty: false,
            last_synced_at: Some(now),
            deleted_locally: false,
            revision: 1,
        }
    }

    /// Returns true if the record is visible (not tombstoned).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.deleted_locally
    }

    /// Returns true if a pull may replace this record's payload.
    ///
    /// Tombstoned records are never resurrected and local edits are
    /// never clobbered.
    #[must_use]
    pub fn accepts_remote_overwrite(&self) -> bool {
        !self.deleted_locally && !self.dirty && self.sync_state == SyncState::Remote
    }

    /// Transition: payload edited by the owner.
    ///
    /// The record goes `Local`/dirty; an already assigned remote ID is
    /// preserved. The revision is bumped so in-flight push snapshots
    /// become stale.
    pub fn mark_edited(&mut self, payload: Payload) {
        self.payload = payload;
        self.sync_state = SyncState::Local;
        self.dirty = true;
        self.revision += 1;
    }

    /// Transition: a push of `snapshot_revision` was accepted by the
    /// remote store.
    ///
    /// Sets the remote ID if it was absent (refuses to change an
    /// existing one) and records the sync time. The record only becomes
    /// `Remote`/clean if no further edit happened since the pushed
    /// snapshot was taken.
    pub fn mark_pushed(
        &mut self,
        remote_id: RemoteId,
        snapshot_revision: u64,
        now: Timestamp,
    ) -> CoreResult<()> {
        match self.remote_id {
            None => self.remote_id = Some(remote_id),
            Some(existing) if existing == remote_id => {}
            Some(existing) => {
                return Err(CoreError::RemoteIdReassigned {
                    local_id: self.local_id,
                    existing,
                    attempted: remote_id,
                });
            }
        }

        self.last_synced_at = Some(now);
        if self.revision == snapshot_revision {
            self.sync_state = SyncState::Remote;
            self.dirty = false;
        }
        Ok(())
    }

    /// Transition: payload replaced from a pulled remote copy.
    ///
    /// Only legal when [`accepts_remote_overwrite`](Self::accepts_remote_overwrite)
    /// holds; callers get an error otherwise.
    pub fn apply_remote(
        &mut self,
        remote_id: RemoteId,
        payload: Payload,
        now: Timestamp,
    ) -> CoreResult<()> {
        if self.deleted_locally {
            return Err(CoreError::RecordTombstoned {
                local_id: self.local_id,
            });
        }
        if self.dirty || self.sync_state == SyncState::Local {
            return Err(CoreError::PendingLocalChanges {
                local_id: self.local_id,
            });
        }

        // A name-matched record may already carry a different remote id;
        // the existing assignment wins (write-once).
        if self.remote_id.is_none() {
            self.remote_id = Some(remote_id);
        }
        // The revision is not bumped: it tracks local edits only, and
        // leaving it untouched keeps re-applied pull batches idempotent.
        self.payload = payload;
        self.sync_state = SyncState::Remote;
        self.dirty = false;
        self.last_synced_at = Some(now);
        Ok(())
    }
}
