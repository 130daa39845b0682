//! Copy-on-write resolution for cross-curator edits.
//!
//! Editing another curator's record must never mutate their fork.
//! Instead the first cross-owner edit derives a personal fork (same
//! shared ID, same origin, cloned payload) and every later edit by the
//! same curator reuses it.

use crate::error::{CoreError, CoreResult};
use crate::id::{CuratorId, LocalId};
use crate::record::Record;
use crate::store::RecordStore;

/// The record a cross-owner edit request resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum ForkOutcome {
    /// The caller may edit this record directly: it is either their own
    /// record or a personal fork created earlier.
    Existing(Record),
    /// A fresh personal fork was just created for the caller.
    ///
    /// Observable so the UI can label it "derived from the origin
    /// curator's entry".
    Created(Record),
}

impl ForkOutcome {
    /// Returns the record to edit, whichever way it was obtained.
    #[must_use]
    pub fn record(&self) -> &Record {
        match self {
            ForkOutcome::Existing(r) | ForkOutcome::Created(r) => r,
        }
    }

    /// Returns true if a new fork was created by this resolution.
    #[must_use]
    pub fn is_new_fork(&self) -> bool {
        matches!(self, ForkOutcome::Created(_))
    }
}

/// Resolves which record `curator` should actually edit.
///
/// - Own record: returned unchanged.
/// - Someone else's record, fork already exists: that fork is returned.
/// - Someone else's record, no fork yet: a new fork is created and
///   returned.
///
/// Resolving against a tombstoned record is a usage error; no existing
/// record is ever mutated here.
pub fn resolve_for_edit(
    store: &RecordStore,
    local_id: LocalId,
    curator: CuratorId,
) -> CoreResult<ForkOutcome> {
    let record = store
        .get(local_id)
        .ok_or(CoreError::RecordNotFound { local_id })?;
    if record.deleted_locally {
        return Err(CoreError::RecordTombstoned { local_id });
    }

    if record.owner_id == curator {
        return Ok(ForkOutcome::Existing(record));
    }

    if let Some(fork) = store.find_by_owner_and_shared(curator, record.shared_id) {
        if fork.deleted_locally {
            return Err(CoreError::RecordTombstoned {
                local_id: fork.local_id,
            });
        }
        return Ok(ForkOutcome::Existing(fork));
    }

    let fork = store.create_fork(local_id, curator)?;
    Ok(ForkOutcome::Created(fork))
}
