//! Error types for curio core.

use crate::id::{CuratorId, LocalId, RemoteId, SharedId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store operations.
///
/// These are usage errors surfaced synchronously to the caller; they are
/// never swallowed by the sync layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No record with the given local ID exists.
    #[error("record not found: {local_id}")]
    RecordNotFound {
        /// The local ID that was not found.
        local_id: LocalId,
    },

    /// The record has been deleted locally and may not be edited.
    #[error("record {local_id} is tombstoned")]
    RecordTombstoned {
        /// The tombstoned record.
        local_id: LocalId,
    },

    /// A direct edit was attempted by a curator who does not own the fork.
    ///
    /// Cross-owner edits must go through
    /// [`resolve_for_edit`](crate::resolve_for_edit).
    #[error("record {local_id} is not owned by curator {curator}")]
    NotOwner {
        /// The record being edited.
        local_id: LocalId,
        /// The curator who requested the edit.
        curator: CuratorId,
    },

    /// A fork for this (shared ID, owner) pair already exists.
    #[error("curator {owner} already has a fork of {shared_id}")]
    DuplicateFork {
        /// The shared entity identity.
        shared_id: SharedId,
        /// The owning curator.
        owner: CuratorId,
    },

    /// A record with this remote ID already exists in the store.
    #[error("remote id {remote_id} is already present")]
    DuplicateRemoteId {
        /// The duplicated remote ID.
        remote_id: RemoteId,
    },

    /// An attempt was made to change a remote ID that is already set.
    #[error("record {local_id} already has remote id {existing}, refusing {attempted}")]
    RemoteIdReassigned {
        /// The record in question.
        local_id: LocalId,
        /// The remote ID already assigned.
        existing: RemoteId,
        /// The remote ID that was refused.
        attempted: RemoteId,
    },

    /// A remote overwrite was refused because the record has unsynced
    /// local edits.
    #[error("record {local_id} has pending local changes")]
    PendingLocalChanges {
        /// The record in question.
        local_id: LocalId,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::RecordNotFound {
            local_id: LocalId::from_raw(5),
        };
        assert_eq!(err.to_string(), "record not found: 5");

        let err = CoreError::PendingLocalChanges {
            local_id: LocalId::from_raw(9),
        };
        assert!(err.to_string().contains("pending local changes"));
    }
}
