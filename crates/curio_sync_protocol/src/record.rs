//! The remote store's view of a record.

use curio_core::{CuratorId, Payload, RemoteId, SharedId, Timestamp};
use serde::{Deserialize, Serialize};

/// A record as returned by the remote pull endpoint.
///
/// `shared_id` and `origin_id` are optional: remote rows created before
/// fork provenance was introduced do not carry them, in which case the
/// first local sighting synthesizes a fresh shared ID with
/// `origin = owner`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// The remote store's identifier.
    pub remote_id: RemoteId,
    /// Shared entity identity, if known remotely.
    pub shared_id: Option<SharedId>,
    /// Fork provenance, if known remotely.
    pub origin_id: Option<CuratorId>,
    /// The owning curator.
    pub owner_id: CuratorId,
    /// The curated content.
    pub payload: Payload,
    /// Last modification time on the remote store.
    pub updated_at: Timestamp,
}

impl RemoteRecord {
    /// Creates a remote record without fork provenance.
    #[must_use]
    pub fn new(
        remote_id: RemoteId,
        owner_id: CuratorId,
        payload: Payload,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            remote_id,
            shared_id: None,
            origin_id: None,
            owner_id,
            payload,
            updated_at,
        }
    }

    /// Attaches fork provenance.
    #[must_use]
    pub fn with_provenance(mut self, shared_id: SharedId, origin_id: CuratorId) -> Self {
        self.shared_id = Some(shared_id);
        self.origin_id = Some(origin_id);
        self
    }
}
