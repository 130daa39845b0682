//! Request/response messages for the push and pull endpoints.

use crate::record::RemoteRecord;
use curio_core::{CuratorId, Payload, Record, RemoteId, SharedId, Timestamp};
use serde::{Deserialize, Serialize};

/// Push of a single curated record to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Remote ID, present when re-pushing an already synced fork.
    pub remote_id: Option<RemoteId>,
    /// Shared entity identity (sent on first sync so the remote store
    /// can link forks).
    pub shared_id: SharedId,
    /// Fork provenance.
    pub origin_id: CuratorId,
    /// The owning curator.
    pub owner_id: CuratorId,
    /// The curated content.
    pub payload: Payload,
}

impl PushRequest {
    /// Builds a push request from a local record snapshot.
    #[must_use]
    pub fn for_record(record: &Record) -> Self {
        Self {
            remote_id: record.remote_id,
            shared_id: record.shared_id,
            origin_id: record.origin_id,
            owner_id: record.owner_id,
            payload: record.payload.clone(),
        }
    }
}

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Whether the record was accepted.
    pub success: bool,
    /// The remote ID assigned (or confirmed) by the remote store.
    pub remote_id: Option<RemoteId>,
    /// Error message if rejected.
    pub error: Option<String>,
}

impl PushResponse {
    /// Creates a successful push response.
    #[must_use]
    pub fn success(remote_id: RemoteId) -> Self {
        Self {
            success: true,
            remote_id: Some(remote_id),
            error: None,
        }
    }

    /// Creates a rejected push response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_id: None,
            error: Some(message.into()),
        }
    }
}

/// Request for a batch of remote records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Only records modified after this time are requested; `None`
    /// requests the full snapshot.
    pub since: Option<Timestamp>,
    /// Maximum number of records to return.
    pub limit: u32,
}

impl PullRequest {
    /// Creates a new pull request.
    #[must_use]
    pub fn new(since: Option<Timestamp>, limit: u32) -> Self {
        Self { since, limit }
    }
}

/// A batch of remote records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// The records in this page.
    pub records: Vec<RemoteRecord>,
    /// Whether more records are available after this page.
    pub has_more: bool,
}

impl PullResponse {
    /// Creates a new pull response.
    #[must_use]
    pub fn new(records: Vec<RemoteRecord>, has_more: bool) -> Self {
        Self { records, has_more }
    }

    /// Creates an empty final page.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            has_more: false,
        }
    }
}
