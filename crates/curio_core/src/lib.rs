//! # curio core
//!
//! Sync-aware record store for a local-first data-curation tool.
//!
//! This crate provides:
//! - The [`Record`] data model with per-record sync state
//! - The sync state machine (`local` / `remote` transitions)
//! - The [`RecordStore`] with the query surface used by the sync layer
//! - Copy-on-write forking for cross-curator edits
//! - An event feed for reactive UI updates
//!
//! ## Key invariants
//!
//! - A shared ID is set exactly once and is identical for every fork of
//!   the same conceptual entity
//! - Exactly one fork per (shared ID, owner) pair exists in a store
//! - A remote ID is set at most once per fork and never changes
//! - A tombstoned record is never resurrected by a pull
//! - Local edits set `local`/dirty synchronously, before the write
//!   returns to the caller

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod feed;
mod fork;
mod id;
mod record;
mod store;

pub use error::{CoreError, CoreResult};
pub use feed::{Feed, RecordEvent};
pub use fork::{resolve_for_edit, ForkOutcome};
pub use id::{CuratorId, LocalId, RemoteId, SharedId, Timestamp};
pub use record::{normalize_name, GeoPoint, Payload, Record, SyncState};
pub use store::{RecordStore, RemoteSeed};
