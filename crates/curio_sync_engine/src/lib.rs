//! Sync engines for curio: background push and pull reconciliation.
//!
//! Two engines share a [`RecordStore`](curio_core::RecordStore), a
//! [`RemoteTransport`] and a [`Connectivity`] flag:
//!
//! - [`BackgroundSync`] pushes dirty records on a worker thread. Pushes
//!   are fire-and-forget from the caller's perspective: scheduling
//!   returns immediately, failures are logged and retried on a fixed
//!   periodic interval, and nothing ever propagates back to the editor.
//! - [`Reconciler`] merges pulled remote batches into the store,
//!   skipping records with pending local changes and tombstoned
//!   records, creating first sightings, and overwriting confirmed-
//!   remote copies.
//!
//! Both engines consult [`Connectivity`] rather than probing the
//! network; the application layer flips the flag and the push engine
//! reacts to the offline-to-online edge with an immediate catch-up
//! pass.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod pull;
mod push;
mod transport;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use pull::{PullOutcome, PullReport, Reconciler};
pub use push::{BackgroundSync, SyncEvent, SyncStats};
pub use transport::{Connectivity, MockTransport, RemoteTransport};
