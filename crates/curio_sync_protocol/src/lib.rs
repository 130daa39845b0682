//! # curio sync protocol
//!
//! Data shapes exchanged with the remote store, treated as an opaque
//! push/pull endpoint:
//!
//! - Push: one curated record in, an assigned remote ID (or error) out
//! - Pull: a batch of remote records, each carrying its remote ID,
//!   ownership, optional fork provenance, and a last-modified timestamp
//!
//! Transport encoding (HTTP, auth, serialization format) is owned by
//! the transport implementation; these types only derive `serde`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod record;

pub use messages::{PullRequest, PullResponse, PushRequest, PushResponse};
pub use record::RemoteRecord;
