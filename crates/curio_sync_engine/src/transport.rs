//! Transport layer abstraction over the remote push/pull endpoints.

use crate::error::{SyncError, SyncResult};
use curio_core::RemoteId;
use curio_sync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Network access to the remote store.
///
/// This trait abstracts the wire layer (HTTP, loopback, mock for
/// testing). Calls block until the remote answers or the transport's
/// own bounded timeout elapses; a timeout must surface as a retryable
/// failure, not as a partial application.
pub trait RemoteTransport: Send + Sync {
    /// Pushes one record; returns the assigned remote ID on success.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Pulls a batch of remote records.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;
}

/// Online/offline state shared between the push and pull engines.
///
/// An explicit flag rather than a probe: the application layer decides
/// when the device is considered online and both engines consult the
/// same state.
#[derive(Debug)]
pub struct Connectivity(AtomicBool);

impl Connectivity {
    /// Creates the connectivity state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    /// Returns true if currently online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sets the online state, returning the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        self.0.swap(online, Ordering::SeqCst)
    }
}

/// A mock transport for testing.
///
/// Push and pull responses can be scripted (errors included) and are
/// consumed in order. When the push script is exhausted, pushes succeed
/// and are assigned sequential remote IDs; exhausted pulls fall back to
/// a sticky response, or to an empty final page. Every received request
/// is recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    next_remote_id: AtomicU64,
    push_script: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pull_script: Mutex<VecDeque<SyncResult<PullResponse>>>,
    pull_fallback: Mutex<Option<PullResponse>>,
    pushed: Mutex<Vec<PushRequest>>,
    pulled: Mutex<Vec<PullRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_remote_id: AtomicU64::new(1),
            push_script: Mutex::new(VecDeque::new()),
            pull_script: Mutex::new(VecDeque::new()),
            pull_fallback: Mutex::new(None),
            pushed: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the next push outcome (responses are consumed in order).
    pub fn enqueue_push_result(&self, result: SyncResult<PushResponse>) {
        self.push_script.lock().push_back(result);
    }

    /// Scripts the next pull outcome (responses are consumed in order).
    pub fn enqueue_pull_result(&self, result: SyncResult<PullResponse>) {
        self.pull_script.lock().push_back(result);
    }

    /// Sets the response returned by pulls once the script is exhausted.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_fallback.lock() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if the mock is simulating a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns all push requests received so far.
    #[must_use]
    pub fn pushed_requests(&self) -> Vec<PushRequest> {
        self.pushed.lock().clone()
    }

    /// Returns the number of push requests received.
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.pushed.lock().len()
    }

    /// Returns all pull requests received so far.
    #[must_use]
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pulled.lock().clone()
    }
}

impl RemoteTransport for MockTransport {
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.pushed.lock().push(request.clone());

        if let Some(scripted) = self.push_script.lock().pop_front() {
            return scripted;
        }

        let remote_id = request.remote_id.unwrap_or_else(|| {
            RemoteId::from_raw(self.next_remote_id.fetch_add(1, Ordering::SeqCst))
        });
        Ok(PushResponse::success(remote_id))
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.pulled.lock().push(request.clone());

        if let Some(scripted) = self.pull_script.lock().pop_front() {
            return scripted;
        }
        Ok(self
            .pull_fallback
            .lock()
            .clone()
            .unwrap_or_else(PullResponse::empty))
    }
}
