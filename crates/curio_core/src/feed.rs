//! Event feed for observing committed store mutations.
//!
//! The feed lets a UI update sync-status indicators and provenance
//! labels ("derived from …") without reloading the whole store. Events
//! are emitted only after the mutation has been committed.

use crate::id::{CuratorId, LocalId};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// A committed store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// A record was created locally or from a pull.
    Created {
        /// The new record.
        local_id: LocalId,
    },
    /// A record's payload was edited by its owner.
    Updated {
        /// The edited record.
        local_id: LocalId,
    },
    /// A record was tombstoned.
    Deleted {
        /// The tombstoned record.
        local_id: LocalId,
    },
    /// A personal fork was created by the copy-on-write resolver.
    Forked {
        /// The new fork.
        local_id: LocalId,
        /// The record the fork was derived from.
        source: LocalId,
        /// The curator credited with the first-ever fork.
        origin: CuratorId,
    },
    /// Sync bookkeeping changed (successful push or pull overwrite).
    Synced {
        /// The record whose sync state changed.
        local_id: LocalId,
    },
}

/// A multi-subscriber feed of events.
///
/// Thread-safe; disconnected subscribers are dropped on the next emit.
pub struct Feed<E: Clone> {
    subscribers: RwLock<Vec<Sender<E>>>,
}

impl<E: Clone> Feed<E> {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver that will see all future events. The receiver
    /// should be polled regularly to avoid unbounded memory growth.
    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers, pruning disconnected ones.
    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<E: Clone> Default for Feed<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn emit_and_receive() {
        let feed = Feed::new();
        let rx = feed.subscribe();

        let event = RecordEvent::Created {
            local_id: LocalId::from_raw(1),
        };
        feed.emit(event.clone());

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = Feed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        let event = RecordEvent::Deleted {
            local_id: LocalId::from_raw(2),
        };
        feed.emit(event.clone());

        assert_eq!(rx1.recv().unwrap(), event);
        assert_eq!(rx2.recv().unwrap(), event);
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = Feed::new();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.emit(RecordEvent::Updated {
            local_id: LocalId::from_raw(3),
        });
        assert_eq!(feed.subscriber_count(), 0);
    }
}
