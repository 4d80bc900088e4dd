use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::peer::identifier::PeerIdentifier;
use crate::peer::subscriber::{subscriber_key, PeerSubscriber};

/// A peer's dial/connect state, as observed by its owning transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Unavailable,
    Connecting,
    Available,
}

/// Errors raised by [`Peer`]'s own bookkeeping, distinct from the dispatch
/// error taxonomy: these describe misuse of the peer lifecycle API itself.
#[derive(Debug)]
pub enum PeerError {
    /// `release` was called for a subscriber the peer has no retained
    /// reference to (including a release that exceeds the retain count).
    NoReferenceToSubscriber,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::NoReferenceToSubscriber => {
                f.write_str("peer has no reference to the given subscriber")
            }
        }
    }
}

impl std::error::Error for PeerError {}

struct SubscriberEntry {
    subscriber: Arc<dyn PeerSubscriber>,
    refcount: usize,
}

/// A reference-counted connection endpoint, owned by an [`crate::peer::agent::Agent`].
///
/// `pending_request_count` and `status` are mutated by whatever transport
/// dials this peer; every mutation through [`Peer::set_status`] or the
/// guard returned by [`Peer::start_request`] synchronously notifies every
/// distinct subscriber exactly once, regardless of how many times that
/// subscriber retained this peer.
pub struct Peer {
    id: PeerIdentifier,
    pending_request_count: AtomicUsize,
    status: Mutex<ConnectionStatus>,
    subscribers: Mutex<HashMap<usize, SubscriberEntry>>,
}

impl Peer {
    pub(crate) fn new(id: PeerIdentifier) -> Arc<Self> {
        Arc::new(Peer {
            id,
            pending_request_count: AtomicUsize::new(0),
            status: Mutex::new(ConnectionStatus::Unavailable),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn identifier(&self) -> &PeerIdentifier {
        &self.id
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending_request_count.load(Ordering::SeqCst)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Adds one reference for `sub`. A subscriber already holding this peer
    /// gains an additional reference rather than a duplicate entry, so
    /// notification still fires exactly once per change.
    pub(crate) fn retain(self: &Arc<Self>, sub: Arc<dyn PeerSubscriber>) {
        let key = subscriber_key(&sub);
        let mut subs = self.subscribers.lock();
        subs.entry(key)
            .and_modify(|e| e.refcount += 1)
            .or_insert(SubscriberEntry {
                subscriber: sub,
                refcount: 1,
            });
    }

    /// Drops one reference for `sub`. Returns `true` if this was the last
    /// reference and `sub` is no longer in the subscriber set.
    pub(crate) fn release(&self, sub: &Arc<dyn PeerSubscriber>) -> Result<bool, PeerError> {
        let key = subscriber_key(sub);
        let mut subs = self.subscribers.lock();
        match subs.get_mut(&key) {
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                Ok(false)
            }
            Some(_) => {
                subs.remove(&key);
                Ok(true)
            }
            None => Err(PeerError::NoReferenceToSubscriber),
        }
    }

    fn notify_all(self: &Arc<Self>) {
        let subscribers: Vec<_> = self
            .subscribers
            .lock()
            .values()
            .map(|e| e.subscriber.clone())
            .collect();
        for sub in subscribers {
            sub.notify_status_changed(self.clone());
        }
    }

    pub fn set_status(self: &Arc<Self>, status: ConnectionStatus) {
        *self.status.lock() = status;
        self.notify_all();
    }

    /// Increments the pending-request count and returns a guard that
    /// decrements it exactly once when dropped. Callers defer the guard's
    /// drop to guarantee balance on every return path, including panics.
    pub fn start_request(self: &Arc<Self>) -> PendingRequestGuard {
        self.pending_request_count.fetch_add(1, Ordering::SeqCst);
        self.notify_all();
        PendingRequestGuard { peer: self.clone() }
    }
}

/// Dropping this guard decrements the pending-request count it was created
/// from and notifies subscribers, mirroring the increment in
/// [`Peer::start_request`].
pub struct PendingRequestGuard {
    peer: Arc<Peer>,
}

impl Drop for PendingRequestGuard {
    fn drop(&mut self) {
        self.peer.pending_request_count.fetch_sub(1, Ordering::SeqCst);
        self.peer.notify_all();
    }
}
