use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::context::Context;
use crate::peer::agent::Agent;
use crate::peer::identifier::PeerIdentifier;
use crate::peer::peer::{Peer, PeerError};
use crate::peer::subscriber::PeerSubscriber;
use crate::request::Request;

/// Errors raised by the round-robin chooser's own state machine, distinct
/// from the dispatch error taxonomy: callers that bridge a chooser into a
/// call path are expected to translate these into whatever error kind
/// fits their context.
#[derive(Debug)]
pub enum ChooserError {
    /// The chooser has not been started, or `Stop` was called twice.
    NotStarted,
    /// `Start` was called on an already-started chooser.
    AlreadyStarted,
    PeerAlreadyInList(PeerIdentifier),
    PeerNotInList(PeerIdentifier),
    /// `choose_peer` was about to block and the given context carries no
    /// deadline; an unbounded wait is rejected by design.
    ChooseContextHasNoDeadline,
    /// `choose_peer` was blocked waiting for a peer when `Stop` ran.
    ChooserStopped,
    /// The context passed to a blocked `choose_peer` expired.
    Cancelled,
    RetainFailed(Vec<PeerError>),
    ReleaseFailed(Vec<PeerError>),
}

impl fmt::Display for ChooserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChooserError::NotStarted => f.write_str("peer chooser is not started"),
            ChooserError::AlreadyStarted => f.write_str("peer chooser is already started"),
            ChooserError::PeerAlreadyInList(id) => write!(f, "peer {id} is already in the list"),
            ChooserError::PeerNotInList(id) => write!(f, "peer {id} is not in the list"),
            ChooserError::ChooseContextHasNoDeadline => {
                f.write_str("choose_peer requires a context deadline")
            }
            ChooserError::ChooserStopped => f.write_str("peer chooser was stopped while waiting"),
            ChooserError::Cancelled => f.write_str("context deadline exceeded while choosing a peer"),
            ChooserError::RetainFailed(errs) => {
                write!(f, "failed to retain {} peer(s) on start", errs.len())
            }
            ChooserError::ReleaseFailed(errs) => {
                write!(f, "failed to release {} peer(s) on stop", errs.len())
            }
        }
    }
}

impl std::error::Error for ChooserError {}

struct Ring {
    started: bool,
    order: Vec<PeerIdentifier>,
    index: HashMap<PeerIdentifier, usize>,
    peers: HashMap<PeerIdentifier, Arc<Peer>>,
    cursor: usize,
}

impl Ring {
    fn new() -> Self {
        Ring {
            started: false,
            order: Vec::new(),
            index: HashMap::new(),
            peers: HashMap::new(),
            cursor: 0,
        }
    }

    fn insert(&mut self, id: PeerIdentifier, peer: Arc<Peer>) {
        let idx = self.order.len();
        self.index.insert(id.clone(), idx);
        self.order.push(id.clone());
        self.peers.insert(id, peer);
    }

    fn remove(&mut self, id: &PeerIdentifier) -> Option<Arc<Peer>> {
        let idx = self.index.remove(id)?;
        let last = self.order.len() - 1;
        self.order.swap(idx, last);
        self.order.pop();
        if idx < self.order.len() {
            let moved = self.order[idx].clone();
            self.index.insert(moved, idx);
        }
        if self.cursor >= self.order.len() {
            self.cursor = 0;
        }
        self.peers.remove(id)
    }

    fn next(&mut self) -> Option<(PeerIdentifier, Arc<Peer>)> {
        if self.order.is_empty() {
            return None;
        }
        let id = self.order[self.cursor % self.order.len()].clone();
        self.cursor = (self.cursor + 1) % self.order.len();
        let peer = self.peers.get(&id)?.clone();
        Some((id, peer))
    }
}

/// A `PeerList` subscriber that selects peers round-robin: successive
/// `choose_peer` calls cycle through the retained set in insertion order,
/// wrapping once exhausted. Add/remove are O(1) via the identifier→index
/// map; `choose_peer` blocks on a [`Notify`] while the ring is empty.
pub struct RoundRobinList {
    agent: Arc<Agent>,
    ring: Mutex<Ring>,
    peer_available: Notify,
}

impl RoundRobinList {
    pub fn new(agent: Arc<Agent>) -> Arc<Self> {
        Arc::new(RoundRobinList {
            agent,
            ring: Mutex::new(Ring::new()),
            peer_available: Notify::new(),
        })
    }

    /// Retains every peer in `initial` and inserts it into the ring.
    /// Retain errors are aggregated: peers that retained successfully are
    /// still in the ring when this returns an error.
    pub fn start(
        self: &Arc<Self>,
        initial: impl IntoIterator<Item = PeerIdentifier>,
    ) -> Result<(), ChooserError> {
        {
            let mut ring = self.ring.lock();
            if ring.started {
                return Err(ChooserError::AlreadyStarted);
            }
            ring.started = true;
        }

        let mut failures = Vec::new();
        for id in initial {
            if let Err(err) = self.insert_retained(id) {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ChooserError::RetainFailed(failures))
        }
    }

    fn insert_retained(self: &Arc<Self>, id: PeerIdentifier) -> Result<(), PeerError> {
        let subscriber: Arc<dyn PeerSubscriber> = self.clone();
        let peer = self.agent.retain_peer(id.clone(), subscriber);
        self.ring.lock().insert(id, peer);
        self.peer_available.notify_one();
        Ok(())
    }

    /// Releases every peer held, wakes every blocked waiter with
    /// [`ChooserError::ChooserStopped`], and transitions to stopped.
    pub fn stop(self: &Arc<Self>) -> Result<(), ChooserError> {
        let ids: Vec<PeerIdentifier> = {
            let mut ring = self.ring.lock();
            if !ring.started {
                return Err(ChooserError::NotStarted);
            }
            ring.started = false;
            let ids = ring.order.clone();
            ring.order.clear();
            ring.index.clear();
            ring.peers.clear();
            ring.cursor = 0;
            ids
        };

        let subscriber: Arc<dyn PeerSubscriber> = self.clone();
        let mut failures = Vec::new();
        for id in ids {
            if let Err(err) = self.agent.release_peer(&id, &subscriber) {
                failures.push(err);
            }
        }

        self.peer_available.notify_waiters();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ChooserError::ReleaseFailed(failures))
        }
    }

    pub fn add(self: &Arc<Self>, id: PeerIdentifier) -> Result<(), ChooserError> {
        {
            let ring = self.ring.lock();
            if !ring.started {
                return Err(ChooserError::NotStarted);
            }
            if ring.index.contains_key(&id) {
                return Err(ChooserError::PeerAlreadyInList(id));
            }
        }
        self.insert_retained(id)
            .map_err(|e| ChooserError::RetainFailed(vec![e]))
    }

    pub fn remove(self: &Arc<Self>, id: PeerIdentifier) -> Result<(), ChooserError> {
        {
            let mut ring = self.ring.lock();
            if !ring.started {
                return Err(ChooserError::NotStarted);
            }
            if ring.remove(&id).is_none() {
                return Err(ChooserError::PeerNotInList(id));
            }
        }
        let subscriber: Arc<dyn PeerSubscriber> = self.clone();
        self.agent
            .release_peer(&id, &subscriber)
            .map_err(|e| ChooserError::ReleaseFailed(vec![e]))
    }

    /// Advances the round-robin cursor and returns the next peer, blocking
    /// while the ring is empty. `req` is accepted for interface symmetry
    /// with shard/routing-key-aware choosers; plain round-robin ignores it.
    pub async fn choose_peer(
        self: &Arc<Self>,
        ctx: &Context,
        _req: &Request,
    ) -> Result<Arc<Peer>, ChooserError> {
        loop {
            let notified = self.peer_available.notified();

            {
                let mut ring = self.ring.lock();
                if !ring.started {
                    return Err(ChooserError::NotStarted);
                }
                if let Some((_, peer)) = ring.next() {
                    return Ok(peer);
                }
                if !ctx.has_deadline() {
                    return Err(ChooserError::ChooseContextHasNoDeadline);
                }
            }

            tokio::select! {
                _ = notified => {
                    if !self.ring.lock().started {
                        return Err(ChooserError::ChooserStopped);
                    }
                }
                _ = ctx.cancelled() => {
                    return Err(ChooserError::Cancelled);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PeerSubscriber for RoundRobinList {
    fn notify_status_changed(&self, peer: Arc<Peer>) {
        tracing::debug!(
            peer = %peer.identifier(),
            pending = peer.pending_request_count(),
            "peer status changed"
        );
    }
}
