use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::peer::identifier::PeerIdentifier;
use crate::peer::peer::{Peer, PeerError};
use crate::peer::subscriber::PeerSubscriber;

/// The single authority that owns peer objects. Guarantees identity per
/// identifier: two concurrent retains for the same identifier observe the
/// same [`Peer`]. Peers are torn down once their subscriber set empties;
/// after that, the identifier may be retained again, which creates a new
/// `Peer`.
pub struct Agent {
    peers: Mutex<HashMap<PeerIdentifier, Arc<Peer>>>,
}

impl Agent {
    pub fn new() -> Self {
        Agent {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the peer for `id`, creating it if absent, and records `sub`
    /// as a holder. A repeat retain for the same `(id, sub)` pair adds an
    /// internal reference rather than a duplicate registration.
    pub fn retain_peer(&self, id: PeerIdentifier, sub: Arc<dyn PeerSubscriber>) -> Arc<Peer> {
        let mut peers = self.peers.lock();
        let peer = peers
            .entry(id.clone())
            .or_insert_with(|| Peer::new(id))
            .clone();
        peer.retain(sub);
        peer
    }

    /// Drops one reference for `(id, sub)`. Once `sub`'s references reach
    /// zero it is removed from the peer's subscriber set; once the
    /// subscriber set is empty, the peer is discarded and MUST NOT be
    /// retained again under the same `Arc` (a later retain of the same
    /// identifier allocates a fresh `Peer`).
    pub fn release_peer(
        &self,
        id: &PeerIdentifier,
        sub: &Arc<dyn PeerSubscriber>,
    ) -> Result<(), PeerError> {
        let mut peers = self.peers.lock();
        let Some(peer) = peers.get(id).cloned() else {
            return Err(PeerError::NoReferenceToSubscriber);
        };
        peer.release(sub)?;
        if peer.subscriber_count() == 0 {
            peers.remove(id);
        }
        Ok(())
    }

    pub fn peer(&self, id: &PeerIdentifier) -> Option<Arc<Peer>> {
        self.peers.lock().get(id).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::peer::Peer as PeerType;

    struct Noop;
    impl PeerSubscriber for Noop {
        fn notify_status_changed(&self, _peer: Arc<PeerType>) {}
    }

    #[test]
    fn concurrent_retains_return_same_peer_object() {
        let agent = Agent::new();
        let sub_a: Arc<dyn PeerSubscriber> = Arc::new(Noop);
        let sub_b: Arc<dyn PeerSubscriber> = Arc::new(Noop);

        let id = PeerIdentifier::new("host:1");
        let peer_a = agent.retain_peer(id.clone(), sub_a);
        let peer_b = agent.retain_peer(id, sub_b);

        assert!(Arc::ptr_eq(&peer_a, &peer_b));
    }

    #[test]
    fn peer_is_discarded_once_subscriber_set_empties() {
        let agent = Agent::new();
        let sub: Arc<dyn PeerSubscriber> = Arc::new(Noop);
        let id = PeerIdentifier::new("host:1");

        agent.retain_peer(id.clone(), sub.clone());
        assert_eq!(agent.peer_count(), 1);

        agent.release_peer(&id, &sub).unwrap();
        assert_eq!(agent.peer_count(), 0);
        assert!(agent.peer(&id).is_none());
    }

    #[test]
    fn release_of_unknown_identifier_fails() {
        let agent = Agent::new();
        let sub: Arc<dyn PeerSubscriber> = Arc::new(Noop);
        let err = agent
            .release_peer(&PeerIdentifier::new("ghost:1"), &sub)
            .unwrap_err();
        assert!(matches!(err, PeerError::NoReferenceToSubscriber));
    }
}
