use std::sync::Arc;

use crate::peer::peer::Peer;

/// Receives `notify_status_changed` whenever a retained peer's pending
/// count or connection status changes. A subscriber never owns the peers
/// it is notified about (the agent does); this is a relation used only to
/// fan out notifications, never to keep the subscriber alive.
pub trait PeerSubscriber: Send + Sync {
    fn notify_status_changed(&self, peer: Arc<Peer>);
}

/// Identifies a subscriber by the address of its allocation, so a
/// [`Peer`]'s subscriber set can be keyed without requiring
/// `PeerSubscriber` to implement `Eq`/`Hash` itself (it is a trait object).
pub(crate) fn subscriber_key(sub: &Arc<dyn PeerSubscriber>) -> usize {
    Arc::as_ptr(sub) as *const () as usize
}
