pub mod agent;
pub mod identifier;
pub mod peer;
pub mod subscriber;

pub use agent::Agent;
pub use identifier::PeerIdentifier;
pub use peer::{ConnectionStatus, PendingRequestGuard, Peer, PeerError};
pub use subscriber::PeerSubscriber;
