pub mod roundrobin;

pub use roundrobin::{ChooserError, RoundRobinList};
