use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A distinguished token type identifying one slot in an [`Options`] bag.
///
/// Rather than stringly-typed keys, each option is a zero-sized type that
/// names the value it carries. This sidesteps the source's pointer-identity
/// keys while keeping the container free of concrete transport types.
pub trait OptionKey: 'static {
    type Value: Clone + Send + Sync + 'static;
}

/// Immutable, typed key/value bag attached to outbounds and calls.
///
/// `with` never mutates the receiver: it returns a new bag that shares the
/// old entries and adds (or overwrites) one. Transports use this to attach
/// their own knobs (e.g. a connection pool size) without the core needing
/// to know the concrete type.
#[derive(Clone, Default)]
pub struct Options {
    entries: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new bag with `K`'s slot set to `value`. `self` is unaffected.
    pub fn with<K: OptionKey>(&self, value: K::Value) -> Self {
        let mut next = (*self.entries).clone();
        next.insert(TypeId::of::<K>(), Arc::new(value));
        Options {
            entries: Arc::new(next),
        }
    }

    /// Look up `K`'s slot. Returns `None` if it was never set.
    pub fn get<K: OptionKey>(&self) -> Option<K::Value> {
        self.entries
            .get(&TypeId::of::<K>())
            .and_then(|v| v.downcast_ref::<K::Value>())
            .cloned()
    }
}
