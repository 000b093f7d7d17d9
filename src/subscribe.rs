//! Thread-safe subscriber registry.
//!
//! Re-architects the original's `sigslot::signal` into a plain
//! append-only registry with opaque deregistration handles, per
//! the redesign note in spec.md §9. Callbacks are always invoked
//! outside the coordination lock (see `state.rs`) so a subscriber that
//! calls back into `CloudClient::set_variable` cannot self-deadlock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::event::VariableChanged;

pub type Callback = Box<dyn Fn(&VariableChanged) + Send + Sync>;

/// Opaque handle returned by [`SubscriberRegistry::subscribe`], usable
/// with [`SubscriberRegistry::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Entry {
    handle: SubscriptionHandle,
    callback: Callback,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: Callback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().unwrap().push(Entry { handle, callback });
        handle
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.entries.lock().unwrap().retain(|e| e.handle != handle);
    }

    /// Invokes every registered callback with `event`. Must never be
    /// called while holding the coordination lock. Callbacks may legally
    /// call back into the client's public API (`get_variable`/
    /// `set_variable`), which never touches this registry's lock.
    pub fn notify(&self, event: &VariableChanged) {
        let entries = self.entries.lock().unwrap();
        for entry in entries.iter() {
            (entry.callback)(event);
        }
    }
}
