//! Observer registry
//!
//! Callbacks run synchronously, in registration order. Removal is by the
//! [`ListenerId`] returned from [`Listeners::add`]; ids are unique across all
//! registries in the process.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle used to unregister a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Listeners<T: ?Sized> {
    entries: Mutex<Vec<(ListenerId, Callback<T>)>>,
}

impl<T: ?Sized> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

impl<T: ?Sized> Listeners<T> {
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if `id` was not registered here
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback with `value`.
    ///
    /// The registry is snapshotted first, so callbacks may add or remove
    /// listeners without deadlocking.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let listeners: Listeners<u32> = Listeners::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            listeners.add(move |value: &u32| seen.lock().push((tag, *value)));
        }
        listeners.emit(&7);

        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_remove_by_identity() {
        let listeners: Listeners<u32> = Listeners::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        // Two behaviourally identical callbacks, only one is removed
        let make = |seen: Arc<Mutex<Vec<u32>>>| move |value: &u32| seen.lock().push(*value);
        let a = listeners.add(make(seen.clone()));
        let _b = listeners.add(make(seen.clone()));

        assert!(listeners.remove(a));
        assert!(!listeners.remove(a));
        listeners.emit(&1);

        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let listeners: Arc<Listeners<u32>> = Arc::new(Listeners::default());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let listeners = listeners.clone();
            let slot = slot.clone();
            listeners.clone().add(move |_| {
                if let Some(id) = slot.lock().take() {
                    listeners.remove(id);
                }
            })
        };
        *slot.lock() = Some(id);

        listeners.emit(&0);
        assert!(listeners.is_empty());
    }
}
