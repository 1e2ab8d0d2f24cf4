//! Keyed callback registry.
//!
//! Listeners are stored in registration order under a caller-chosen id. The
//! first registration for an id wins unless the caller asks to overwrite.
//! Dispatch works on a snapshot, so a listener may register or unregister
//! listeners while being called.

use std::sync::Arc;

use parking_lot::RwLock;

pub struct ListenerSet<T: ?Sized> {
    entries: RwLock<Vec<(String, Arc<T>)>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `listener` under `id`. Returns `false` if `id` was taken and
    /// `overwrite` is not set; an overwritten listener keeps its position.
    pub fn register(&self, id: &str, listener: Arc<T>, overwrite: bool) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(existing, _)| existing == id) {
            Some(entry) if overwrite => {
                entry.1 = listener;
                true
            }
            Some(_) => false,
            None => {
                entries.push((id.to_string(), listener));
                true
            }
        }
    }

    /// Removes the listener under `id`. Returns `true` if it existed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| existing != id);
        entries.len() != before
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().iter().any(|(existing, _)| existing == id)
    }

    /// Listeners in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
