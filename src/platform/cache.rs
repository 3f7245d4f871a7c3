//! Bounded cache of user lookups

use std::collections::HashMap;
use std::sync::Mutex;

/// Remembers what a login resolved to on the tracker
///
/// Keys are case-insensitive. When full the cache is emptied rather than
/// evicting entry by entry.
#[derive(Debug)]
pub(crate) struct UserCache<V> {
    entries: Mutex<HashMap<String, V>>,
    capacity: usize,
}

impl<V: Clone> UserCache<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub(crate) fn get(&self, login: &str) -> Option<V> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&login.to_lowercase()).cloned())
    }

    pub(crate) fn insert(&self, login: &str, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.capacity {
                entries.clear();
            }
            entries.insert(login.to_lowercase(), value);
        }
    }
}
