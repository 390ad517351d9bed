//! Per-key async locks

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A set of async mutexes addressed by string key.
///
/// The map only holds weak references; an entry disappears once every
/// guard for its key has been dropped.
#[derive(Default)]
pub struct KeyedLocks {
    state: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

/// Holds the lock for one key until dropped
pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let mutex = {
            let mut state = self.state.lock().await;
            state.retain(|_, weak| weak.strong_count() > 0);
            if let Some(existing) = state.get(key).and_then(Weak::upgrade) {
                existing
            } else {
                let created = Arc::new(Mutex::new(()));
                state.insert(key.to_string(), Arc::downgrade(&created));
                created
            }
        };

        KeyedGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of keys currently held or awaited
    pub async fn active_keys(&self) -> usize {
        let state = self.state.lock().await;
        state
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
