//! Weak reference manager
//!
//! Weak handles (`weak_<n>`) observe a host value without keeping it alive.
//! Lookups never fail; an absent or collected target is simply `None`.
//!
//! Finalization is driven by the caller rather than by the collector: a
//! finalizer runs exactly once, either when `remove` is called, when a
//! [`WeakGuard`] goes out of scope, or when `sweep` finds the target gone.
//! Removing an already-removed handle is a no-op.

use crate::objects::HostObject;
use crate::token::WeakHandle;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback run once when a weak entry is removed
pub type Finalizer = Box<dyn FnOnce(WeakHandle) + Send>;

struct WeakEntry {
    target: Weak<dyn Any + Send + Sync>,
    finalizer: Option<Finalizer>,
}

struct WeakTable {
    entries: HashMap<u64, WeakEntry>,
    next_id: u64,
}

/// Thread-safe table of non-owning handles.
pub struct WeakRefManager {
    table: RwLock<WeakTable>,
}

impl WeakRefManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            table: RwLock::new(WeakTable {
                entries: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Create a weak handle to a shared host value
    pub fn create_weak(&self, value: &HostObject, finalizer: Option<Finalizer>) -> WeakHandle {
        let has_finalizer = finalizer.is_some();
        let mut table = self.table.write();
        let handle = WeakHandle::new(table.next_id);
        table.next_id += 1;
        table.entries.insert(
            handle.as_u64(),
            WeakEntry {
                target: Arc::downgrade(value),
                finalizer,
            },
        );
        debug!(handle = %handle, has_finalizer, "weak handle created");
        handle
    }

    /// Create a weak handle to a typed shared value
    pub fn create_weak_typed<T: Any + Send + Sync>(
        &self,
        value: &Arc<T>,
        finalizer: Option<Finalizer>,
    ) -> WeakHandle {
        let object: HostObject = value.clone();
        self.create_weak(&object, finalizer)
    }

    /// Resolve a weak handle. `None` if removed or the target is gone.
    pub fn get(&self, handle: WeakHandle) -> Option<HostObject> {
        self.table
            .read()
            .entries
            .get(&handle.as_u64())
            .and_then(|entry| entry.target.upgrade())
    }

    /// Resolve and downcast a weak handle
    pub fn get_as<T: Any + Send + Sync>(&self, handle: WeakHandle) -> Option<Arc<T>> {
        self.get(handle).and_then(|value| value.downcast::<T>().ok())
    }

    /// Remove an entry and run its finalizer. Returns false if the handle
    /// was already gone, in which case nothing runs.
    pub fn remove(&self, handle: WeakHandle) -> bool {
        let entry = self.table.write().entries.remove(&handle.as_u64());
        match entry {
            Some(entry) => {
                debug!(handle = %handle, "weak handle removed");
                if let Some(finalizer) = entry.finalizer {
                    finalizer(handle);
                }
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose target has been dropped, running their
    /// finalizers. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let dead: Vec<(u64, WeakEntry)> = {
            let mut table = self.table.write();
            let ids: Vec<u64> = table
                .entries
                .iter()
                .filter(|(_, entry)| entry.target.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        let count = dead.len();
        for (id, entry) in dead {
            if let Some(finalizer) = entry.finalizer {
                finalizer(WeakHandle::new(id));
            }
        }
        if count > 0 {
            debug!(count, "weak handles swept");
        }
        count
    }

    /// Scope guard that removes `handle` when dropped
    pub fn guard(self: &Arc<Self>, handle: WeakHandle) -> WeakGuard {
        WeakGuard {
            manager: self.clone(),
            handle,
        }
    }

    /// Check if a handle is still registered (its target may be gone)
    pub fn contains(&self, handle: WeakHandle) -> bool {
        self.table.read().entries.contains_key(&handle.as_u64())
    }

    /// Number of registered entries
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    /// Check if no entries are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WeakRefManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its weak handle (running the finalizer) on drop.
pub struct WeakGuard {
    manager: Arc<WeakRefManager>,
    handle: WeakHandle,
}

impl WeakGuard {
    /// Guarded handle
    pub fn handle(&self) -> WeakHandle {
        self.handle
    }
}

impl Drop for WeakGuard {
    fn drop(&mut self) {
        self.manager.remove(self.handle);
    }
}
