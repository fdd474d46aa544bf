//! Handle registry for host objects
//!
//! Issues `ref_<n>` handles for host values that cross the boundary by
//! reference. Each entry starts with a reference count of 1; `retain` and
//! `release` adjust it under the registry's write lock, and the entry is
//! removed when the count reaches zero. Releasing an absent handle is an
//! error so guest-side double frees surface immediately.

use crate::error::HandleError;
use crate::token::ObjectHandle;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A host value stored behind a handle
pub type HostObject = Arc<dyn Any + Send + Sync>;

/// Snapshot of a registry entry
#[derive(Clone)]
pub struct ObjectEntry {
    /// Handle naming this entry
    pub handle: ObjectHandle,
    /// Shared host value
    pub value: HostObject,
    /// Reference count at the time of the snapshot
    pub ref_count: usize,
    /// Type tag supplied at creation
    pub type_tag: String,
}

impl fmt::Debug for ObjectEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectEntry")
            .field("handle", &self.handle)
            .field("ref_count", &self.ref_count)
            .field("type_tag", &self.type_tag)
            .finish()
    }
}

struct Entry {
    value: HostObject,
    ref_count: usize,
    type_tag: String,
}

struct Table {
    entries: HashMap<u64, Entry>,
    next_id: u64,
}

/// Thread-safe registry of reference-counted host objects.
pub struct HandleRegistry {
    table: RwLock<Table>,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table {
                entries: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a value and return its handle (ref count 1)
    pub fn create<T: Any + Send + Sync>(&self, value: T, type_tag: impl Into<String>) -> ObjectHandle {
        self.create_shared(Arc::new(value), type_tag)
    }

    /// Register an already-shared value
    pub fn create_shared(&self, value: HostObject, type_tag: impl Into<String>) -> ObjectHandle {
        let type_tag = type_tag.into();
        let mut table = self.table.write();
        let handle = ObjectHandle::new(table.next_id);
        table.next_id += 1;
        debug!(handle = %handle, type_tag = %type_tag, "object handle created");
        table.entries.insert(
            handle.as_u64(),
            Entry {
                value,
                ref_count: 1,
                type_tag,
            },
        );
        handle
    }

    /// Look up an entry
    pub fn get(&self, handle: ObjectHandle) -> Result<ObjectEntry, HandleError> {
        let table = self.table.read();
        let entry = table
            .entries
            .get(&handle.as_u64())
            .ok_or_else(|| HandleError::NotFound(handle.to_string()))?;
        Ok(ObjectEntry {
            handle,
            value: entry.value.clone(),
            ref_count: entry.ref_count,
            type_tag: entry.type_tag.clone(),
        })
    }

    /// Look up an entry and downcast its value
    pub fn get_as<T: Any + Send + Sync>(&self, handle: ObjectHandle) -> Result<Arc<T>, HandleError> {
        let entry = self.get(handle)?;
        entry
            .value
            .downcast::<T>()
            .map_err(|_| HandleError::TypeMismatch {
                handle: handle.to_string(),
                expected: std::any::type_name::<T>(),
                actual: entry.type_tag,
            })
    }

    /// Increment the reference count. Returns the new count.
    pub fn retain(&self, handle: ObjectHandle) -> Result<usize, HandleError> {
        let mut table = self.table.write();
        let entry = table
            .entries
            .get_mut(&handle.as_u64())
            .ok_or_else(|| HandleError::NotFound(handle.to_string()))?;
        entry.ref_count += 1;
        debug!(handle = %handle, ref_count = entry.ref_count, "object handle retained");
        Ok(entry.ref_count)
    }

    /// Decrement the reference count, removing the entry at zero.
    /// Returns the remaining count.
    pub fn release(&self, handle: ObjectHandle) -> Result<usize, HandleError> {
        let removed = {
            let mut table = self.table.write();
            let entry = table
                .entries
                .get_mut(&handle.as_u64())
                .ok_or_else(|| HandleError::NotFound(handle.to_string()))?;
            entry.ref_count -= 1;
            let remaining = entry.ref_count;
            debug!(handle = %handle, ref_count = remaining, "object handle released");
            if remaining > 0 {
                return Ok(remaining);
            }
            table.entries.remove(&handle.as_u64())
        };
        // Drop the value outside the lock; its destructor is arbitrary host code.
        drop(removed);
        debug!(handle = %handle, "object handle removed");
        Ok(0)
    }

    /// Current reference count
    pub fn ref_count(&self, handle: ObjectHandle) -> Result<usize, HandleError> {
        self.table
            .read()
            .entries
            .get(&handle.as_u64())
            .map(|entry| entry.ref_count)
            .ok_or_else(|| HandleError::NotFound(handle.to_string()))
    }

    /// Check if a handle is live
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.table.read().entries.contains_key(&handle.as_u64())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles in creation order
    pub fn handles(&self) -> Vec<ObjectHandle> {
        let mut ids: Vec<u64> = self.table.read().entries.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(ObjectHandle::new).collect()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
