//! String and byte interning pool
//!
//! Deduplicates payloads that cross the boundary repeatedly (flag names,
//! command names) so the guest can compare handles instead of contents.
//! The same text always maps to the same handle until `clear()`.
//!
//! The pool is unbounded. Callers that need bounded memory call `clear()`.

use crate::alloc::{AllocKind, AllocationTracker};
use crate::error::AllocError;
use crate::token::AllocHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct PoolMaps {
    strings: HashMap<String, AllocHandle>,
    bytes: HashMap<Vec<u8>, AllocHandle>,
}

/// Interning pool backed by the allocation tracker.
pub struct StringPool {
    tracker: Arc<AllocationTracker>,
    maps: RwLock<PoolMaps>,
}

impl StringPool {
    /// Create an empty pool allocating through `tracker`
    pub fn new(tracker: Arc<AllocationTracker>) -> Self {
        Self {
            tracker,
            maps: RwLock::new(PoolMaps::default()),
        }
    }

    /// Intern a string, returning the existing handle when seen before
    pub fn intern(&self, text: &str) -> Result<AllocHandle, AllocError> {
        if let Some(handle) = self.maps.read().strings.get(text).copied() {
            if self.tracker.contains(handle) {
                return Ok(handle);
            }
        }

        let mut maps = self.maps.write();
        // Another writer may have interned the text while we waited.
        if let Some(handle) = maps.strings.get(text).copied() {
            if self.tracker.contains(handle) {
                return Ok(handle);
            }
            debug!(handle = %handle, "pooled string was freed externally, re-interning");
        }
        let handle = self
            .tracker
            .track(text.as_bytes().to_vec(), AllocKind::String, None)?;
        maps.strings.insert(text.to_string(), handle);
        debug!(handle = %handle, len = text.len(), "string interned");
        Ok(handle)
    }

    /// Intern a byte payload. Bytes and strings use separate key spaces.
    pub fn intern_bytes(&self, bytes: &[u8]) -> Result<AllocHandle, AllocError> {
        if let Some(handle) = self.maps.read().bytes.get(bytes).copied() {
            if self.tracker.contains(handle) {
                return Ok(handle);
            }
        }

        let mut maps = self.maps.write();
        if let Some(handle) = maps.bytes.get(bytes).copied() {
            if self.tracker.contains(handle) {
                return Ok(handle);
            }
        }
        let handle = self.tracker.track(bytes.to_vec(), AllocKind::Bytes, None)?;
        maps.bytes.insert(bytes.to_vec(), handle);
        debug!(handle = %handle, len = bytes.len(), "bytes interned");
        Ok(handle)
    }

    /// Handle of an interned string, without interning
    pub fn lookup(&self, text: &str) -> Option<AllocHandle> {
        self.maps
            .read()
            .strings
            .get(text)
            .copied()
            .filter(|handle| self.tracker.contains(*handle))
    }

    /// Number of pooled entries (strings and bytes)
    pub fn len(&self) -> usize {
        let maps = self.maps.read();
        maps.strings.len() + maps.bytes.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free every pooled allocation and empty the pool.
    /// Returns the number of allocations freed.
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.maps.write());
        let freed = drained
            .strings
            .into_values()
            .chain(drained.bytes.into_values())
            .filter(|handle| self.tracker.free(*handle).is_ok())
            .count();
        debug!(freed, "string pool cleared");
        freed
    }
}
