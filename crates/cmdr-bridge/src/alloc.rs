//! Allocation tracker
//!
//! Owns every buffer handed across the boundary. Buffers live in an arena of
//! slots; a handle is a slot index plus the slot's generation, never an
//! address. The arena holds the only strong reference to each payload, so a
//! handle can go stale but can never dangle.
//!
//! Freeing a slot bumps its generation before the slot is reused. A slot
//! whose generation is exhausted is retired instead of reused.

use crate::error::AllocError;
use crate::token::{AllocHandle, ObjectHandle};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// What an allocation holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocKind {
    /// UTF-8 text
    String,
    /// Raw bytes
    Bytes,
    /// Serialized host object
    Object,
}

impl AllocKind {
    fn index(self) -> usize {
        match self {
            AllocKind::String => 0,
            AllocKind::Bytes => 1,
            AllocKind::Object => 2,
        }
    }
}

/// Metadata of a live allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationInfo {
    /// Handle naming this allocation
    pub handle: AllocHandle,
    /// Payload length in bytes, fixed at creation
    pub size: usize,
    /// Payload kind
    pub kind: AllocKind,
    /// Object handle released when this allocation is freed
    pub owner: Option<ObjectHandle>,
}

/// A tracked buffer, returned by value when freed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    info: AllocationInfo,
    data: Vec<u8>,
}

impl Allocation {
    /// Metadata
    pub fn info(&self) -> AllocationInfo {
        self.info
    }

    /// Owning object handle, if any
    pub fn owner(&self) -> Option<ObjectHandle> {
        self.info.owner
    }

    /// Take the payload
    pub fn into_payload(self) -> Vec<u8> {
        self.data
    }
}

/// Live allocation counts per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    /// String allocations
    pub string: usize,
    /// Byte allocations
    pub bytes: usize,
    /// Object allocations
    pub object: usize,
}

struct Slot {
    generation: u32,
    entry: Option<Allocation>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live_bytes: usize,
    total_tracked_bytes: u64,
    counts: [usize; 3],
}

impl Arena {
    fn entry(&self, handle: AllocHandle) -> Option<&Allocation> {
        let slot = self.slots.get(handle.slot()?)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entry.as_ref()
    }
}

/// Thread-safe tracker of boundary buffers.
pub struct AllocationTracker {
    arena: RwLock<Arena>,
    max_allocation_bytes: Option<usize>,
    max_total_bytes: Option<usize>,
}

impl AllocationTracker {
    /// Create an unlimited tracker
    pub fn new() -> Self {
        Self::with_limits(None, None)
    }

    /// Create a tracker with byte limits
    pub fn with_limits(max_allocation_bytes: Option<usize>, max_total_bytes: Option<usize>) -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            max_allocation_bytes,
            max_total_bytes,
        }
    }

    /// Track a payload and return its handle
    pub fn track(
        &self,
        payload: Vec<u8>,
        kind: AllocKind,
        owner: Option<ObjectHandle>,
    ) -> Result<AllocHandle, AllocError> {
        let size = payload.len();
        if let Some(limit) = self.max_allocation_bytes {
            if size > limit {
                return Err(AllocError::Exhausted { requested: size, limit });
            }
        }

        let mut arena = self.arena.write();
        if let Some(limit) = self.max_total_bytes {
            if arena.live_bytes.saturating_add(size) > limit {
                return Err(AllocError::Exhausted { requested: size, limit });
            }
        }

        let index = match arena.free.pop() {
            Some(index) => index,
            None => {
                if arena.slots.len() > AllocHandle::MAX_SLOT {
                    // Every slot index is in use or retired.
                    return Err(AllocError::Exhausted {
                        requested: size,
                        limit: arena.live_bytes,
                    });
                }
                arena.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                arena.slots.len() - 1
            }
        };

        let handle = AllocHandle::new(index, arena.slots[index].generation);
        arena.slots[index].entry = Some(Allocation {
            info: AllocationInfo {
                handle,
                size,
                kind,
                owner,
            },
            data: payload,
        });
        arena.live_bytes += size;
        arena.total_tracked_bytes += size as u64;
        arena.counts[kind.index()] += 1;

        debug!(handle = %handle, size, kind = ?kind, owner = ?owner, "allocation tracked");
        Ok(handle)
    }

    /// Track a string payload
    pub fn track_string(&self, text: &str) -> Result<AllocHandle, AllocError> {
        self.track(text.as_bytes().to_vec(), AllocKind::String, None)
    }

    /// Track a byte payload
    pub fn track_bytes(&self, bytes: &[u8]) -> Result<AllocHandle, AllocError> {
        self.track(bytes.to_vec(), AllocKind::Bytes, None)
    }

    /// Stop tracking an allocation and hand it back.
    ///
    /// The caller is responsible for releasing `owner` if one is set.
    pub fn free(&self, handle: AllocHandle) -> Result<Allocation, AllocError> {
        let mut arena = self.arena.write();
        let index = handle.slot().ok_or(AllocError::NotFound(handle))?;
        let slot = arena
            .slots
            .get_mut(index)
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(AllocError::NotFound(handle))?;
        let allocation = slot.entry.take().ok_or(AllocError::NotFound(handle))?;

        let retired = slot.generation == u32::MAX;
        if !retired {
            slot.generation += 1;
            arena.free.push(index);
        }
        arena.live_bytes -= allocation.info.size;
        arena.counts[allocation.info.kind.index()] -= 1;

        debug!(handle = %handle, size = allocation.info.size, retired, "allocation freed");
        Ok(allocation)
    }

    /// Read the first `length` bytes of an allocation.
    ///
    /// The null handle reads as empty for any length.
    pub fn read(&self, handle: AllocHandle, length: usize) -> Result<Vec<u8>, AllocError> {
        if handle.is_null() {
            return Ok(Vec::new());
        }
        let arena = self.arena.read();
        let allocation = arena.entry(handle).ok_or(AllocError::NotFound(handle))?;
        if length > allocation.info.size {
            return Err(AllocError::OutOfBounds {
                requested: length,
                size: allocation.info.size,
            });
        }
        Ok(allocation.data[..length].to_vec())
    }

    /// Read a whole allocation
    pub fn read_all(&self, handle: AllocHandle) -> Result<Vec<u8>, AllocError> {
        if handle.is_null() {
            return Ok(Vec::new());
        }
        let arena = self.arena.read();
        arena
            .entry(handle)
            .map(|allocation| allocation.data.clone())
            .ok_or(AllocError::NotFound(handle))
    }

    /// Read the first `length` bytes as UTF-8
    pub fn read_string(&self, handle: AllocHandle, length: usize) -> Result<String, AllocError> {
        let bytes = self.read(handle, length)?;
        String::from_utf8(bytes).map_err(|_| AllocError::InvalidUtf8(handle))
    }

    /// Metadata of a live allocation
    pub fn get(&self, handle: AllocHandle) -> Result<AllocationInfo, AllocError> {
        self.arena
            .read()
            .entry(handle)
            .map(|allocation| allocation.info)
            .ok_or(AllocError::NotFound(handle))
    }

    /// Check if a handle names a live allocation
    pub fn contains(&self, handle: AllocHandle) -> bool {
        self.arena.read().entry(handle).is_some()
    }

    /// Number of live allocations
    pub fn len(&self) -> usize {
        self.arena.read().counts.iter().sum()
    }

    /// Check if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live tracked bytes
    pub fn live_bytes(&self) -> usize {
        self.arena.read().live_bytes
    }

    /// Bytes tracked since creation, including freed allocations
    pub fn total_tracked_bytes(&self) -> u64 {
        self.arena.read().total_tracked_bytes
    }

    /// Payload capacity currently reserved by live allocations
    pub fn reserved_bytes(&self) -> usize {
        let arena = self.arena.read();
        let payload: usize = arena
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .map(|allocation| allocation.data.capacity())
            .sum();
        payload + arena.slots.capacity() * std::mem::size_of::<Slot>()
    }

    /// Live allocation counts per kind
    pub fn counts(&self) -> KindCounts {
        let counts = self.arena.read().counts;
        KindCounts {
            string: counts[0],
            bytes: counts[1],
            object: counts[2],
        }
    }

    /// Free every allocation whose owner is no longer live.
    ///
    /// `is_live` is evaluated without the arena lock held.
    pub fn sweep_orphans(&self, is_live: impl Fn(ObjectHandle) -> bool) -> Vec<Allocation> {
        let owned: Vec<(AllocHandle, ObjectHandle)> = {
            let arena = self.arena.read();
            arena
                .slots
                .iter()
                .filter_map(|slot| slot.entry.as_ref())
                .filter_map(|allocation| {
                    allocation
                        .info
                        .owner
                        .map(|owner| (allocation.info.handle, owner))
                })
                .collect()
        };

        owned
            .into_iter()
            .filter(|(_, owner)| !is_live(*owner))
            .filter_map(|(handle, _)| self.free(handle).ok())
            .collect()
    }
}

impl Default for AllocationTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_read() {
        let tracker = AllocationTracker::new();
        let h = tracker.track_string("hello").unwrap();

        assert_eq!(tracker.read(h, 5).unwrap(), b"hello");
        assert_eq!(tracker.read(h, 2).unwrap(), b"he");
        assert_eq!(tracker.read_string(h, 5).unwrap(), "hello");
        assert_eq!(tracker.get(h).unwrap().size, 5);
        assert_eq!(tracker.get(h).unwrap().kind, AllocKind::String);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let tracker = AllocationTracker::new();
        let h = tracker.track_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(
            tracker.read(h, 4),
            Err(AllocError::OutOfBounds { requested: 4, size: 3 })
        );
    }

    #[test]
    fn test_null_handle_reads_empty() {
        let tracker = AllocationTracker::new();
        assert_eq!(tracker.read(AllocHandle::NULL, 0).unwrap(), Vec::<u8>::new());
        assert_eq!(tracker.read(AllocHandle::NULL, 1024).unwrap(), Vec::<u8>::new());
        assert!(tracker.free(AllocHandle::NULL).is_err());
    }

    #[test]
    fn test_free_then_lookup_fails() {
        let tracker = AllocationTracker::new();
        let h = tracker.track_string("x").unwrap();
        let freed = tracker.free(h).unwrap();
        assert_eq!(freed.into_payload(), b"x");

        assert_eq!(tracker.free(h), Err(AllocError::NotFound(h)));
        assert_eq!(tracker.read(h, 1), Err(AllocError::NotFound(h)));
        assert!(!tracker.contains(h));
    }

    #[test]
    fn test_reused_slot_gets_new_handle() {
        let tracker = AllocationTracker::new();
        let first = tracker.track_string("a").unwrap();
        tracker.free(first).unwrap();
        let second = tracker.track_string("b").unwrap();

        assert_eq!(first.slot(), second.slot());
        assert_ne!(first, second);
        assert!(tracker.read(first, 1).is_err());
        assert_eq!(tracker.read(second, 1).unwrap(), b"b");
    }

    #[test]
    fn test_counts_and_bytes() {
        let tracker = AllocationTracker::new();
        let a = tracker.track_string("abc").unwrap();
        tracker.track_bytes(&[0; 10]).unwrap();
        tracker
            .track(vec![1, 2], AllocKind::Object, Some(ObjectHandle::new(1)))
            .unwrap();

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.live_bytes(), 15);
        assert_eq!(
            tracker.counts(),
            KindCounts {
                string: 1,
                bytes: 1,
                object: 1
            }
        );

        tracker.free(a).unwrap();
        assert_eq!(tracker.live_bytes(), 12);
        assert_eq!(tracker.total_tracked_bytes(), 15);
        assert!(tracker.reserved_bytes() >= 12);
    }

    #[test]
    fn test_limits() {
        let tracker = AllocationTracker::with_limits(Some(4), Some(6));
        assert_eq!(
            tracker.track_bytes(&[0; 5]),
            Err(AllocError::Exhausted { requested: 5, limit: 4 })
        );
        tracker.track_bytes(&[0; 4]).unwrap();
        assert_eq!(
            tracker.track_bytes(&[0; 3]),
            Err(AllocError::Exhausted { requested: 3, limit: 6 })
        );
        tracker.track_bytes(&[0; 2]).unwrap();
    }

    #[test]
    fn test_sweep_orphans() {
        let tracker = AllocationTracker::new();
        let live = ObjectHandle::new(1);
        let dead = ObjectHandle::new(2);
        let kept = tracker.track(vec![1], AllocKind::Object, Some(live)).unwrap();
        let swept = tracker.track(vec![2], AllocKind::Object, Some(dead)).unwrap();
        let unowned = tracker.track_string("free").unwrap();

        let removed = tracker.sweep_orphans(|owner| owner == live);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].info().handle, swept);
        assert!(tracker.contains(kept));
        assert!(tracker.contains(unowned));
    }
}
