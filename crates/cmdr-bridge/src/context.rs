//! Bridge context
//!
//! A `BridgeContext` bundles every piece of shared bridge state: the
//! allocation tracker, the object and weak registries, the string pool and
//! the converter. It is built once and handed to the call wrapper; there is
//! no process-global registry, so tests simply build a fresh context.

use crate::alloc::{AllocKind, AllocationInfo, AllocationTracker, KindCounts};
use crate::config::BridgeConfig;
use crate::convert::{ConvertCx, Converter, Convertible};
use crate::error::{AllocError, BridgeResult, ConvertResult};
use crate::objects::HandleRegistry;
use crate::pool::StringPool;
use crate::shape::Shape;
use crate::token::{AllocHandle, ObjectHandle};
use crate::weak::WeakRefManager;
use cmdr_sdk::GuestValue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

crate::convertible_record! {
    /// Host memory figures
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HostMemory {
        /// Live tracked bytes
        pub allocated: usize,
        /// Bytes tracked since creation
        pub total_allocated: u64 => "totalAllocated",
        /// Payload capacity currently reserved
        pub system_reserved: usize => "systemReserved",
        /// Cleanup sweeps run
        pub gc_cycles: u64 => "gcCycles",
    }
}

crate::convertible_record! {
    /// Read-only statistics snapshot
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MemoryStats {
        /// Live allocations
        pub total_allocations: usize => "totalAllocations",
        /// Live tracked bytes
        pub total_allocated_bytes: usize => "totalAllocatedBytes",
        /// Live object handles
        pub object_references: usize => "objectReferences",
        /// Live allocations per kind
        pub allocations_by_type: KindCounts => "allocationsByType",
        /// Host memory figures
        pub host_memory: HostMemory => "hostMemory",
    }
}

impl Convertible for KindCounts {
    fn shape() -> Shape {
        Shape::Record {
            name: "KindCounts".to_string(),
            fields: ["string", "bytes", "object"]
                .into_iter()
                .map(|key| (key.to_string(), Shape::UInt))
                .collect(),
        }
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::object([
            ("string", cx.encode(&self.string)?),
            ("bytes", cx.encode(&self.bytes)?),
            ("object", cx.encode(&self.object)?),
        ]))
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        let count = |key: &str| -> ConvertResult<usize> {
            cx.decode::<usize>(value.get(key).unwrap_or(&GuestValue::Null))
                .map_err(|e| e.at_field(key))
        };
        crate::convert::expect_object(value, "KindCounts")?;
        Ok(KindCounts {
            string: count("string")?,
            bytes: count("bytes")?,
            object: count("object")?,
        })
    }
}

/// Entries reclaimed by one cleanup sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Allocations whose owner handle was gone
    pub orphaned_allocations: usize,
    /// Weak entries whose target was gone
    pub dead_weak_refs: usize,
}

impl CleanupReport {
    /// Total entries reclaimed
    pub fn total(&self) -> usize {
        self.orphaned_allocations + self.dead_weak_refs
    }
}

/// Shared bridge state
pub struct BridgeContext {
    config: BridgeConfig,
    tracker: Arc<AllocationTracker>,
    objects: Arc<HandleRegistry>,
    weak: Arc<WeakRefManager>,
    pool: StringPool,
    converter: Converter,
    sweeps: AtomicU64,
}

impl BridgeContext {
    /// Build a context from a configuration
    pub fn new(config: BridgeConfig) -> Self {
        let tracker = Arc::new(AllocationTracker::with_limits(
            config.max_allocation_bytes,
            config.max_total_bytes,
        ));
        let objects = Arc::new(HandleRegistry::new());
        let converter = Converter::new(objects.clone(), &config);
        Self {
            pool: StringPool::new(tracker.clone()),
            weak: Arc::new(WeakRefManager::new()),
            tracker,
            objects,
            converter,
            config,
            sweeps: AtomicU64::new(0),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Allocation tracker
    pub fn tracker(&self) -> &Arc<AllocationTracker> {
        &self.tracker
    }

    /// Object handle registry
    pub fn objects(&self) -> &Arc<HandleRegistry> {
        &self.objects
    }

    /// Weak reference manager
    pub fn weak(&self) -> &Arc<WeakRefManager> {
        &self.weak
    }

    /// String and byte pool
    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    /// Type converter
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Track a payload owned by an object handle.
    ///
    /// The owner is retained for as long as the allocation lives and
    /// released again by [`free_allocation`](Self::free_allocation).
    pub fn allocate_owned(
        &self,
        payload: Vec<u8>,
        kind: AllocKind,
        owner: ObjectHandle,
    ) -> BridgeResult<AllocHandle> {
        self.objects.retain(owner)?;
        match self.tracker.track(payload, kind, Some(owner)) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.objects.release(owner)?;
                Err(err.into())
            }
        }
    }

    /// Free an allocation, releasing its owner handle if it has one
    pub fn free_allocation(&self, handle: AllocHandle) -> Result<AllocationInfo, AllocError> {
        let info = self.tracker.free(handle)?.info();
        if let Some(owner) = info.owner {
            // The owner may already have been over-released by the guest.
            if let Err(err) = self.objects.release(owner) {
                debug!(handle = %handle, owner = %owner, error = %err, "owner already gone");
            }
        }
        Ok(info)
    }

    /// Reclaim orphaned allocations and dead weak entries.
    ///
    /// Never touches an object handle whose reference count is above zero.
    pub fn cleanup(&self) -> CleanupReport {
        let orphans = self.tracker.sweep_orphans(|owner| self.objects.contains(owner));
        let report = CleanupReport {
            orphaned_allocations: orphans.len(),
            dead_weak_refs: self.weak.sweep(),
        };
        let cycle = self.sweeps.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            cycle,
            orphaned_allocations = report.orphaned_allocations,
            dead_weak_refs = report.dead_weak_refs,
            "cleanup sweep finished"
        );
        report
    }

    /// Cleanup sweeps run so far
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Statistics snapshot
    pub fn memory_stats(&self) -> MemoryStats {
        let live_bytes = self.tracker.live_bytes();
        MemoryStats {
            total_allocations: self.tracker.len(),
            total_allocated_bytes: live_bytes,
            object_references: self.objects.len(),
            allocations_by_type: self.tracker.counts(),
            host_memory: HostMemory {
                allocated: live_bytes,
                total_allocated: self.tracker.total_tracked_bytes(),
                system_reserved: self.tracker.reserved_bytes(),
                gc_cycles: self.sweep_count(),
            },
        }
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}
