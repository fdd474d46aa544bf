//! Opaque handle tokens
//!
//! Guests treat every handle as a pass-through string. Each kind has its own
//! namespace on the wire:
//!
//! ```text
//! allocation:  decimal u64, (generation << 32) | (slot + 1); "0" is null
//! object:      ref_<n>
//! weak:        weak_<n>
//! ```
//!
//! Object and weak counters only ever grow, so a released token can never
//! name a different entry later in the same process.

use crate::error::HandleError;
use std::fmt;
use std::str::FromStr;

const SLOT_MASK: u64 = 0xFFFF_FFFF;

/// Handle to a tracked allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocHandle(u64);

impl AllocHandle {
    /// The null handle. Reads through it succeed with an empty result.
    pub const NULL: AllocHandle = AllocHandle(0);

    /// Largest slot index representable in a handle
    pub(crate) const MAX_SLOT: usize = (SLOT_MASK - 1) as usize;

    pub(crate) fn new(slot: usize, generation: u32) -> Self {
        debug_assert!(slot <= Self::MAX_SLOT);
        AllocHandle(((generation as u64) << 32) | (slot as u64 + 1))
    }

    /// Rebuild from raw bits
    pub const fn from_u64(bits: u64) -> Self {
        AllocHandle(bits)
    }

    /// Raw bits
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the null handle
    pub const fn is_null(&self) -> bool {
        self.0 & SLOT_MASK == 0
    }

    pub(crate) fn slot(&self) -> Option<usize> {
        let low = self.0 & SLOT_MASK;
        (low != 0).then(|| (low - 1) as usize)
    }

    pub(crate) fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for AllocHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AllocHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(AllocHandle::NULL);
        }
        s.parse::<u64>()
            .map(AllocHandle)
            .map_err(|_| HandleError::InvalidToken(s.to_string()))
    }
}

macro_rules! counted_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// Wire prefix of this handle kind
            pub const PREFIX: &'static str = $prefix;

            pub(crate) const fn new(n: u64) -> Self {
                $name(n)
            }

            /// Counter value behind this handle
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = HandleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .strip_prefix(Self::PREFIX)
                    .and_then(|n| n.parse::<u64>().ok())
                    .filter(|n| *n != 0)
                    .map($name)
                    .ok_or_else(|| HandleError::InvalidToken(s.to_string()))
            }
        }
    };
}

counted_handle!(
    /// Strong, reference-counted handle to a host object
    ObjectHandle,
    "ref_"
);

counted_handle!(
    /// Non-owning handle to a host object
    WeakHandle,
    "weak_"
);
