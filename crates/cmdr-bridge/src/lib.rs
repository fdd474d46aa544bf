//! Cmdr bridge core
//!
//! Moves commands, option values and errors between a compiled host module
//! and a dynamically-typed guest runtime that can only pass primitives and
//! opaque handles. Components, leaf first:
//!
//! - [`AllocationTracker`]: arena of boundary buffers behind
//!   generation-counted handles
//! - [`HandleRegistry`]: reference-counted `ref_<n>` handles to host values
//! - [`WeakRefManager`]: non-owning `weak_<n>` handles with finalizers
//! - [`StringPool`]: interning of repeated strings and byte payloads
//! - [`Converter`]: host ⇄ guest value conversion via [`Convertible`]
//! - [`codec`]: command error ⇄ [`ErrorEnvelope`]
//! - [`CallWrapper`] / [`Bridge`]: typed operations returning
//!   `{success, data | error}` envelopes
//!
//! All shared state lives in one [`BridgeContext`]; nothing is global.
//!
//! # Example
//!
//! ```ignore
//! use cmdr_bridge::{Bridge, BridgeConfig, GuestValue};
//! use cmdr_sdk::CommandError;
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! bridge.register("port", |(port,): (u16,)| {
//!     if port < 1024 {
//!         return Err(CommandError::invalid_option_argument("privileged", "--port", port.to_string()));
//!     }
//!     Ok(port)
//! });
//!
//! let envelope = bridge.call("port", &[GuestValue::Number(8080.0)]);
//! assert!(envelope.success);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod alloc;
pub mod codec;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod exports;
pub mod objects;
pub mod pool;
pub mod shape;
pub mod token;
pub mod weak;
pub mod wrapper;

pub use alloc::{AllocKind, Allocation, AllocationInfo, AllocationTracker, KindCounts};
pub use codec::ErrorEnvelope;
pub use config::{BridgeConfig, ConfigError};
pub use context::{BridgeContext, CleanupReport, HostMemory, MemoryStats};
pub use convert::{Bytes, ConversionRule, ConvertCx, Convertible, Converter, MapKey, Opaque};
pub use error::{
    AllocError, BridgeError, BridgeResult, ConversionError, ConvertResult, HandleError,
};
pub use exports::Bridge;
pub use objects::{HandleRegistry, HostObject, ObjectEntry};
pub use pool::StringPool;
pub use shape::Shape;
pub use token::{AllocHandle, ObjectHandle, WeakHandle};
pub use weak::{Finalizer, WeakGuard, WeakRefManager};
pub use wrapper::{CallEnvelope, CallError, CallFailure, CallWrapper, FromArgs};

pub use cmdr_sdk::{CommandError, ErrorKind, GuestValue, HostValue};
