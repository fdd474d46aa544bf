//! Cmdr SDK - value and error types shared with command logic
//!
//! This crate holds the minimal types command implementations need in order
//! to talk to the bridge without depending on its registries:
//!
//! - [`GuestValue`]: the dynamically-typed value the guest runtime passes
//!   across the boundary (primitives, binary views, arrays, objects)
//! - [`HostValue`]: an untyped host-side value, produced when the bridge
//!   decodes without a declared target shape
//! - [`CommandError`] / [`ErrorKind`]: the closed taxonomy of command errors
//!   the bridge can report to the guest without losing type identity
//!
//! # Example
//!
//! ```ignore
//! use cmdr_sdk::{CommandError, GuestValue};
//!
//! fn check_port(port: i64) -> Result<i64, CommandError> {
//!     if port <= 0 {
//!         return Err(CommandError::invalid_argument(
//!             "port must be positive",
//!             "port",
//!             port.to_string(),
//!         ));
//!     }
//!     Ok(port)
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod host;
pub mod value;

pub use error::{CommandError, ErrorKind};
pub use host::HostValue;
pub use value::GuestValue;
