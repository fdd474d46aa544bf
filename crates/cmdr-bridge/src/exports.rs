//! Exported operations
//!
//! [`Bridge`] is the guest-facing surface: a table of named operations over
//! one shared [`BridgeContext`]. It comes with the builtin memory, handle
//! and conversion operations; command logic adds its own with
//! [`Bridge::register`].
//!
//! | operation | arguments | result |
//! |---|---|---|
//! | `allocate-string` | text | allocation handle |
//! | `allocate-bytes` | bytes | allocation handle |
//! | `free` | allocation handle | null |
//! | `read-string` | allocation handle, length? | string |
//! | `read-bytes` | allocation handle, length? | bytes |
//! | `intern-string` | text | allocation handle |
//! | `clear-pool` | | allocations freed |
//! | `create-object-ref` | value, typeTag? | `ref_<n>` |
//! | `retain-object-ref` | `ref_<n>` | new ref count |
//! | `release-object-ref` | `ref_<n>` | remaining ref count |
//! | `get-object-ref` | `ref_<n>` | `{value, refCount, typeTag}` |
//! | `create-weak-ref` | `ref_<n>` | `weak_<n>` |
//! | `get-weak-ref` | `weak_<n>` | `{alive, value}` |
//! | `remove-weak-ref` | `weak_<n>` | whether an entry was removed |
//! | `get-memory-stats` | | statistics snapshot |
//! | `cleanup` | | entries reclaimed |
//! | `convert-value` | value, shape? | normalized value |
//! | `serialize-error` | envelope or message | error envelope |
//! | `list-operations` | | operation names |

use crate::codec::ErrorEnvelope;
use crate::config::BridgeConfig;
use crate::context::{BridgeContext, MemoryStats};
use crate::convert::{decode_command_error, Bytes, Convertible};
use crate::error::{BridgeError, BridgeResult};
use crate::objects::HostObject;
use crate::shape::Shape;
use crate::token::{AllocHandle, ObjectHandle, WeakHandle};
use crate::wrapper::{CallEnvelope, CallError, CallWrapper};
use cmdr_sdk::{CommandError, GuestValue, HostValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

type OpTable = RwLock<HashMap<String, Arc<CallWrapper>>>;

/// Guest-facing operation table over a shared context
pub struct Bridge {
    ctx: Arc<BridgeContext>,
    ops: Arc<OpTable>,
}

impl Bridge {
    /// Build a bridge with a fresh context
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_context(Arc::new(BridgeContext::new(config)))
    }

    /// Build a bridge over an existing context
    pub fn with_context(ctx: Arc<BridgeContext>) -> Self {
        let bridge = Self {
            ctx,
            ops: Arc::new(RwLock::new(HashMap::new())),
        };
        bridge.register_builtins();
        bridge
    }

    /// Shared context
    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    /// Register command logic under `name`, replacing any operation of
    /// that name. Returns the replaced operation.
    pub fn register<A, R, F>(&self, name: &str, f: F) -> Option<Arc<CallWrapper>>
    where
        A: crate::wrapper::FromArgs + 'static,
        R: Convertible,
        F: Fn(A) -> Result<R, CommandError> + Send + Sync + 'static,
    {
        self.register_wrapper(CallWrapper::new(name, f))
    }

    /// Register a prepared wrapper
    pub fn register_wrapper(&self, wrapper: CallWrapper) -> Option<Arc<CallWrapper>> {
        debug!(op = wrapper.name(), params = wrapper.params().len(), "operation registered");
        self.ops
            .write()
            .insert(wrapper.name().to_string(), Arc::new(wrapper))
    }

    /// Look up an operation
    pub fn operation(&self, name: &str) -> Option<Arc<CallWrapper>> {
        self.ops.read().get(name).cloned()
    }

    /// Registered operation names, sorted
    pub fn operations(&self) -> Vec<String> {
        operation_names(&self.ops)
    }

    /// Call an operation with guest arguments
    pub fn call(&self, op: &str, args: &[GuestValue]) -> CallEnvelope {
        // The table lock is released before the operation runs.
        match self.operation(op) {
            Some(wrapper) => wrapper.invoke(&self.ctx, args),
            None => {
                debug!(op, "unknown operation");
                CallEnvelope::failure(&CallError::Bridge(BridgeError::UnknownOperation(
                    op.to_string(),
                )))
            }
        }
    }

    /// Call an operation with a JSON array of arguments, returning the
    /// envelope as JSON text. Empty input means no arguments.
    pub fn call_json(&self, op: &str, json_args: &str) -> String {
        let envelope = match parse_json_args(json_args) {
            Ok(args) => self.call(op, &args),
            Err(err) => {
                debug!(op, error = %err, "malformed call payload");
                CallEnvelope::failure(&CallError::Bridge(err))
            }
        };
        envelope.to_json().to_string()
    }

    fn register_builtins(&self) {
        for wrapper in builtin_operations(Arc::downgrade(&self.ops)) {
            self.register_wrapper(wrapper);
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

fn operation_names(ops: &OpTable) -> Vec<String> {
    let mut names: Vec<String> = ops.read().keys().cloned().collect();
    names.sort();
    names
}

fn parse_json_args(text: &str) -> BridgeResult<Vec<GuestValue>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
    match json {
        serde_json::Value::Array(items) => Ok(items.into_iter().map(GuestValue::from_json).collect()),
        serde_json::Value::Null => Ok(Vec::new()),
        other => Err(BridgeError::MalformedPayload(format!(
            "expected an array of arguments, got {}",
            GuestValue::from_json(other).type_name()
        ))),
    }
}

fn alloc_handle(token: &str) -> BridgeResult<AllocHandle> {
    Ok(token.parse()?)
}

fn object_handle(token: &str) -> BridgeResult<ObjectHandle> {
    Ok(token.parse()?)
}

fn weak_handle(token: &str) -> BridgeResult<WeakHandle> {
    Ok(token.parse()?)
}

fn read_payload(ctx: &BridgeContext, token: &str, length: Option<usize>) -> BridgeResult<Vec<u8>> {
    let handle = alloc_handle(token)?;
    let bytes = match length {
        Some(length) => ctx.tracker().read(handle, length)?,
        None => ctx.tracker().read_all(handle)?,
    };
    Ok(bytes)
}

/// Stored value of an object entry as a guest value, or null if the entry
/// holds a host-native value
fn guest_view(value: &HostObject) -> GuestValue {
    value
        .downcast_ref::<GuestValue>()
        .cloned()
        .unwrap_or(GuestValue::Null)
}

fn builtin_operations(ops: Weak<OpTable>) -> Vec<CallWrapper> {
    vec![
        CallWrapper::with_context("allocate-string", |ctx, (text,): (String,)| {
            ctx.tracker()
                .track_string(&text)
                .map(|handle| handle.to_string())
        }),
        CallWrapper::with_context("allocate-bytes", |ctx, (bytes,): (Bytes,)| {
            ctx.tracker()
                .track_bytes(&bytes)
                .map(|handle| handle.to_string())
        }),
        CallWrapper::with_context("free", |ctx, (token,): (String,)| -> BridgeResult<()> {
            ctx.free_allocation(alloc_handle(&token)?)?;
            Ok(())
        }),
        CallWrapper::with_context(
            "read-string",
            |ctx, (token, length): (String, Option<usize>)| -> BridgeResult<String> {
                let handle = alloc_handle(&token)?;
                let length = match length {
                    Some(length) => length,
                    None if handle.is_null() => 0,
                    None => ctx.tracker().get(handle)?.size,
                };
                Ok(ctx.tracker().read_string(handle, length)?)
            },
        ),
        CallWrapper::with_context(
            "read-bytes",
            |ctx, (token, length): (String, Option<usize>)| {
                read_payload(ctx, &token, length).map(Bytes)
            },
        ),
        CallWrapper::with_context("intern-string", |ctx, (text,): (String,)| {
            ctx.pool().intern(&text).map(|handle| handle.to_string())
        }),
        CallWrapper::with_context("clear-pool", |ctx, (): ()| {
            Ok::<_, BridgeError>(ctx.pool().clear())
        }),
        CallWrapper::with_context(
            "create-object-ref",
            |ctx, (value, type_tag): (GuestValue, Option<String>)| {
                let type_tag = type_tag.unwrap_or_else(|| value.type_name().to_string());
                Ok::<_, BridgeError>(ctx.objects().create(value, type_tag).to_string())
            },
        ),
        CallWrapper::with_context("retain-object-ref", |ctx, (token,): (String,)| {
            Ok::<_, BridgeError>(ctx.objects().retain(object_handle(&token)?)?)
        }),
        CallWrapper::with_context("release-object-ref", |ctx, (token,): (String,)| {
            Ok::<_, BridgeError>(ctx.objects().release(object_handle(&token)?)?)
        }),
        CallWrapper::with_context(
            "get-object-ref",
            |ctx, (token,): (String,)| -> BridgeResult<GuestValue> {
                let entry = ctx.objects().get(object_handle(&token)?)?;
                let cx = ctx.converter().cx();
                Ok(GuestValue::object([
                    ("value", guest_view(&entry.value)),
                    ("refCount", cx.encode(&entry.ref_count)?),
                    ("typeTag", GuestValue::String(entry.type_tag)),
                ]))
            },
        ),
        CallWrapper::with_context(
            "create-weak-ref",
            |ctx, (token,): (String,)| -> BridgeResult<String> {
                let entry = ctx.objects().get(object_handle(&token)?)?;
                Ok(ctx.weak().create_weak(&entry.value, None).to_string())
            },
        ),
        CallWrapper::with_context(
            "get-weak-ref",
            |ctx, (token,): (String,)| -> BridgeResult<GuestValue> {
                let target = ctx.weak().get(weak_handle(&token)?);
                Ok(GuestValue::object([
                    ("alive", GuestValue::Bool(target.is_some())),
                    ("value", target.as_ref().map(guest_view).unwrap_or_default()),
                ]))
            },
        ),
        CallWrapper::with_context("remove-weak-ref", |ctx, (token,): (String,)| {
            Ok::<_, BridgeError>(ctx.weak().remove(weak_handle(&token)?))
        }),
        CallWrapper::with_context("get-memory-stats", |ctx, (): ()| {
            Ok::<MemoryStats, BridgeError>(ctx.memory_stats())
        }),
        CallWrapper::with_context("cleanup", |ctx, (): ()| {
            Ok::<_, BridgeError>(ctx.cleanup().total())
        }),
        CallWrapper::with_context(
            "convert-value",
            |ctx, (value, shape): (GuestValue, Option<String>)| -> BridgeResult<HostValue> {
                let shape = match shape {
                    Some(text) => Shape::parse(&text)?,
                    None => Shape::Any,
                };
                Ok(ctx.converter().decode_shape(&value, &shape)?)
            },
        ),
        CallWrapper::with_context(
            "serialize-error",
            |_ctx, (error,): (GuestValue,)| -> BridgeResult<GuestValue> {
                let err = decode_command_error(&error)?;
                Ok(ErrorEnvelope::from(&err).to_guest())
            },
        ),
        CallWrapper::with_context("list-operations", move |_ctx, (): ()| {
            let names = ops
                .upgrade()
                .map(|table| operation_names(&table))
                .unwrap_or_default();
            Ok::<_, BridgeError>(names)
        }),
    ]
}
