//! Call wrapper
//!
//! A [`CallWrapper`] turns a typed Rust function into an operation the guest
//! can call with positional [`GuestValue`] arguments. Every invocation
//! produces a [`CallEnvelope`]; decode failures, command errors and panics
//! all come back as `{success: false}` rather than escaping the boundary.
//!
//! Arguments are declared by the function's tuple type. Only optional
//! parameters may be omitted; any other missing argument, including an
//! untyped `GuestValue`, is reported as `bridge.missingArgument`. Extra
//! arguments are ignored.

use crate::codec;
use crate::context::BridgeContext;
use crate::convert::{ConvertCx, Convertible};
use crate::error::{BridgeError, BridgeResult};
use crate::shape::Shape;
use cmdr_sdk::{CommandError, GuestValue};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, debug_span, warn};

/// Envelope `type` used for bridge-internal failures
pub const BRIDGE_FAILURE_TYPE: &str = "Generic";

/// Envelope `code` for a command error that carries none
pub const GENERIC_CODE: &str = "generic";

/// Failure of one call: either the command's own error or a bridge failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// Error returned by command logic
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Failure inside the bridge
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<crate::error::AllocError> for CallError {
    fn from(err: crate::error::AllocError) -> Self {
        CallError::Bridge(err.into())
    }
}

impl From<crate::error::HandleError> for CallError {
    fn from(err: crate::error::HandleError) -> Self {
        CallError::Bridge(err.into())
    }
}

impl From<crate::error::ConversionError> for CallError {
    fn from(err: crate::error::ConversionError) -> Self {
        CallError::Bridge(err.into())
    }
}

/// Error half of a failure envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFailure {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Error kind name
    #[serde(rename = "type")]
    pub kind: String,
    /// Suggested exit code, for command errors that carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Kind-specific fields of command errors
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl From<&CallError> for CallFailure {
    fn from(err: &CallError) -> Self {
        match err {
            CallError::Command(err) => {
                let envelope = codec::serialize(err);
                CallFailure {
                    code: envelope.code.unwrap_or_else(|| GENERIC_CODE.to_string()),
                    message: envelope.message,
                    kind: envelope.kind.as_str().to_string(),
                    exit_code: envelope.exit_code,
                    fields: envelope.fields,
                }
            }
            CallError::Bridge(err) => CallFailure {
                code: err.code().to_string(),
                message: err.to_string(),
                kind: BRIDGE_FAILURE_TYPE.to_string(),
                exit_code: None,
                fields: BTreeMap::new(),
            },
        }
    }
}

/// `{success, data?, error?}` result of every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Whether the call succeeded
    pub success: bool,
    /// Encoded result, on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<GuestValue>,
    /// Failure details, on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallFailure>,
}

impl CallEnvelope {
    /// Success envelope
    pub fn ok(data: GuestValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failure envelope
    pub fn failure(err: &CallError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CallFailure::from(err)),
        }
    }

    /// Failure code, if this is a failure
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }

    /// JSON form
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("success".to_string(), self.success.into());
        if let Some(data) = &self.data {
            object.insert("data".to_string(), data.to_json());
        }
        if let Some(error) = &self.error {
            let mut failure = serde_json::Map::new();
            failure.insert("code".to_string(), error.code.clone().into());
            failure.insert("message".to_string(), error.message.clone().into());
            failure.insert("type".to_string(), error.kind.clone().into());
            if let Some(exit_code) = error.exit_code {
                failure.insert("exitCode".to_string(), exit_code.into());
            }
            if !error.fields.is_empty() {
                let fields = error
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v.as_str())))
                    .collect();
                failure.insert("fields".to_string(), serde_json::Value::Object(fields));
            }
            object.insert("error".to_string(), serde_json::Value::Object(failure));
        }
        serde_json::Value::Object(object)
    }

    /// Guest object form
    pub fn to_guest(&self) -> GuestValue {
        GuestValue::from_json(self.to_json())
    }
}

/// Positional argument list of an operation
pub trait FromArgs: Sized {
    /// Declared shape of each parameter
    fn shapes() -> Vec<Shape>;

    /// Decode the guest arguments
    fn from_args(args: &[GuestValue], cx: &ConvertCx<'_>) -> BridgeResult<Self>;
}

fn decode_arg<T: Convertible>(
    args: &[GuestValue],
    index: usize,
    cx: &ConvertCx<'_>,
) -> BridgeResult<T> {
    match args.get(index) {
        Some(value) => cx
            .decode::<T>(value)
            .map_err(|source| BridgeError::Argument { index, source }),
        None if T::shape().may_be_omitted() => cx
            .decode::<T>(&GuestValue::Null)
            .map_err(|source| BridgeError::Argument { index, source }),
        None => Err(BridgeError::MissingArgument {
            index,
            shape: T::shape().to_string(),
        }),
    }
}

macro_rules! impl_from_args {
    ($(($($ty:ident : $idx:tt),*)),* $(,)?) => {$(
        impl<$($ty: Convertible),*> FromArgs for ($($ty,)*) {
            fn shapes() -> Vec<Shape> {
                vec![$($ty::shape()),*]
            }

            #[allow(unused_variables)]
            fn from_args(args: &[GuestValue], cx: &ConvertCx<'_>) -> BridgeResult<Self> {
                Ok(($(decode_arg::<$ty>(args, $idx, cx)?,)*))
            }
        }
    )*};
}

impl_from_args!(
    (),
    (A: 0),
    (A: 0, B: 1),
    (A: 0, B: 1, C: 2),
    (A: 0, B: 1, C: 2, D: 3),
    (A: 0, B: 1, C: 2, D: 3, E: 4),
    (A: 0, B: 1, C: 2, D: 3, E: 4, F: 5),
);

type Handler =
    Box<dyn Fn(&BridgeContext, &[GuestValue]) -> Result<GuestValue, CallError> + Send + Sync>;

/// A named, typed operation callable by the guest
pub struct CallWrapper {
    name: String,
    params: Vec<Shape>,
    handler: Handler,
}

impl CallWrapper {
    /// Wrap command logic that only needs its arguments
    pub fn new<A, R, F>(name: impl Into<String>, f: F) -> Self
    where
        A: FromArgs + 'static,
        R: Convertible,
        F: Fn(A) -> Result<R, CommandError> + Send + Sync + 'static,
    {
        Self::with_context(name, move |_ctx: &BridgeContext, args: A| f(args))
    }

    /// Wrap an operation that also needs the bridge context
    pub fn with_context<A, R, E, F>(name: impl Into<String>, f: F) -> Self
    where
        A: FromArgs + 'static,
        R: Convertible,
        E: Into<CallError> + 'static,
        F: Fn(&BridgeContext, A) -> Result<R, E> + Send + Sync + 'static,
    {
        let handler: Handler = Box::new(
            move |ctx: &BridgeContext, args: &[GuestValue]| -> Result<GuestValue, CallError> {
                let cx = ctx.converter().cx();
                let parsed = A::from_args(args, &cx)?;
                let result = match f(ctx, parsed) {
                    Ok(result) => result,
                    Err(err) => return Err(err.into()),
                };
                Ok(cx.encode(&result)?)
            },
        );
        Self {
            name: name.into(),
            params: A::shapes(),
            handler,
        }
    }

    /// Operation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter shapes
    pub fn params(&self) -> &[Shape] {
        &self.params
    }

    /// Invoke with guest arguments. Never panics past this call.
    pub fn invoke(&self, ctx: &BridgeContext, args: &[GuestValue]) -> CallEnvelope {
        let span = debug_span!("bridge.invoke", op = %self.name, argc = args.len());
        let _enter = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(ctx, args))) {
            Ok(Ok(data)) => CallEnvelope::ok(data),
            Ok(Err(err)) => {
                match &err {
                    CallError::Bridge(bridge) if bridge.is_fatal() => {
                        warn!(error = %bridge, "resource exhausted")
                    }
                    _ => debug!(error = %err, "call failed"),
                }
                CallEnvelope::failure(&err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(message = %message, "call panicked");
                CallEnvelope::failure(&CallError::Bridge(BridgeError::Panic {
                    op: self.name.clone(),
                    message,
                }))
            }
        }
    }
}

impl fmt::Debug for CallWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallWrapper")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdr_sdk::ErrorKind;

    fn args(values: &[GuestValue]) -> Vec<GuestValue> {
        values.to_vec()
    }

    #[test]
    fn test_success_envelope() {
        let ctx = BridgeContext::default();
        let add = CallWrapper::new("add", |(a, b): (i64, i64)| Ok::<_, CommandError>(a + b));
        let envelope = add.invoke(&ctx, &args(&[GuestValue::Number(2.0), GuestValue::from("3")]));
        assert!(envelope.success);
        assert_eq!(envelope.data, Some(GuestValue::Number(5.0)));
        assert_eq!(add.params(), &[Shape::Int, Shape::Int]);
    }

    #[test]
    fn test_optional_trailing_argument() {
        let ctx = BridgeContext::default();
        let greet = CallWrapper::new("greet", |(name, greeting): (String, Option<String>)| {
            Ok::<_, CommandError>(format!("{}, {}", greeting.unwrap_or_else(|| "hello".into()), name))
        });
        let envelope = greet.invoke(&ctx, &args(&[GuestValue::from("ada")]));
        assert_eq!(envelope.data, Some(GuestValue::from("hello, ada")));
    }

    #[test]
    fn test_missing_required_argument() {
        let ctx = BridgeContext::default();
        let add = CallWrapper::new("add", |(a, b): (i64, i64)| Ok::<_, CommandError>(a + b));
        let envelope = add.invoke(&ctx, &args(&[GuestValue::Number(1.0)]));
        assert!(!envelope.success);
        let error = envelope.error.unwrap();
        assert_eq!(error.code, "bridge.missingArgument");
        assert_eq!(error.kind, "Generic");
        assert!(error.message.contains("argument 1"));
    }

    #[test]
    fn test_untyped_argument_is_required() {
        let ctx = BridgeContext::default();
        let echo = CallWrapper::new("echo", |(value,): (GuestValue,)| Ok::<_, CommandError>(value));
        let error = echo.invoke(&ctx, &[]).error.unwrap();
        assert_eq!(error.code, "bridge.missingArgument");

        let envelope = echo.invoke(&ctx, &args(&[GuestValue::Null]));
        assert_eq!(envelope.data, Some(GuestValue::Null));
    }

    #[test]
    fn test_conversion_failure_names_argument() {
        let ctx = BridgeContext::default();
        let port = CallWrapper::new("port", |(p,): (u16,)| Ok::<_, CommandError>(p));
        let envelope = port.invoke(&ctx, &args(&[GuestValue::Number(-1.0)]));
        assert_eq!(envelope.error_code(), Some("bridge.conversion"));
        assert!(envelope.error.unwrap().message.starts_with("Argument 0:"));
    }

    #[test]
    fn test_command_error_keeps_kind() {
        let ctx = BridgeContext::default();
        let check = CallWrapper::new("check", |(port,): (i64,)| {
            if port < 1024 {
                return Err(CommandError::invalid_option_argument(
                    "port is privileged",
                    "--port",
                    port.to_string(),
                ));
            }
            Ok(port)
        });
        let envelope = check.invoke(&ctx, &args(&[GuestValue::Number(80.0)]));
        let error = envelope.error.unwrap();
        assert_eq!(error.kind, ErrorKind::InvalidOptionArgument.as_str());
        assert_eq!(error.code, "commander.invalidOptionArgument");
        assert_eq!(error.exit_code, Some(1));
        assert_eq!(error.fields.get("option").map(String::as_str), Some("--port"));
        assert_eq!(error.fields.get("value").map(String::as_str), Some("80"));
    }

    #[test]
    fn test_generic_command_error_code() {
        let ctx = BridgeContext::default();
        let fail = CallWrapper::new("fail", |(): ()| Err::<(), _>(CommandError::generic("nope")));
        let error = fail.invoke(&ctx, &[]).error.unwrap();
        assert_eq!(error.code, GENERIC_CODE);
        assert_eq!(error.kind, "Generic");
        assert_eq!(error.message, "nope");
    }

    #[test]
    fn test_panic_becomes_failure() {
        let ctx = BridgeContext::default();
        let boom = CallWrapper::new("boom", |(): ()| -> Result<(), CommandError> {
            panic!("exploded")
        });
        let envelope = boom.invoke(&ctx, &[]);
        assert!(!envelope.success);
        let error = envelope.error.unwrap();
        assert_eq!(error.code, "bridge.panic");
        assert_eq!(error.message, "Panic in boom: exploded");
    }

    #[test]
    fn test_envelope_json_shape() {
        let ok = CallEnvelope::ok(GuestValue::Null);
        assert_eq!(ok.to_json(), serde_json::json!({"success": true, "data": null}));

        let failure = CallEnvelope::failure(&CallError::Bridge(BridgeError::UnknownOperation(
            "nope".into(),
        )));
        assert_eq!(
            failure.to_json(),
            serde_json::json!({
                "success": false,
                "error": {
                    "code": "bridge.unknownOperation",
                    "message": "Unknown operation: nope",
                    "type": "Generic"
                }
            })
        );
        assert_eq!(serde_json::to_value(&failure).unwrap(), failure.to_json());
    }
}
