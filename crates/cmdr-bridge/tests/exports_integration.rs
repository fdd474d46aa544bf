//! End-to-end tests of the exported operation surface
//!
//! Every call, successful or not, must come back as a
//! `{success, data | error}` envelope.

use cmdr_bridge::{Bridge, BridgeConfig, CallWrapper, CommandError, GuestValue};
use serde_json::{json, Value};

fn call(bridge: &Bridge, op: &str, args: Value) -> Value {
    let text = bridge.call_json(op, &args.to_string());
    serde_json::from_str(&text).unwrap()
}

fn serve_bridge() -> Bridge {
    let bridge = Bridge::default();
    bridge.register(
        "serve",
        |(port, host): (u16, Option<String>)| -> Result<String, CommandError> {
            if port < 1024 {
                return Err(CommandError::invalid_option_argument(
                    "port must be at least 1024",
                    "--port",
                    port.to_string(),
                ));
            }
            Ok(format!("{}:{}", host.unwrap_or_else(|| "localhost".to_string()), port))
        },
    );
    bridge
}

// ============================================================================
// Registered command logic
// ============================================================================

#[test]
fn test_registered_command_success() {
    let bridge = serve_bridge();
    assert_eq!(
        call(&bridge, "serve", json!([8080])),
        json!({"success": true, "data": "localhost:8080"})
    );
    assert_eq!(
        call(&bridge, "serve", json!(["9000", "0.0.0.0"])),
        json!({"success": true, "data": "0.0.0.0:9000"})
    );
}

#[test]
fn test_command_error_keeps_kind_and_fields() {
    let bridge = serve_bridge();
    assert_eq!(
        call(&bridge, "serve", json!([80])),
        json!({
            "success": false,
            "error": {
                "code": "commander.invalidOptionArgument",
                "message": "port must be at least 1024",
                "type": "InvalidOptionArgument",
                "exitCode": 1,
                "fields": {"option": "--port", "value": "80"},
            }
        })
    );
}

#[test]
fn test_missing_argument() {
    let bridge = serve_bridge();
    let envelope = call(&bridge, "serve", json!([]));
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["code"], "bridge.missingArgument");
    assert_eq!(envelope["error"]["type"], "Generic");
}

#[test]
fn test_bad_argument_is_conversion_failure() {
    let bridge = serve_bridge();
    let envelope = call(&bridge, "serve", json!(["eighty"]));
    assert_eq!(envelope["error"]["code"], "bridge.conversion");
    let message = envelope["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Argument 0"), "{}", message);
}

#[test]
fn test_panic_becomes_failure() {
    let bridge = Bridge::default();
    bridge.register("explode", |(): ()| -> Result<(), CommandError> {
        panic!("kaboom");
    });

    let envelope = bridge.call("explode", &[]);
    assert!(!envelope.success);
    assert_eq!(envelope.error_code(), Some("bridge.panic"));
    assert_eq!(envelope.error.unwrap().message, "Panic in explode: kaboom");

    // The bridge stays usable after a caught panic.
    assert!(bridge.call("list-operations", &[]).success);
}

#[test]
fn test_context_wrapper_registration() {
    let bridge = Bridge::default();
    bridge.register_wrapper(CallWrapper::with_context(
        "live-objects",
        |ctx, (): ()| -> Result<usize, CommandError> { Ok(ctx.objects().len()) },
    ));

    call(&bridge, "create-object-ref", json!([{"a": 1}]));
    assert_eq!(call(&bridge, "live-objects", json!([]))["data"], 1);
}

// ============================================================================
// Envelope contract
// ============================================================================

#[test]
fn test_unknown_operation() {
    let bridge = Bridge::default();
    let envelope = call(&bridge, "no-such-op", json!([]));
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["code"], "bridge.unknownOperation");
}

#[test]
fn test_malformed_json() {
    let bridge = Bridge::default();
    let envelope: Value = serde_json::from_str(&bridge.call_json("cleanup", "[1, ")).unwrap();
    assert_eq!(envelope["error"]["code"], "bridge.malformedPayload");

    let envelope: Value =
        serde_json::from_str(&bridge.call_json("cleanup", r#"{"a": 1}"#)).unwrap();
    assert_eq!(envelope["error"]["code"], "bridge.malformedPayload");

    let envelope: Value = serde_json::from_str(&bridge.call_json("cleanup", "")).unwrap();
    assert_eq!(envelope["success"], true);
}

#[test]
fn test_exhaustion_is_reported() {
    let bridge = Bridge::new(BridgeConfig::with_memory_limit(4));
    let envelope = call(&bridge, "allocate-string", json!(["too long"]));
    assert_eq!(envelope["error"]["code"], "bridge.exhausted");
    assert_eq!(envelope["error"]["type"], "Generic");
}

// ============================================================================
// Builtin operations
// ============================================================================

#[test]
fn test_builtins_are_listed() {
    let bridge = Bridge::default();
    let names = call(&bridge, "list-operations", json!([]));
    let names: Vec<&str> = names["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    for op in [
        "allocate-string",
        "allocate-bytes",
        "free",
        "read-string",
        "read-bytes",
        "intern-string",
        "clear-pool",
        "create-object-ref",
        "retain-object-ref",
        "release-object-ref",
        "get-object-ref",
        "create-weak-ref",
        "get-weak-ref",
        "remove-weak-ref",
        "get-memory-stats",
        "cleanup",
        "convert-value",
        "serialize-error",
        "list-operations",
    ] {
        assert!(names.contains(&op), "missing {}", op);
    }
}

#[test]
fn test_intern_through_exports() {
    let bridge = Bridge::default();
    let first = call(&bridge, "intern-string", json!(["verbose"]))["data"].clone();
    let second = call(&bridge, "intern-string", json!(["verbose"]))["data"].clone();
    assert_eq!(first, second);

    assert_eq!(call(&bridge, "clear-pool", json!([]))["data"], 1);
    let third = call(&bridge, "intern-string", json!(["verbose"]))["data"].clone();
    assert_ne!(first, third);
}

#[test]
fn test_bytes_through_exports() {
    let bridge = Bridge::default();
    let handle = call(&bridge, "allocate-bytes", json!([[1, 2, 255]]))["data"].clone();
    assert_eq!(
        call(&bridge, "read-bytes", json!([handle.clone()]))["data"],
        json!([1, 2, 255])
    );
    assert_eq!(
        call(&bridge, "read-bytes", json!([handle, 2]))["data"],
        json!([1, 2])
    );

    let bad = call(&bridge, "allocate-bytes", json!([[1, 256]]));
    assert_eq!(bad["error"]["code"], "bridge.conversion");
}

#[test]
fn test_memory_stats_through_exports() {
    let bridge = Bridge::default();
    call(&bridge, "allocate-string", json!(["hello"]));
    call(&bridge, "create-object-ref", json!(["x"]));
    call(&bridge, "cleanup", json!([]));

    let stats = call(&bridge, "get-memory-stats", json!([]))["data"].clone();
    assert_eq!(stats["totalAllocations"], 1);
    assert_eq!(stats["totalAllocatedBytes"], 5);
    assert_eq!(stats["objectReferences"], 1);
    assert_eq!(stats["allocationsByType"]["string"], 1);
    assert_eq!(stats["hostMemory"]["allocated"], 5);
    assert_eq!(stats["hostMemory"]["gcCycles"], 1);
}

#[test]
fn test_convert_value_untyped() {
    let bridge = Bridge::default();
    let value = json!({"a": 1, "b": [1, 2, 3]});
    assert_eq!(call(&bridge, "convert-value", json!([value.clone()]))["data"], value);

    let envelope = bridge.call(
        "convert-value",
        &[GuestValue::Number(1_700_000_000_123.0), GuestValue::from("timestamp")],
    );
    assert_eq!(envelope.data, Some(GuestValue::from("2023-11-14T22:13:20.123Z")));
}

#[test]
fn test_convert_value_large_integral_numbers() {
    let bridge = Bridge::default();
    for n in [9_007_199_254_740_992.0, 1e17, -1e17, 1e20] {
        let envelope = bridge.call("convert-value", &[GuestValue::Number(n)]);
        assert!(envelope.success, "{} failed: {:?}", n, envelope.error);
        assert_eq!(envelope.data, Some(GuestValue::Number(n)));

        let envelope = bridge.call("convert-value", &[GuestValue::Number(n), GuestValue::from("int")]);
        assert_eq!(envelope.data, Some(GuestValue::Number(n)), "{} as int", n);
    }
    assert_eq!(
        bridge.call("convert-value", &[GuestValue::Number(42.0)]).data,
        Some(GuestValue::Number(42.0))
    );
}

#[test]
fn test_untyped_operations_require_their_argument() {
    let bridge = Bridge::default();
    for op in ["create-object-ref", "convert-value", "serialize-error"] {
        let envelope = call(&bridge, op, json!([]));
        assert_eq!(envelope["success"], false, "{}", op);
        assert_eq!(envelope["error"]["code"], "bridge.missingArgument", "{}", op);
    }

    let stats = call(&bridge, "get-memory-stats", json!([]))["data"].clone();
    assert_eq!(stats["objectReferences"], 0);

    // An explicit null is still a value.
    assert_eq!(
        call(&bridge, "convert-value", json!([null])),
        json!({"success": true, "data": null})
    );
}
