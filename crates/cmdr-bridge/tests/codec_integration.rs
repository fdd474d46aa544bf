//! Integration tests for the error codec
//!
//! Every kind must survive serialize -> guest object -> deserialize with its
//! kind, message and kind-specific fields intact.

use cmdr_bridge::codec::{self, field};
use cmdr_bridge::{Bridge, CommandError, Converter, ErrorEnvelope, ErrorKind, GuestValue};

fn every_kind() -> Vec<CommandError> {
    vec![
        CommandError::commander("deploy failed", "deploy.failed", 3).with_command("deploy"),
        CommandError::commander("no command", "commander.error", 1),
        CommandError::invalid_argument("bad target", "target", "mars"),
        CommandError::invalid_option_argument("port out of range", "--port", "99999"),
        CommandError::validation("name is required", "name"),
        CommandError::parse("bad flag", "", "--nope", "", 2),
        CommandError::generic("something broke"),
    ]
}

#[test]
fn test_every_kind_roundtrips_through_guest_value() {
    for err in every_kind() {
        let guest = codec::serialize(&err).to_guest();
        let envelope = ErrorEnvelope::from_guest(&guest).unwrap();
        let back = codec::deserialize(&envelope);
        assert_eq!(back, err, "roundtrip changed {:?}", err.kind());
    }
}

#[test]
fn test_every_kind_roundtrips_through_json() {
    for err in every_kind() {
        let json = serde_json::to_string(&codec::serialize(&err)).unwrap();
        let envelope: ErrorEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(codec::deserialize(&envelope), err);
    }
}

#[test]
fn test_parse_error_fields() {
    let err = CommandError::parse("bad flag", "", "--nope", "", 2);
    let envelope = codec::serialize(&err);
    assert_eq!(envelope.kind, ErrorKind::Parse);
    assert_eq!(envelope.field(field::OPTION), Some("--nope"));
    assert_eq!(envelope.field(field::POSITION), Some("2"));

    match codec::deserialize(&envelope) {
        CommandError::Parse {
            option, position, ..
        } => {
            assert_eq!(option, "--nope");
            assert_eq!(position, 2);
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_envelope_json_shape() {
    let err = CommandError::invalid_option_argument("port out of range", "--port", "99999");
    let json = serde_json::to_value(codec::serialize(&err)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "kind": "InvalidOptionArgument",
            "message": "port out of range",
            "code": "commander.invalidOptionArgument",
            "exitCode": 1,
            "fields": {"option": "--port", "value": "99999"},
        })
    );

    let generic = serde_json::to_value(codec::serialize(&CommandError::generic("oops"))).unwrap();
    assert_eq!(generic, serde_json::json!({"kind": "Generic", "message": "oops"}));
}

#[test]
fn test_unknown_kind_degrades_to_generic() {
    let guest = GuestValue::from_json(serde_json::json!({
        "kind": "Meltdown",
        "message": "core breach",
        "code": "x.y",
    }));
    let err = codec::deserialize(&ErrorEnvelope::from_guest(&guest).unwrap());
    assert_eq!(err, CommandError::generic("core breach"));
}

#[test]
fn test_malformed_position_reads_as_zero() {
    let mut envelope = codec::serialize(&CommandError::parse("bad", "file", "", "x", 4));
    envelope
        .fields
        .insert(field::POSITION.to_string(), "fourth".to_string());
    match codec::deserialize(&envelope) {
        CommandError::Parse { position, .. } => assert_eq!(position, 0),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn test_missing_code_uses_kind_default() {
    let guest = GuestValue::from_json(serde_json::json!({
        "kind": "Validation",
        "message": "empty",
        "fields": {"field": "name"},
    }));
    let err = codec::deserialize(&ErrorEnvelope::from_guest(&guest).unwrap());
    assert_eq!(err, CommandError::validation("empty", "name"));
}

#[test]
fn test_error_converts_through_builtin_rule() {
    let bridge = Bridge::default();
    let converter: &Converter = bridge.context().converter();
    let err = CommandError::invalid_argument("bad target", "target", "mars");

    let guest = converter.encode(&err).unwrap();
    assert_eq!(guest.get("kind"), Some(&GuestValue::from("InvalidArgument")));
    assert_eq!(converter.decode_as::<CommandError>(&guest).unwrap(), err);
    assert_eq!(
        converter
            .decode_as::<CommandError>(&GuestValue::from("plain message"))
            .unwrap(),
        CommandError::generic("plain message")
    );
}

#[test]
fn test_serialize_error_export() {
    let bridge = Bridge::default();
    let guest = codec::serialize(&CommandError::parse("bad flag", "", "--nope", "", 2)).to_guest();

    let envelope = bridge.call("serialize-error", &[guest.clone()]);
    assert!(envelope.success);
    assert_eq!(envelope.data, Some(guest));

    let envelope = bridge.call("serialize-error", &[GuestValue::from("just text")]);
    let data = envelope.data.unwrap();
    assert_eq!(data.get("kind"), Some(&GuestValue::from("Generic")));
    assert_eq!(data.get("message"), Some(&GuestValue::from("just text")));
}
