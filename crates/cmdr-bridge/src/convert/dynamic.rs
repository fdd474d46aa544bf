//! Shape-directed decoding into untyped host values
//!
//! Used when the target type is only known at runtime (the `convert-value`
//! operation). The declared shape decides how every number is read, so no
//! integer-vs-float guessing happens below a concrete shape.

use super::impls::Bytes;
use super::{expect_object, ConvertCx, MAX_SAFE_INTEGER};
use crate::error::{ConversionError, ConvertResult};
use crate::shape::Shape;
use crate::token::ObjectHandle;
use chrono::{DateTime, SecondsFormat, Utc};
use cmdr_sdk::{CommandError, GuestValue, HostValue};
use std::collections::BTreeMap;

/// Integers past the safe range are already exact guest numbers; keep them
/// as floats so the result can cross back.
fn int_to_host(n: i128, cx: &ConvertCx<'_>) -> HostValue {
    if cx.safe_integers() && n.abs() > MAX_SAFE_INTEGER {
        HostValue::Float(n as f64)
    } else {
        HostValue::Int(n as i64)
    }
}

pub(super) fn decode_shape(
    value: &GuestValue,
    shape: &Shape,
    cx: &ConvertCx<'_>,
) -> ConvertResult<HostValue> {
    match shape {
        Shape::Any => cx.decode::<HostValue>(value),
        Shape::Null => cx.decode::<()>(value).map(|()| HostValue::Null),
        Shape::Bool => cx.decode::<bool>(value).map(HostValue::Bool),
        Shape::Int => cx.decode::<i64>(value).map(|n| int_to_host(i128::from(n), cx)),
        Shape::UInt => {
            let n = cx.decode::<u64>(value)?;
            if i64::try_from(n).is_err() {
                return Err(ConversionError::Overflow {
                    value: n as f64,
                    type_name: "int",
                });
            }
            Ok(int_to_host(i128::from(n), cx))
        }
        Shape::Float => cx.decode::<f64>(value).map(HostValue::Float),
        Shape::String => cx.decode::<String>(value).map(HostValue::String),
        Shape::Bytes => cx.decode::<Bytes>(value).map(|b| HostValue::Bytes(b.0)),
        Shape::Timestamp => cx
            .decode::<DateTime<Utc>>(value)
            .map(|ts| HostValue::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))),
        Shape::Handle => {
            let token = cx.decode::<String>(value)?;
            let handle: ObjectHandle = token.parse()?;
            cx.objects().get(handle)?;
            Ok(HostValue::String(handle.to_string()))
        }
        Shape::Error => {
            let err = cx.decode::<CommandError>(value)?;
            let envelope = cx.encode(&err)?;
            cx.decode::<HostValue>(&envelope)
        }
        Shape::Optional(inner) => match value {
            GuestValue::Null => Ok(HostValue::Null),
            value => cx.decode_shape(value, inner),
        },
        Shape::Array(inner) => match value {
            GuestValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| cx.decode_shape(item, inner).map_err(|e| e.at_index(i)))
                .collect::<ConvertResult<Vec<_>>>()
                .map(HostValue::Array),
            GuestValue::Bytes(bytes) => bytes
                .iter()
                .enumerate()
                .map(|(i, byte)| {
                    cx.decode_shape(&GuestValue::Number(f64::from(*byte)), inner)
                        .map_err(|e| e.at_index(i))
                })
                .collect::<ConvertResult<Vec<_>>>()
                .map(HostValue::Array),
            other => Err(ConversionError::mismatch(shape, other.type_name())),
        },
        Shape::Map(inner) => expect_object(value, &shape.to_string())?
            .iter()
            .map(|(key, item)| {
                cx.decode_shape(item, inner)
                    .map(|host| (key.clone(), host))
                    .map_err(|e| e.at_key(key.as_str()))
            })
            .collect::<ConvertResult<BTreeMap<_, _>>>()
            .map(HostValue::Map),
        Shape::Record { name, fields } => {
            let object = expect_object(value, name)?;
            let mut record = BTreeMap::new();
            for (wire, field_shape) in fields {
                let item = object.get(wire).unwrap_or(&GuestValue::Null);
                let host = cx
                    .decode_shape(item, field_shape)
                    .map_err(|e| e.at_field(wire.as_str()))?;
                record.insert(wire.clone(), host);
            }
            Ok(HostValue::Map(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::convert::Converter;
    use crate::error::ConversionError;
    use crate::objects::HandleRegistry;
    use crate::shape::Shape;
    use cmdr_sdk::{GuestValue, HostValue};
    use std::sync::Arc;

    fn converter() -> Converter {
        Converter::new(Arc::new(HandleRegistry::new()), &BridgeConfig::default())
    }

    fn shape(text: &str) -> Shape {
        Shape::parse(text).unwrap()
    }

    #[test]
    fn test_declared_float_is_not_guessed() {
        let conv = converter();
        let four = GuestValue::Number(4.0);
        assert_eq!(conv.decode_shape(&four, &shape("float")).unwrap(), HostValue::Float(4.0));
        assert_eq!(conv.decode_shape(&four, &shape("int")).unwrap(), HostValue::Int(4));
        assert_eq!(conv.decode_shape(&four, &shape("any")).unwrap(), HostValue::Int(4));
    }

    #[test]
    fn test_large_int_survives_encode() {
        let conv = converter();
        let big = GuestValue::Number(1e17);
        let decoded = conv.decode_shape(&big, &shape("int")).unwrap();
        assert_eq!(decoded, HostValue::Float(1e17));
        assert_eq!(conv.encode(&decoded).unwrap(), big);
        assert!(conv.decode_shape(&GuestValue::Number(1.5), &shape("int")).is_err());
    }

    #[test]
    fn test_nested_shapes() {
        let conv = converter();
        let value = GuestValue::object([
            ("a", GuestValue::Array(vec![GuestValue::from("1"), GuestValue::Number(2.0)])),
            ("b", GuestValue::Null),
        ]);
        let decoded = conv.decode_shape(&value, &shape("map<int[]?>")).unwrap();
        assert_eq!(
            decoded.get("a"),
            Some(&HostValue::Array(vec![HostValue::Int(1), HostValue::Int(2)]))
        );
        assert_eq!(decoded.get("b"), Some(&HostValue::Null));
    }

    #[test]
    fn test_mismatch_names_expected_shape() {
        let conv = converter();
        let err = conv
            .decode_shape(&GuestValue::from("x"), &shape("int[]"))
            .unwrap_err();
        assert_eq!(err, ConversionError::mismatch("int[]", "string"));
        assert!(conv.decode_shape(&GuestValue::Null, &shape("int")).is_err());
    }

    #[test]
    fn test_timestamp_shape_normalizes() {
        let conv = converter();
        let decoded = conv
            .decode_shape(&GuestValue::Number(0.0), &shape("timestamp"))
            .unwrap();
        assert_eq!(decoded, HostValue::from("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_handle_shape_requires_live_handle() {
        let conv = converter();
        let h = conv.objects().create(7u8, "u8");
        let token = GuestValue::String(h.to_string());
        assert_eq!(
            conv.decode_shape(&token, &Shape::Handle).unwrap(),
            HostValue::String(h.to_string())
        );
        conv.objects().release(h).unwrap();
        assert!(conv.decode_shape(&token, &Shape::Handle).is_err());
        assert!(conv.decode_shape(&GuestValue::from("weak_1"), &Shape::Handle).is_err());
    }

    #[test]
    fn test_uint_shape_rejects_negative() {
        let conv = converter();
        assert!(matches!(
            conv.decode_shape(&GuestValue::Number(-2.0), &Shape::UInt),
            Err(ConversionError::NegativeUnsigned { .. })
        ));
    }
}
