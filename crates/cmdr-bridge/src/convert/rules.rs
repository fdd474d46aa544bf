//! Rule-backed types
//!
//! Timestamps and command errors have a bespoke wire form, so their
//! `Convertible` impls refuse to convert on their own and the work is done
//! by rules installed at converter construction. Replacing a rule changes
//! the wire form for every nested occurrence too.

use super::{ConvertCx, Converter, Convertible};
use crate::codec::ErrorEnvelope;
use crate::error::{ConversionError, ConvertResult};
use crate::shape::Shape;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use cmdr_sdk::{CommandError, GuestValue};
use std::any::type_name;

impl Convertible for DateTime<Utc> {
    fn shape() -> Shape {
        Shape::Timestamp
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Err(ConversionError::unsupported(type_name::<Self>()))
    }

    fn decode(_value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        Err(ConversionError::unsupported(type_name::<Self>()))
    }
}

impl Convertible for CommandError {
    fn shape() -> Shape {
        Shape::Error
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Err(ConversionError::unsupported(type_name::<Self>()))
    }

    fn decode(_value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        Err(ConversionError::unsupported(type_name::<Self>()))
    }
}

pub(super) fn install_builtin(converter: &Converter) {
    converter.register_rule::<DateTime<Utc>, _, _>(
        |ts, _| Ok(encode_timestamp(ts)),
        |value, _| decode_timestamp(value),
    );
    converter.register_rule::<CommandError, _, _>(
        |err, _| Ok(ErrorEnvelope::from(err).to_guest()),
        |value, _| decode_command_error(value),
    );
}

/// RFC 3339 with millisecond precision, `Z` suffix
pub fn encode_timestamp(ts: &DateTime<Utc>) -> GuestValue {
    GuestValue::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Accepts an RFC 3339 string or a whole number of epoch milliseconds
pub fn decode_timestamp(value: &GuestValue) -> ConvertResult<DateTime<Utc>> {
    match value {
        GuestValue::String(text) => DateTime::parse_from_rfc3339(text.trim())
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| ConversionError::InvalidLiteral {
                expected: "timestamp",
                text: text.clone(),
            }),
        GuestValue::Number(ms) => {
            let ms = *ms;
            if !ms.is_finite() || ms.fract() != 0.0 {
                return Err(ConversionError::NotAnInteger { value: ms });
            }
            Utc.timestamp_millis_opt(ms as i64)
                .single()
                .ok_or(ConversionError::Overflow {
                    value: ms,
                    type_name: "timestamp",
                })
        }
        other => Err(ConversionError::mismatch(Shape::Timestamp, other.type_name())),
    }
}

/// Accepts an error envelope object, or a bare message as a generic error
pub fn decode_command_error(value: &GuestValue) -> ConvertResult<CommandError> {
    match value {
        GuestValue::String(message) => Ok(CommandError::generic(message.clone())),
        value => ErrorEnvelope::from_guest(value).map(CommandError::from),
    }
}
