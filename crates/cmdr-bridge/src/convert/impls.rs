//! Structural conversions for std types

use super::{expect_object, ConvertCx, Convertible, MAX_SAFE_INTEGER};
use crate::error::{ConversionError, ConvertResult};
use crate::objects::HostObject;
use crate::shape::Shape;
use crate::token::ObjectHandle;
use cmdr_sdk::{GuestValue, HostValue};
use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// Primitives
// ============================================================================

fn encode_integer(value: i128, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
    if cx.safe_integers() && value.abs() > MAX_SAFE_INTEGER {
        return Err(ConversionError::Overflow {
            value: value as f64,
            type_name: "guest number",
        });
    }
    Ok(GuestValue::Number(value as f64))
}

/// Decode an integer within `[min, max]`. Strings parse as base-10.
fn decode_integer(
    value: &GuestValue,
    type_name: &'static str,
    min: i128,
    max: i128,
) -> ConvertResult<i128> {
    let n = match value {
        GuestValue::Number(n) => {
            let n = *n;
            if !n.is_finite() || n.fract() != 0.0 {
                return Err(ConversionError::NotAnInteger { value: n });
            }
            if n < 0.0 && min == 0 {
                return Err(ConversionError::NegativeUnsigned { value: n, type_name });
            }
            // Saturates, so out-of-range magnitudes still fail the range check.
            n as i128
        }
        GuestValue::String(text) => {
            let n = text
                .trim()
                .parse::<i128>()
                .map_err(|_| ConversionError::InvalidLiteral {
                    expected: "int",
                    text: text.clone(),
                })?;
            if n < 0 && min == 0 {
                return Err(ConversionError::NegativeUnsigned {
                    value: n as f64,
                    type_name,
                });
            }
            n
        }
        other => return Err(ConversionError::mismatch(type_name, other.type_name())),
    };
    if n < min || n > max {
        return Err(ConversionError::Overflow {
            value: n as f64,
            type_name,
        });
    }
    Ok(n)
}

macro_rules! convertible_int {
    ($($ty:ty => $shape:ident),* $(,)?) => {$(
        impl Convertible for $ty {
            fn shape() -> Shape {
                Shape::$shape
            }

            fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
                encode_integer(*self as i128, cx)
            }

            fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
                let n = decode_integer(value, stringify!($ty), <$ty>::MIN as i128, <$ty>::MAX as i128)?;
                Ok(n as $ty)
            }
        }
    )*};
}

convertible_int!(
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    isize => Int,
    u8 => UInt,
    u16 => UInt,
    u32 => UInt,
    u64 => UInt,
    usize => UInt,
);

impl Convertible for f64 {
    fn shape() -> Shape {
        Shape::Float
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::Number(*self))
    }

    fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Number(n) => Ok(*n),
            GuestValue::String(text) => {
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| ConversionError::InvalidLiteral {
                        expected: "float",
                        text: text.clone(),
                    })
            }
            other => Err(ConversionError::mismatch(Shape::Float, other.type_name())),
        }
    }
}

impl Convertible for f32 {
    fn shape() -> Shape {
        Shape::Float
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::Number(f64::from(*self)))
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        let n = f64::decode(value, cx)?;
        if n.is_finite() && n.abs() > f64::from(f32::MAX) {
            return Err(ConversionError::Overflow {
                value: n,
                type_name: "f32",
            });
        }
        Ok(n as f32)
    }
}

/// Parse a boolean literal (case-insensitive `true/false/1/0/yes/no/on/off`)
pub(crate) fn parse_bool(text: &str) -> ConvertResult<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConversionError::InvalidLiteral {
            expected: "bool",
            text: text.to_string(),
        }),
    }
}

impl Convertible for bool {
    fn shape() -> Shape {
        Shape::Bool
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::Bool(*self))
    }

    fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Bool(b) => Ok(*b),
            GuestValue::String(text) => parse_bool(text),
            other => Err(ConversionError::mismatch(Shape::Bool, other.type_name())),
        }
    }
}

impl Convertible for String {
    fn shape() -> Shape {
        Shape::String
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::String(self.clone()))
    }

    fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::String(text) => Ok(text.clone()),
            GuestValue::Number(n) => Ok(n.to_string()),
            GuestValue::Bool(b) => Ok(b.to_string()),
            other => Err(ConversionError::mismatch(Shape::String, other.type_name())),
        }
    }
}

impl Convertible for () {
    fn shape() -> Shape {
        Shape::Null
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::Null)
    }

    fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Null => Ok(()),
            other => Err(ConversionError::mismatch(Shape::Null, other.type_name())),
        }
    }
}

// ============================================================================
// Byte buffers
// ============================================================================

/// Byte buffer that crosses as a guest binary view.
///
/// `Vec<u8>` crosses as an array of numbers; wrap it in `Bytes` to get the
/// binary view instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Unwrap the buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl From<&[u8]> for Bytes {
    fn from(bytes: &[u8]) -> Self {
        Bytes(bytes.to_vec())
    }
}

impl Convertible for Bytes {
    fn shape() -> Shape {
        Shape::Bytes
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(GuestValue::Bytes(self.0.clone()))
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Bytes(bytes) => Ok(Bytes(bytes.clone())),
            GuestValue::String(text) => Ok(Bytes(text.as_bytes().to_vec())),
            GuestValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| cx.decode::<u8>(item).map_err(|e| e.at_index(i)))
                .collect::<ConvertResult<Vec<u8>>>()
                .map(Bytes),
            other => Err(ConversionError::mismatch(Shape::Bytes, other.type_name())),
        }
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: Convertible> Convertible for Vec<T> {
    fn shape() -> Shape {
        T::shape().array()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        self.iter()
            .enumerate()
            .map(|(i, item)| cx.encode(item).map_err(|e| e.at_index(i)))
            .collect::<ConvertResult<Vec<_>>>()
            .map(GuestValue::Array)
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| cx.decode::<T>(item).map_err(|e| e.at_index(i)))
                .collect(),
            // A binary view is a sequence of small numbers.
            GuestValue::Bytes(bytes) => bytes
                .iter()
                .enumerate()
                .map(|(i, byte)| {
                    cx.decode::<T>(&GuestValue::Number(f64::from(*byte)))
                        .map_err(|e| e.at_index(i))
                })
                .collect(),
            other => Err(ConversionError::mismatch(Self::shape(), other.type_name())),
        }
    }
}

impl<T: Convertible> Convertible for Option<T> {
    fn shape() -> Shape {
        T::shape().optional()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        match self {
            Some(value) => cx.encode(value),
            None => Ok(GuestValue::Null),
        }
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Null => Ok(None),
            value => cx.decode(value).map(Some),
        }
    }
}

impl<T: Convertible> Convertible for Box<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        cx.encode(&**self)
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        cx.decode(value).map(Box::new)
    }
}

impl<T: Convertible> Convertible for Arc<T> {
    fn shape() -> Shape {
        T::shape()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        cx.encode(&**self)
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        cx.decode(value).map(Arc::new)
    }
}

/// A map key. Guest objects only have string keys, so keys are coerced.
pub trait MapKey: Sized {
    /// Render as a guest object key
    fn to_key(&self) -> String;

    /// Parse from a guest object key
    fn from_key(key: &str) -> ConvertResult<Self>;
}

impl MapKey for String {
    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> ConvertResult<Self> {
        Ok(key.to_string())
    }
}

impl MapKey for bool {
    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(key: &str) -> ConvertResult<Self> {
        parse_bool(key)
    }
}

macro_rules! int_map_key {
    ($($ty:ty),*) => {$(
        impl MapKey for $ty {
            fn to_key(&self) -> String {
                self.to_string()
            }

            fn from_key(key: &str) -> ConvertResult<Self> {
                key.trim().parse().map_err(|_| ConversionError::InvalidLiteral {
                    expected: "int",
                    text: key.to_string(),
                })
            }
        }
    )*};
}

int_map_key!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn encode_entries<'m, K, V>(
    entries: impl Iterator<Item = (&'m K, &'m V)>,
    cx: &ConvertCx<'_>,
) -> ConvertResult<GuestValue>
where
    K: MapKey + 'm,
    V: Convertible,
{
    let mut object = BTreeMap::new();
    for (key, value) in entries {
        let key = key.to_key();
        let value = cx.encode(value).map_err(|e| e.at_key(key.as_str()))?;
        object.insert(key, value);
    }
    Ok(GuestValue::Object(object))
}

fn decode_entries<K, V, M>(value: &GuestValue, expected: Shape, cx: &ConvertCx<'_>) -> ConvertResult<M>
where
    K: MapKey,
    V: Convertible,
    M: FromIterator<(K, V)>,
{
    expect_object(value, &expected.to_string())?
        .iter()
        .map(|(key, item)| -> ConvertResult<(K, V)> {
            let host_key = K::from_key(key).map_err(|e| e.at_key(key.as_str()))?;
            let host_value = cx.decode::<V>(item).map_err(|e| e.at_key(key.as_str()))?;
            Ok((host_key, host_value))
        })
        .collect()
}

impl<K, V> Convertible for HashMap<K, V>
where
    K: MapKey + Eq + Hash + 'static,
    V: Convertible,
{
    fn shape() -> Shape {
        V::shape().map()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        encode_entries(self.iter(), cx)
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        decode_entries::<K, V, _>(value, Self::shape(), cx)
    }
}

impl<K, V> Convertible for BTreeMap<K, V>
where
    K: MapKey + Ord + 'static,
    V: Convertible,
{
    fn shape() -> Shape {
        V::shape().map()
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        encode_entries(self.iter(), cx)
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        decode_entries::<K, V, _>(value, Self::shape(), cx)
    }
}

// ============================================================================
// Dynamic values
// ============================================================================

impl Convertible for GuestValue {
    fn shape() -> Shape {
        Shape::Any
    }

    fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        Ok(self.clone())
    }

    fn decode(value: &GuestValue, _cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        Ok(value.clone())
    }
}

/// Untyped number decode: an integral number within the safe range is an
/// integer. Anything larger stays a float so it can be encoded back.
///
/// This misreads an integral float such as `4.0`. Declare the shape (`f64`,
/// `Shape::Float`) wherever the distinction matters.
pub(crate) fn number_to_host(n: f64) -> HostValue {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 {
        HostValue::Int(n as i64)
    } else {
        HostValue::Float(n)
    }
}

impl Convertible for HostValue {
    fn shape() -> Shape {
        Shape::Any
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        match self {
            HostValue::Null => Ok(GuestValue::Null),
            HostValue::Bool(b) => Ok(GuestValue::Bool(*b)),
            HostValue::Int(i) => encode_integer(i128::from(*i), cx),
            HostValue::Float(f) => Ok(GuestValue::Number(*f)),
            HostValue::String(s) => Ok(GuestValue::String(s.clone())),
            HostValue::Bytes(b) => Ok(GuestValue::Bytes(b.clone())),
            HostValue::Array(items) => items.encode(cx),
            HostValue::Map(entries) => encode_entries(entries.iter(), cx),
        }
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        match value {
            GuestValue::Null => Ok(HostValue::Null),
            GuestValue::Bool(b) => Ok(HostValue::Bool(*b)),
            GuestValue::Number(n) => Ok(number_to_host(*n)),
            GuestValue::String(s) => Ok(HostValue::String(s.clone())),
            GuestValue::Bytes(b) => Ok(HostValue::Bytes(b.clone())),
            GuestValue::Array(_) => Vec::<HostValue>::decode(value, cx).map(HostValue::Array),
            GuestValue::Object(_) => {
                decode_entries::<String, HostValue, _>(value, Shape::Any.map(), cx)
                    .map(HostValue::Map)
            }
        }
    }
}

// ============================================================================
// By-reference values
// ============================================================================

/// Host value that crosses the boundary by reference.
///
/// Encoding registers the value in the handle registry and yields its
/// `ref_<n>` token with a reference count of 1; the guest owns that
/// reference and gives it back with `release-object-ref`. Decoding resolves
/// a token to the shared value without touching the count.
pub struct Opaque<T>(pub Arc<T>);

impl<T> Opaque<T> {
    /// Wrap a value
    pub fn new(value: T) -> Self {
        Opaque(Arc::new(value))
    }
}

impl<T> Clone for Opaque<T> {
    fn clone(&self) -> Self {
        Opaque(self.0.clone())
    }
}

impl<T> Deref for Opaque<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for Opaque<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.0).finish()
    }
}

impl<T: Any + Send + Sync> Convertible for Opaque<T> {
    fn shape() -> Shape {
        Shape::Handle
    }

    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
        let object: HostObject = self.0.clone();
        let handle = cx.objects().create_shared(object, type_name::<T>());
        Ok(GuestValue::String(handle.to_string()))
    }

    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
        let token = value
            .as_str()
            .ok_or_else(|| ConversionError::mismatch(Shape::Handle, value.type_name()))?;
        let handle: ObjectHandle = token.parse()?;
        Ok(Opaque(cx.objects().get_as::<T>(handle)?))
    }
}
