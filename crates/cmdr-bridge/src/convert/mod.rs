//! Type converter
//!
//! Translates host values to and from [`GuestValue`]. Each host type opts in
//! by implementing [`Convertible`]; records use [`convertible_record!`].
//!
//! Conversion goes through a [`ConvertCx`], which tracks nesting depth and
//! consults the converter's rule table before falling back to the type's own
//! structural conversion:
//!
//! 1. A [`ConversionRule`] registered for the exact type wins.
//! 2. Otherwise the type's `Convertible` impl runs.
//!
//! Rules are looked up under a read lock and called after it is released, so
//! a rule may itself register rules or convert nested values.
//!
//! [`convertible_record!`]: crate::convertible_record

mod dynamic;
mod impls;
mod record;
mod rules;

pub use impls::{Bytes, MapKey, Opaque};
pub use rules::{decode_command_error, decode_timestamp, encode_timestamp};

use crate::config::BridgeConfig;
use crate::error::{ConversionError, ConvertResult};
use crate::objects::HandleRegistry;
use crate::shape::Shape;
use cmdr_sdk::{GuestValue, HostValue};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Largest integer magnitude a guest number represents exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: i128 = (1 << 53) - 1;

/// A host type that can cross the boundary by value.
pub trait Convertible: Sized + 'static {
    /// Declared shape, used for argument lists and error messages
    fn shape() -> Shape;

    /// Encode into a guest value
    fn encode(&self, cx: &ConvertCx<'_>) -> ConvertResult<GuestValue>;

    /// Decode from a guest value, coercing where the rules allow
    fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self>;
}

type EncodeFn = Arc<dyn Fn(&dyn Any, &ConvertCx<'_>) -> ConvertResult<GuestValue> + Send + Sync>;
type DecodeFn =
    Arc<dyn Fn(&GuestValue, &ConvertCx<'_>) -> ConvertResult<Box<dyn Any + Send>> + Send + Sync>;

/// Custom encode/decode pair for one host type
#[derive(Clone)]
pub struct ConversionRule {
    type_name: &'static str,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl ConversionRule {
    /// Host type this rule converts
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRule")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// Converter state shared by every call: rule table, object registry and
/// limits.
pub struct Converter {
    rules: RwLock<HashMap<TypeId, Arc<ConversionRule>>>,
    objects: Arc<HandleRegistry>,
    max_depth: usize,
    safe_integers: bool,
}

impl Converter {
    /// Create a converter. Installs the builtin rules unless the config
    /// disables them.
    pub fn new(objects: Arc<HandleRegistry>, config: &BridgeConfig) -> Self {
        let converter = Self {
            rules: RwLock::new(HashMap::new()),
            objects,
            max_depth: config.max_depth,
            safe_integers: config.safe_integers,
        };
        if config.builtin_rules {
            rules::install_builtin(&converter);
        }
        converter
    }

    /// Register a rule for `T`, replacing any existing one
    pub fn register_rule<T, E, D>(&self, encode: E, decode: D)
    where
        T: Any + Send,
        E: Fn(&T, &ConvertCx<'_>) -> ConvertResult<GuestValue> + Send + Sync + 'static,
        D: Fn(&GuestValue, &ConvertCx<'_>) -> ConvertResult<T> + Send + Sync + 'static,
    {
        let encode_fn: EncodeFn = Arc::new(move |value: &dyn Any, cx: &ConvertCx<'_>| {
            match value.downcast_ref::<T>() {
                Some(value) => encode(value, cx),
                None => Err(ConversionError::unsupported(type_name::<T>())),
            }
        });
        let decode_fn: DecodeFn = Arc::new(move |value: &GuestValue, cx: &ConvertCx<'_>| {
            decode(value, cx).map(|host| Box::new(host) as Box<dyn Any + Send>)
        });
        let rule = ConversionRule {
            type_name: type_name::<T>(),
            encode: encode_fn,
            decode: decode_fn,
        };
        debug!(type_name = rule.type_name, "conversion rule registered");
        self.rules.write().insert(TypeId::of::<T>(), Arc::new(rule));
    }

    /// Remove the rule for `T`. Returns true if one was registered.
    pub fn unregister_rule<T: Any>(&self) -> bool {
        self.rules.write().remove(&TypeId::of::<T>()).is_some()
    }

    /// Check if a rule is registered for `T`
    pub fn has_rule<T: Any>(&self) -> bool {
        self.rules.read().contains_key(&TypeId::of::<T>())
    }

    fn rule_for<T: Any>(&self) -> Option<Arc<ConversionRule>> {
        self.rules.read().get(&TypeId::of::<T>()).cloned()
    }

    /// Object registry used for by-reference values
    pub fn objects(&self) -> &Arc<HandleRegistry> {
        &self.objects
    }

    /// Root conversion context
    pub fn cx(&self) -> ConvertCx<'_> {
        ConvertCx {
            converter: self,
            depth: 0,
        }
    }

    /// Encode a host value
    pub fn encode<T: Convertible>(&self, value: &T) -> ConvertResult<GuestValue> {
        self.cx().encode(value)
    }

    /// Decode into a declared host type
    pub fn decode_as<T: Convertible>(&self, value: &GuestValue) -> ConvertResult<T> {
        self.cx().decode(value)
    }

    /// Decode without a declared type. Integral numbers become `Int`.
    pub fn decode(&self, value: &GuestValue) -> ConvertResult<HostValue> {
        self.cx().decode(value)
    }

    /// Decode following a shape descriptor
    pub fn decode_shape(&self, value: &GuestValue, shape: &Shape) -> ConvertResult<HostValue> {
        self.cx().decode_shape(value, shape)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("rules", &self.rules.read().len())
            .field("max_depth", &self.max_depth)
            .field("safe_integers", &self.safe_integers)
            .finish()
    }
}

/// Per-conversion context: the converter plus the current nesting depth.
#[derive(Clone, Copy)]
pub struct ConvertCx<'a> {
    converter: &'a Converter,
    depth: usize,
}

impl<'a> ConvertCx<'a> {
    /// Owning converter
    pub fn converter(&self) -> &'a Converter {
        self.converter
    }

    /// Object registry for by-reference values
    pub fn objects(&self) -> &'a HandleRegistry {
        &self.converter.objects
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether integers beyond 2^53 - 1 are rejected on encode
    pub fn safe_integers(&self) -> bool {
        self.converter.safe_integers
    }

    fn descend(&self) -> ConvertResult<ConvertCx<'a>> {
        if self.depth >= self.converter.max_depth {
            return Err(ConversionError::MaxDepthExceeded {
                limit: self.converter.max_depth,
            });
        }
        Ok(ConvertCx {
            converter: self.converter,
            depth: self.depth + 1,
        })
    }

    /// Encode a nested value one level deeper
    pub fn encode<T: Convertible>(&self, value: &T) -> ConvertResult<GuestValue> {
        let cx = self.descend()?;
        match self.converter.rule_for::<T>() {
            Some(rule) => (rule.encode)(value, &cx),
            None => value.encode(&cx),
        }
    }

    /// Decode a nested value one level deeper
    pub fn decode<T: Convertible>(&self, value: &GuestValue) -> ConvertResult<T> {
        let cx = self.descend()?;
        match self.converter.rule_for::<T>() {
            Some(rule) => (rule.decode)(value, &cx)?
                .downcast::<T>()
                .map(|host| *host)
                .map_err(|_| ConversionError::unsupported(rule.type_name)),
            None => T::decode(value, &cx),
        }
    }

    /// Decode following a shape descriptor
    pub fn decode_shape(&self, value: &GuestValue, shape: &Shape) -> ConvertResult<HostValue> {
        let cx = self.descend()?;
        dynamic::decode_shape(value, shape, &cx)
    }
}

/// Borrow a guest object, or fail naming `expected`
pub fn expect_object<'v>(
    value: &'v GuestValue,
    expected: &str,
) -> ConvertResult<&'v BTreeMap<String, GuestValue>> {
    value
        .as_object()
        .ok_or_else(|| ConversionError::mismatch(expected, value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> Converter {
        Converter::new(Arc::new(HandleRegistry::new()), &BridgeConfig::default())
    }

    #[derive(Debug, PartialEq)]
    struct Celsius(f64);

    impl Convertible for Celsius {
        fn shape() -> Shape {
            Shape::Float
        }

        fn encode(&self, _cx: &ConvertCx<'_>) -> ConvertResult<GuestValue> {
            Ok(GuestValue::Number(self.0))
        }

        fn decode(value: &GuestValue, cx: &ConvertCx<'_>) -> ConvertResult<Self> {
            f64::decode(value, cx).map(Celsius)
        }
    }

    #[test]
    fn test_rule_takes_precedence() {
        let conv = converter();
        assert_eq!(conv.encode(&Celsius(20.0)).unwrap(), GuestValue::Number(20.0));

        conv.register_rule::<Celsius, _, _>(
            |c, _| Ok(GuestValue::String(format!("{}C", c.0))),
            |v, _| {
                let text = v.as_str().unwrap_or_default();
                let n = text.trim_end_matches('C').parse().map_err(|_| {
                    ConversionError::InvalidLiteral {
                        expected: "celsius",
                        text: text.to_string(),
                    }
                })?;
                Ok(Celsius(n))
            },
        );
        assert!(conv.has_rule::<Celsius>());
        assert_eq!(conv.encode(&Celsius(20.0)).unwrap(), GuestValue::from("20C"));
        assert_eq!(
            conv.decode_as::<Celsius>(&GuestValue::from("21.5C")).unwrap(),
            Celsius(21.5)
        );

        assert!(conv.unregister_rule::<Celsius>());
        assert_eq!(conv.encode(&Celsius(20.0)).unwrap(), GuestValue::Number(20.0));
    }

    #[test]
    fn test_rule_applies_inside_containers() {
        let conv = converter();
        conv.register_rule::<Celsius, _, _>(|_, _| Ok(GuestValue::from("hot")), |_, _| Ok(Celsius(99.0)));
        let encoded = conv.encode(&vec![Celsius(1.0), Celsius(2.0)]).unwrap();
        assert_eq!(
            encoded,
            GuestValue::Array(vec![GuestValue::from("hot"), GuestValue::from("hot")])
        );
    }

    #[test]
    fn test_depth_limit() {
        let conv = Converter::new(
            Arc::new(HandleRegistry::new()),
            &BridgeConfig::with_max_depth(3),
        );
        assert!(conv.encode(&vec![vec![1i32]]).is_ok());
        assert_eq!(
            conv.encode(&vec![vec![vec![1i32]]]).unwrap_err(),
            ConversionError::MaxDepthExceeded { limit: 3 }
        );

        let mut deep = GuestValue::Null;
        for _ in 0..10 {
            deep = GuestValue::Array(vec![deep]);
        }
        assert!(matches!(
            conv.decode(&deep),
            Err(ConversionError::MaxDepthExceeded { limit: 3 })
        ));
    }
}
