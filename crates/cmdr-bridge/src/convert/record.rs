//! Record conversion
//!
//! [`convertible_record!`](crate::convertible_record) declares a struct and
//! implements `Convertible` for it. Each field crosses under its own name
//! unless a wire name is given with `=> "wireName"`. Decoding reads a
//! missing key as null (so `Option` fields may be omitted) and ignores keys
//! the record does not declare.

/// Declare a struct that crosses the boundary as a guest object.
///
/// ```ignore
/// convertible_record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct OptionSpec {
///         pub flags: String,
///         pub description: Option<String>,
///         pub default_value: Option<String> => "defaultValue",
///     }
/// }
/// ```
#[macro_export]
macro_rules! convertible_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(=> $wire:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::convert::Convertible for $name {
            fn shape() -> $crate::shape::Shape {
                $crate::shape::Shape::Record {
                    name: ::std::string::String::from(::std::stringify!($name)),
                    fields: ::std::vec![
                        $((
                            ::std::string::String::from(
                                $crate::convertible_record!(@wire $field $($wire)?)
                            ),
                            <$fty as $crate::convert::Convertible>::shape(),
                        ),)*
                    ],
                }
            }

            fn encode(
                &self,
                cx: &$crate::convert::ConvertCx<'_>,
            ) -> $crate::error::ConvertResult<$crate::GuestValue> {
                let mut object = ::std::collections::BTreeMap::new();
                $(
                    let wire = $crate::convertible_record!(@wire $field $($wire)?);
                    let value = cx.encode(&self.$field).map_err(|e| e.at_field(wire))?;
                    object.insert(::std::string::String::from(wire), value);
                )*
                ::std::result::Result::Ok($crate::GuestValue::Object(object))
            }

            fn decode(
                value: &$crate::GuestValue,
                cx: &$crate::convert::ConvertCx<'_>,
            ) -> $crate::error::ConvertResult<Self> {
                let object = $crate::convert::expect_object(value, ::std::stringify!($name))?;
                ::std::result::Result::Ok($name {
                    $(
                        $field: {
                            let wire = $crate::convertible_record!(@wire $field $($wire)?);
                            let item = object.get(wire).unwrap_or(&$crate::GuestValue::Null);
                            cx.decode::<$fty>(item).map_err(|e| e.at_field(wire))?
                        },
                    )*
                })
            }
        }
    };
    (@wire $field:ident $wire:literal) => {
        $wire
    };
    (@wire $field:ident) => {
        ::std::stringify!($field)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::convert::{Convertible, Converter};
    use crate::error::ConversionError;
    use crate::objects::HandleRegistry;
    use crate::shape::Shape;
    use cmdr_sdk::GuestValue;
    use std::sync::Arc;

    crate::convertible_record! {
        #[derive(Debug, Clone, PartialEq)]
        struct OptionSpec {
            flags: String,
            /// Shown in help output
            description: Option<String>,
            default_value: Option<i64> => "defaultValue",
            choices: Vec<String>,
        }
    }

    crate::convertible_record! {
        #[derive(Debug, PartialEq)]
        struct CommandSpec {
            name: String,
            options: Vec<OptionSpec>,
        }
    }

    fn converter() -> Converter {
        Converter::new(Arc::new(HandleRegistry::new()), &BridgeConfig::default())
    }

    fn port_option() -> OptionSpec {
        OptionSpec {
            flags: "-p, --port <n>".to_string(),
            description: None,
            default_value: Some(8080),
            choices: vec![],
        }
    }

    #[test]
    fn test_wire_names() {
        let conv = converter();
        let encoded = conv.encode(&port_option()).unwrap();
        assert_eq!(encoded.get("defaultValue"), Some(&GuestValue::Number(8080.0)));
        assert_eq!(encoded.get("description"), Some(&GuestValue::Null));
        assert!(encoded.get("default_value").is_none());
        assert_eq!(conv.decode_as::<OptionSpec>(&encoded).unwrap(), port_option());
    }

    #[test]
    fn test_missing_optional_and_unknown_keys() {
        let conv = converter();
        let value = GuestValue::object([
            ("flags", GuestValue::from("-v")),
            ("choices", GuestValue::Array(vec![])),
            ("hidden", GuestValue::Bool(true)),
        ]);
        let spec = conv.decode_as::<OptionSpec>(&value).unwrap();
        assert_eq!(spec.description, None);
        assert_eq!(spec.default_value, None);
    }

    #[test]
    fn test_missing_required_field_names_it() {
        let conv = converter();
        let value = GuestValue::object([("flags", GuestValue::from("-v"))]);
        match conv.decode_as::<OptionSpec>(&value).unwrap_err() {
            ConversionError::Field { field, .. } => assert_eq!(field, "choices"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nested_error_path() {
        let conv = converter();
        let value = GuestValue::object([
            ("name", GuestValue::from("serve")),
            (
                "options",
                GuestValue::Array(vec![GuestValue::object([
                    ("flags", GuestValue::from("-p")),
                    ("defaultValue", GuestValue::from("eighty")),
                    ("choices", GuestValue::Array(vec![])),
                ])]),
            ),
        ]);
        let err = conv.decode_as::<CommandSpec>(&value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Field 'options': Element 0: Field 'defaultValue': Invalid int literal: \"eighty\""
        );
    }

    #[test]
    fn test_record_shape() {
        match OptionSpec::shape() {
            Shape::Record { name, fields } => {
                assert_eq!(name, "OptionSpec");
                assert_eq!(fields[2], ("defaultValue".to_string(), Shape::Int.optional()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
