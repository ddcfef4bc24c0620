//! Stable status codes
//!
//! Closed enumerations whose persisted and external representation is a short
//! code (`"OS001"`) instead of the variant name. Codes are assigned once and
//! never reused, so stored rows keep decoding after variants are renamed.

use std::fmt;

/// Error returned when a stored code does not name any variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {type_name} code: {code}")]
pub struct StatusDecodeError {
    pub type_name: &'static str,
    pub code: String,
}

/// A closed enumeration paired with a bidirectional code table.
///
/// Implementations are generated by [`stable_code_enum!`]: `code` is an
/// exhaustive match, so a variant without a code does not compile, and the
/// table is checked for duplicate codes in a `const` assertion.
pub trait StableCode: Copy + Eq + fmt::Debug + 'static {
    /// Every variant paired with its code.
    const CODES: &'static [(Self, &'static str)];

    /// Variant written when the value is absent.
    const DEFAULT: Self;

    /// Type name used in decode errors.
    const TYPE_NAME: &'static str;

    /// The stable code of this variant.
    fn code(self) -> &'static str;

    /// Encode an optional value; absence encodes as the default variant.
    fn encode(value: Option<Self>) -> &'static str {
        value.unwrap_or(Self::DEFAULT).code()
    }

    /// Decode a stored code.
    ///
    /// Unknown codes are an error rather than the default: a silent fallback
    /// would hide corrupted rows.
    fn decode(code: &str) -> Result<Self, StatusDecodeError> {
        Self::CODES
            .iter()
            .find(|(_, candidate)| *candidate == code)
            .map(|(value, _)| *value)
            .ok_or_else(|| StatusDecodeError {
                type_name: Self::TYPE_NAME,
                code: code.to_string(),
            })
    }
}

#[doc(hidden)]
pub const fn codes_are_unique(codes: &[&str]) -> bool {
    let mut i = 0;
    while i < codes.len() {
        let mut j = i + 1;
        while j < codes.len() {
            if str_eq(codes[i], codes[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Declare a status enum with its stable code table.
///
/// ```ignore
/// stable_code_enum! {
///     /// Order lifecycle
///     pub enum OrderStatus default Ordered {
///         Ordered => "OS001",
///         InCart => "OS002",
///         Returned => "OS003",
///     }
/// }
/// ```
macro_rules! stable_code_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident default $default:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $crate::domain::status::StableCode for $name {
            const CODES: &'static [(Self, &'static str)] = &[ $( ($name::$variant, $code), )+ ];
            const DEFAULT: Self = $name::$default;
            const TYPE_NAME: &'static str = stringify!($name);

            fn code(self) -> &'static str {
                match self {
                    $( $name::$variant => $code, )+
                }
            }
        }

        const _: () = assert!(
            $crate::domain::status::codes_are_unique(&[ $( $code ),+ ]),
            "duplicate stable code"
        );

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::domain::status::StableCode::code(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::domain::status::StatusDecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <Self as $crate::domain::status::StableCode>::decode(s)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str($crate::domain::status::StableCode::code(*self))
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                <Self as $crate::domain::status::StableCode>::decode(&code)
                    .map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use stable_code_enum;

#[cfg(test)]
mod tests {
    use super::*;

    stable_code_enum! {
        enum Signal default Green {
            Green => "G1",
            Amber => "A1",
            Red => "R1",
        }
    }

    #[test]
    fn test_code_table_round_trip() {
        for (value, code) in Signal::CODES {
            assert_eq!(value.code(), *code);
            assert_eq!(Signal::decode(code).unwrap(), *value);
        }
    }

    #[test]
    fn test_absent_value_encodes_default() {
        assert_eq!(Signal::encode(None), "G1");
        assert_eq!(Signal::encode(Some(Signal::Red)), "R1");
    }

    #[test]
    fn test_unknown_code_is_error() {
        let err = Signal::decode("Red").unwrap_err();
        assert_eq!(err.type_name, "Signal");
        assert_eq!(err.code, "Red");
    }

    #[test]
    fn test_serde_uses_code() {
        let json = serde_json::to_string(&Signal::Amber).unwrap();
        assert_eq!(json, "\"A1\"");

        let parsed: Signal = serde_json::from_str("\"R1\"").unwrap();
        assert_eq!(parsed, Signal::Red);

        assert!(serde_json::from_str::<Signal>("\"Amber\"").is_err());
    }

    #[test]
    fn test_codes_are_unique() {
        assert!(codes_are_unique(&["a", "b", "c"]));
        assert!(!codes_are_unique(&["a", "b", "a"]));
        assert!(codes_are_unique(&[]));
    }
}
