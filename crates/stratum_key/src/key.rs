// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde_json::{Number, Value};

/// Sentinel key for `Option::None`.
pub const NULL_KEY: &str = "__null";

/// Sentinel key for the unit value `()`.
pub const UNDEFINED_KEY: &str = "__undefined";

/// Sentinel key for `true`.
pub const TRUE_KEY: &str = "__true";

/// Sentinel key for `false`.
pub const FALSE_KEY: &str = "__false";

/// Prefix shared by sentinels, structural keys and reference tokens.
pub(crate) const PREFIX: &str = "__";

// 2^63 as f64; every integral value strictly below it fits in i64.
const I64_UPPER: f64 = 9_223_372_036_854_775_808.0;

/// A derived memoization key.
///
/// Keys are either numbers or text. Floats that hold an integral value are stored as
/// [`CacheKey::Int`], so `1.0` and `1` produce the same key.
///
/// # Examples
///
/// ```
/// use stratum_key::CacheKey;
///
/// assert_eq!(CacheKey::from_f64(3.0), CacheKey::Int(3));
/// assert_eq!(CacheKey::from("abc").as_text(), Some("abc"));
/// assert_eq!(CacheKey::from_f64(1.5).to_string(), "1.5");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// An integral number.
    Int(i64),
    /// A non-integral number, stored as its normalized IEEE-754 bit pattern.
    Float(u64),
    /// A string, a sentinel, a structural serialization or a reference token.
    Text(String),
}

impl CacheKey {
    /// Creates a key from a floating point number.
    ///
    /// Integral values within the `i64` range become [`CacheKey::Int`]; every NaN maps to
    /// the same key.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "integral and range checked before the cast")]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::Float(f64::NAN.to_bits());
        }
        if value.fract() == 0.0 && value >= -I64_UPPER && value < I64_UPPER {
            return Self::Int(value as i64);
        }
        Self::Float(value.to_bits())
    }

    /// Returns the text of a [`CacheKey::Text`] key.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Int(_) | Self::Float(_) => None,
        }
    }

    /// Returns the value of a [`CacheKey::Int`] key.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(_) | Self::Text(_) => None,
        }
    }

    /// Returns the numeric value of a number key.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "keys only compare numbers, precision is not needed")]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(bits) => Some(f64::from_bits(*bits)),
            Self::Text(_) => None,
        }
    }

    /// Converts the key into a JSON scalar, used when composing multi-argument keys.
    ///
    /// Non-finite floats become `null`, matching JSON serialization of numbers.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(value) => Value::from(*value),
            Self::Float(bits) => Number::from_f64(f64::from_bits(*bits)).map_or(Value::Null, Value::Number),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    pub(crate) fn prefixed(body: impl fmt::Display) -> Self {
        Self::Text(format!("{PREFIX}{body}"))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
