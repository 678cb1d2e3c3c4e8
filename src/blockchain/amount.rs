use fixed::types::I64F64;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use std::fmt;
use std::ops::Neg;
use std::str::FromStr;

/// Errors that can occur when building an amount
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0}")]
    Invalid(String),

    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

/// A monetary value in fixed-point representation.
///
/// Additions and subtractions are exact, so summing a long history of
/// transfers never drifts the way binary floats do. They are also checked:
/// a sum outside the representable range is an error, never a wrapped value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(I64F64);

impl Amount {
    pub const ZERO: Amount = Amount(I64F64::ZERO);

    /// Builds an amount from a whole number of coins
    pub fn from_coins(coins: i64) -> Self {
        Amount(I64F64::from_num(coins))
    }

    /// Converts a float through its shortest decimal form, so `0.1` yields
    /// the same amount as parsing the string `"0.1"`.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Invalid(value.to_string()));
        }
        let decimal = value.to_string();
        I64F64::from_str(&decimal)
            .map(Amount)
            .map_err(|_| AmountError::OutOfRange(decimal))
    }

    pub fn checked_add(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_add(rhs.0)
            .map(Amount)
            .ok_or_else(|| AmountError::OutOfRange(format!("{} + {}", self, rhs)))
    }

    pub fn checked_sub(self, rhs: Amount) -> Result<Amount, AmountError> {
        self.0
            .checked_sub(rhs.0)
            .map(Amount)
            .ok_or_else(|| AmountError::OutOfRange(format!("{} - {}", self, rhs)))
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Raw fixed-point bits, used for canonical encodings
    pub fn to_bits(&self) -> i128 {
        self.0.to_bits()
    }

    pub const fn from_bits(bits: i128) -> Self {
        Amount(I64F64::from_bits(bits))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        I64F64::from_str(s.trim())
            .map(Amount)
            .map_err(|e| AmountError::Invalid(format!("{}: {}", s, e)))
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(self.0.saturating_neg())
    }
}

// Serialized as a decimal string so clients never see a lossy float.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::from_str(v).map_err(E::custom)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        Amount::from_f64(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Ok(Amount::from_coins(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        let coins = i64::try_from(v)
            .map_err(|_| E::custom(AmountError::OutOfRange(v.to_string())))?;
        Ok(Amount::from_coins(coins))
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}
