//! Exact arbitrary-precision balance amounts.
//!
//! All balances are arbitrary-precision; every operation here uses an exact
//! integer type end-to-end and never round-trips through floating point.
//! `bigdecimal` stores an arbitrary-precision unscaled `BigInt` plus a scale;
//! this crate restricts every balance field to scale zero and never
//! converts through `f32`/`f64`.

use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

/// A signed, arbitrary-precision integer amount in base units.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigDecimal::from(0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigDecimal::from(0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::from(0)
    }

    /// `self - other`, signed.
    pub fn diff(&self, other: &Amount) -> Amount {
        Amount(&self.0 - &other.0)
    }

    pub fn abs(&self) -> Amount {
        Amount(self.0.abs())
    }

    pub fn add(&self, other: &Amount) -> Amount {
        Amount(&self.0 + &other.0)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.with_scale(0))
    }
}

/// Parse error for an [`Amount`]: either malformed decimal text or a
/// fractional value, which would violate the "base units are integers"
/// invariant every balance field assumes.
#[derive(Debug, thiserror::Error)]
pub enum AmountParseError {
    #[error("not a valid decimal integer: {0}")]
    Malformed(String),

    #[error("amount {0} has a fractional component; balances are base-unit integers")]
    Fractional(String),
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed =
            BigDecimal::from_str(s).map_err(|_| AmountParseError::Malformed(s.to_string()))?;
        if parsed.with_scale(0) != parsed {
            return Err(AmountParseError::Fractional(s.to_string()));
        }
        Ok(Amount(parsed.with_scale(0)))
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(BigDecimal::from(value))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Amount(BigDecimal::from_str(&value.to_string()).expect("u128 always parses"))
    }
}
