//! Arbitrary-precision fixed-point decimals for protocol accounting.
//!
//! Every balance, rate, index and price in the ledger is a [`Decimal`].
//! Addition, subtraction and multiplication are exact. Division truncates
//! toward zero at [`MANTISSA_FACTOR`] fractional digits and is only offered
//! as [`Decimal::checked_div`], so a zero divisor surfaces as an error
//! instead of a panic.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

use alloy::primitives::U256;
use bigdecimal::BigDecimal;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol mantissa scale: rates, indices and prices carry 18 decimals.
pub const MANTISSA_FACTOR: u32 = 18;

/// cToken balances carry 8 decimals.
pub const CTOKEN_DECIMALS: u32 = 8;

/// Errors raised by decimal arithmetic and parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid decimal literal '{0}'")]
    Parse(String),
}

/// Fixed-point decimal value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimal(BigDecimal);

impl Decimal {
    /// Canonical zero.
    pub fn zero() -> Self {
        Self(BigDecimal::zero())
    }

    pub fn one() -> Self {
        Self(BigDecimal::one())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < BigDecimal::zero()
    }

    /// `10^decimals`, built by repeated multiplication so the result is
    /// exact for every scale the protocol uses.
    pub fn exponent(decimals: u32) -> Self {
        let ten = BigDecimal::from(10);
        let mut value = BigDecimal::one();
        for _ in 0..decimals {
            value = value * &ten;
        }
        Self(value)
    }

    /// `10^18`
    pub fn mantissa_factor() -> Self {
        Self::exponent(MANTISSA_FACTOR)
    }

    /// `10^8`
    pub fn ctoken_decimals_factor() -> Self {
        Self::exponent(CTOKEN_DECIMALS)
    }

    /// Convert a raw on-chain integer amount with `decimals` implied
    /// fractional digits into a decimal.
    ///
    /// Only the decimal point moves, so the conversion is exact.
    ///
    /// Example: `from_raw(150_000_000, 8) == 1.5`
    pub fn from_raw(raw: U256, decimals: u32) -> Result<Self, DecimalError> {
        let literal = raw.to_string();
        let integer =
            BigDecimal::from_str(&literal).map_err(|_| DecimalError::Parse(literal.clone()))?;
        let (digits, _) = integer.into_bigint_and_exponent();
        Ok(Self(BigDecimal::new(digits, i64::from(decimals))))
    }

    /// Divide, truncating the quotient toward zero at 18 fractional digits.
    pub fn checked_div(&self, rhs: &Decimal) -> Result<Decimal, DecimalError> {
        if rhs.is_zero() {
            return Err(DecimalError::DivisionByZero);
        }
        let quotient = &self.0 / &rhs.0;
        Ok(Self(quotient.with_scale(i64::from(MANTISSA_FACTOR))))
    }

    /// Drop fractional digits beyond `scale`, rounding toward zero.
    pub fn truncate(&self, scale: u32) -> Self {
        let scale = i64::from(scale);
        let (_, current) = self.0.as_bigint_and_exponent();
        if current <= scale {
            return self.clone();
        }
        Self(self.0.with_scale(scale))
    }

    pub fn as_big_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl From<BigDecimal> for Decimal {
    fn from(value: BigDecimal) -> Self {
        Self(value)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl From<u64> for Decimal {
    fn from(value: u64) -> Self {
        Self(BigDecimal::from(value))
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BigDecimal::from_str(s.trim())
            .map(Self)
            .map_err(|_| DecimalError::Parse(s.to_string()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident) => {
        impl $trait for Decimal {
            type Output = Decimal;

            #[inline]
            fn $method(self, rhs: Decimal) -> Decimal {
                Decimal(self.0.$method(rhs.0))
            }
        }

        impl<'a> $trait<&'a Decimal> for Decimal {
            type Output = Decimal;

            #[inline]
            fn $method(self, rhs: &'a Decimal) -> Decimal {
                Decimal(self.0.$method(&rhs.0))
            }
        }

        impl<'a, 'b> $trait<&'b Decimal> for &'a Decimal {
            type Output = Decimal;

            #[inline]
            fn $method(self, rhs: &'b Decimal) -> Decimal {
                Decimal((&self.0).$method(&rhs.0))
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl Sum for Decimal {
    fn sum<I: Iterator<Item = Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, value| acc + value)
    }
}

impl<'a> Sum<&'a Decimal> for Decimal {
    fn sum<I: Iterator<Item = &'a Decimal>>(iter: I) -> Self {
        iter.fold(Decimal::zero(), |acc, value| acc + value)
    }
}
