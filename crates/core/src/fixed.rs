//! Fixed-point arithmetic implementation
//!
//! Venue amounts arrive as decimal strings and are parsed into `Fixed`, a
//! thin wrapper around `rust_decimal::Decimal`. Arithmetic keeps full
//! precision; rounding happens only when a value is formatted for display.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// Fixed-point decimal type for precise financial calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fixed {
    value: Decimal,
}

impl Fixed {
    /// Zero value
    pub const ZERO: Fixed = Fixed {
        value: Decimal::ZERO,
    };

    /// One value
    pub const ONE: Fixed = Fixed {
        value: Decimal::ONE,
    };

    /// One hundred, the percent scale
    pub const HUNDRED: Fixed = Fixed {
        value: Decimal::ONE_HUNDRED,
    };

    /// Create a Fixed from an integer
    pub fn from_i64(value: i64) -> Self {
        Fixed {
            value: Decimal::from(value),
        }
    }

    /// Create a Fixed from mantissa and scale, e.g. `new(2, 1)` is 0.2
    pub fn new(mantissa: i64, scale: u32) -> Self {
        Fixed {
            value: Decimal::new(mantissa, scale),
        }
    }

    /// Create a Fixed from a string
    pub fn from_str_exact(s: &str) -> Result<Self, FixedError> {
        let decimal = Decimal::from_str(s.trim()).map_err(|_| FixedError::InvalidValue(s.to_string()))?;
        Ok(Fixed { value: decimal })
    }

    /// Convert to string with specified decimal places, padding with zeros
    pub fn to_string_with_scale(&self, scale: u32) -> String {
        let rounded = self
            .value
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.1$}", rounded, scale as usize)
    }

    /// Money formatting: two fractional digits, half away from zero
    pub fn to_money_string(&self) -> String {
        self.to_string_with_scale(2)
    }

    /// Check if the value is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Strictly less than zero
    pub fn is_negative(&self) -> bool {
        self.value < Decimal::ZERO
    }

    /// Get the absolute value
    pub fn abs(&self) -> Self {
        Fixed {
            value: self.value.abs(),
        }
    }

    /// Clamp into `[lower, upper]`
    pub fn clamp_to(&self, lower: Fixed, upper: Fixed) -> Fixed {
        if *self < lower {
            lower
        } else if *self > upper {
            upper
        } else {
            *self
        }
    }

    pub fn checked_add(&self, rhs: Fixed) -> Result<Fixed, FixedError> {
        self.value
            .checked_add(rhs.value)
            .map(|value| Fixed { value })
            .ok_or(FixedError::Overflow)
    }

    pub fn checked_sub(&self, rhs: Fixed) -> Result<Fixed, FixedError> {
        self.value
            .checked_sub(rhs.value)
            .map(|value| Fixed { value })
            .ok_or(FixedError::Overflow)
    }

    pub fn checked_mul(&self, rhs: Fixed) -> Result<Fixed, FixedError> {
        self.value
            .checked_mul(rhs.value)
            .map(|value| Fixed { value })
            .ok_or(FixedError::Overflow)
    }

    /// Division that refuses a zero divisor instead of panicking
    pub fn checked_div(&self, rhs: Fixed) -> Result<Fixed, FixedError> {
        if rhs.is_zero() {
            return Err(FixedError::DivisionByZero);
        }
        self.value
            .checked_div(rhs.value)
            .map(|value| Fixed { value })
            .ok_or(FixedError::Overflow)
    }

    /// `(self / base) * 100`
    pub fn percent_of(&self, base: Fixed) -> Result<Fixed, FixedError> {
        self.checked_div(base)?.checked_mul(Fixed::HUNDRED)
    }
}

/// Fixed-point arithmetic errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixedError {
    #[error("Invalid decimal value: {0:?}")]
    InvalidValue(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Overflow in arithmetic operation")]
    Overflow,
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Self) -> Self::Output {
        Fixed {
            value: self.value + rhs.value,
        }
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Self) -> Self::Output {
        Fixed {
            value: self.value - rhs.value,
        }
    }
}

impl Neg for Fixed {
    type Output = Fixed;

    fn neg(self) -> Self::Output {
        Fixed { value: -self.value }
    }
}

impl std::iter::Sum for Fixed {
    fn sum<I: Iterator<Item = Fixed>>(iter: I) -> Self {
        iter.fold(Fixed::ZERO, |acc, v| acc + v)
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.normalize())
    }
}
