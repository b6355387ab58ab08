//! Scalar types without a natural std/chrono counterpart
//!
//! `std::bigint` maps to [`num_bigint::BigInt`]. `std::decimal` is a bigint
//! mantissa with a decimal scale, so decoding and re-encoding a value keeps
//! its trailing zeros.

use std::fmt;
use std::str::FromStr;

use num_bigint::Sign;
use num_traits::Signed;

pub use num_bigint::BigInt;

use crate::error::DriverError;

/// Exact time span in microseconds (`std::duration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    micros: i64,
}

impl Duration {
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    /// `None` if the span does not fit in 64 bits of microseconds.
    pub fn checked_from_secs(secs: i64) -> Option<Self> {
        secs.checked_mul(1_000_000).map(Self::from_micros)
    }

    pub fn to_micros(self) -> i64 {
        self.micros
    }
}

/// Calendar-aware span (`cal::relative_duration`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RelativeDuration {
    pub micros: i64,
    pub days: i32,
    pub months: i32,
}

/// Arbitrary-precision decimal (`std::decimal`): `mantissa / 10^scale`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    mantissa: BigInt,
    scale: u16,
}

impl Decimal {
    pub fn new(mantissa: impl Into<BigInt>, scale: u16) -> Self {
        Self {
            mantissa: mantissa.into(),
            scale,
        }
    }

    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    /// Number of digits after the decimal point.
    pub fn scale(&self) -> u16 {
        self.scale
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa.sign() == Sign::Minus
    }
}

impl FromStr for Decimal {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DriverError::mismatch("decimal", "decimal literal", s);
        let body = s.trim();
        let (negative, body) = match body.as_bytes().first() {
            Some(b'-') => (true, &body[1..]),
            Some(b'+') => (false, &body[1..]),
            _ => (false, body),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        let digits_only = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !digits_only(int_part)
            || !digits_only(frac_part)
        {
            return Err(invalid());
        }

        let scale = u16::try_from(frac_part.len()).map_err(|_| invalid())?;
        let mut mantissa: BigInt = format!("{}{}", int_part, frac_part)
            .parse()
            .map_err(|_| invalid())?;
        if negative {
            mantissa = -mantissa;
        }
        Ok(Decimal { mantissa, scale })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.scale as usize;
        let digits = self.mantissa.abs().to_string();
        let digits = if digits.len() <= scale {
            "0".repeat(scale + 1 - digits.len()) + &digits
        } else {
            digits
        };
        if self.is_negative() {
            f.write_str("-")?;
        }
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        f.write_str(int_part)?;
        if scale > 0 {
            write!(f, ".{}", frac_part)?;
        }
        Ok(())
    }
}
