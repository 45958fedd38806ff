//! Naira amounts using decimal arithmetic.
//!
//! The hosted store keeps prices as plain JSON numbers, so [`Naira`]
//! serializes through `rust_decimal::serde::float` rather than as a string.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount of Nigerian naira.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Naira(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Naira {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whole-naira amount, as used by the delivery table and most listings.
    #[must_use]
    pub fn whole(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl Add for Naira {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Naira {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Naira {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Naira {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

/// Formats as `₦62,500` or `₦1,250.50` when there is a fractional part.
impl fmt::Display for Naira {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self.0.round_dp(2).normalize();
        let text = rounded.abs().to_string();
        let (int_part, frac_part) = text.split_once('.').unwrap_or((&text, ""));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, ch) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
        if frac_part.is_empty() {
            write!(f, "{sign}₦{grouped}")
        } else {
            write!(f, "{sign}₦{grouped}.{frac_part:0<2}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Naira::whole(62_500).to_string(), "₦62,500");
        assert_eq!(Naira::whole(999).to_string(), "₦999");
        assert_eq!(Naira::whole(1_000_000).to_string(), "₦1,000,000");
        assert_eq!(Naira::new(Decimal::new(12_505, 1)).to_string(), "₦1,250.50");
        assert_eq!(Naira::whole(-2500).to_string(), "-₦2,500");
    }

    #[test]
    fn test_arithmetic() {
        let total: Naira = [Naira::whole(25_000) * 2, Naira::whole(10_000)]
            .into_iter()
            .sum();
        assert_eq!(total, Naira::whole(60_000));
        assert!(Naira::whole(-1).is_negative());
        assert!(!Naira::ZERO.is_negative());
    }

    #[test]
    fn test_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Naira::whole(2500)).unwrap(), "2500.0");
        let parsed: Naira = serde_json::from_str("25000").unwrap();
        assert_eq!(parsed, Naira::whole(25_000));
    }
}
