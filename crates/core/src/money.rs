//! Money (non-negative, integer cents).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DomainError, DomainResult};

/// A non-negative amount of money in the smallest currency unit (cents).
///
/// Arithmetic is done on integer cents; the decimal form only exists at the
/// JSON boundary, where amounts travel as plain numbers (`12.5`).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Build from a decimal amount, rounding to the nearest cent.
    pub fn from_decimal(amount: f64) -> DomainResult<Self> {
        if !amount.is_finite() {
            return Err(DomainError::validation("amount must be a finite number"));
        }
        if amount < 0.0 {
            return Err(DomainError::validation("amount must be non-negative"));
        }
        let cents = (amount * 100.0).round();
        if cents > u64::MAX as f64 {
            return Err(DomainError::validation("amount is too large"));
        }
        Ok(Self(cents as u64))
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Used by report totals, where clamping beats failing a read.
    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    pub fn checked_mul(self, quantity: u64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    /// Mean of `count` amounts totalling `self`, rounded half up to the cent.
    pub fn average(self, count: u64) -> Money {
        if count == 0 {
            return Money::ZERO;
        }
        Money(self.0 / count + u64::from(self.0 % count >= count - count / 2))
    }

    /// Sum a sequence of amounts; `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_decimal(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_amounts_round_to_cents() {
        assert_eq!(Money::from_decimal(12.345).unwrap().cents(), 1235);
        assert_eq!(Money::from_decimal(0.1 + 0.2).unwrap().cents(), 30);
        assert_eq!(Money::from_decimal(0.0).unwrap(), Money::ZERO);
    }

    #[test]
    fn negative_and_non_finite_amounts_are_rejected() {
        assert!(matches!(Money::from_decimal(-0.01), Err(DomainError::Validation(_))));
        assert!(matches!(Money::from_decimal(f64::NAN), Err(DomainError::Validation(_))));
        assert!(matches!(Money::from_decimal(f64::INFINITY), Err(DomainError::Validation(_))));
    }

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Money::from_cents(1205).to_string(), "12.05");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn json_uses_decimal_numbers() {
        let m: Money = serde_json::from_str("19.99").unwrap();
        assert_eq!(m.cents(), 1999);
        assert_eq!(serde_json::to_string(&Money::from_cents(250)).unwrap(), "2.5");
        assert!(serde_json::from_str::<Money>("-1").is_err());
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = Money::from_cents(100);
        assert_eq!(a.saturating_sub(Money::from_cents(250)), Money::ZERO);
    }

    #[test]
    fn checked_sum_detects_overflow() {
        let big = Money::from_cents(u64::MAX);
        assert!(Money::checked_sum([big, Money::from_cents(1)]).is_none());
        assert_eq!(
            Money::checked_sum([Money::from_cents(1), Money::from_cents(2)]),
            Some(Money::from_cents(3))
        );
    }

    #[test]
    fn average_rounds_half_up() {
        assert_eq!(Money::from_cents(10).average(4), Money::from_cents(3));
        assert_eq!(Money::from_cents(10).average(3), Money::from_cents(3));
        assert_eq!(Money::from_cents(11).average(3), Money::from_cents(4));
        assert_eq!(Money::from_cents(11).average(0), Money::ZERO);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: line totals computed in cents never depend on line order.
            #[test]
            fn sum_is_order_independent(lines in prop::collection::vec((0u64..100_000, 1u64..1_000), 0..20)) {
                let forward = Money::checked_sum(
                    lines.iter().map(|(p, q)| Money::from_cents(*p).checked_mul(*q).unwrap()),
                );
                let backward = Money::checked_sum(
                    lines.iter().rev().map(|(p, q)| Money::from_cents(*p).checked_mul(*q).unwrap()),
                );
                prop_assert_eq!(forward, backward);
            }

            /// Property: any cent amount survives the decimal JSON boundary.
            #[test]
            fn decimal_boundary_preserves_cents(cents in 0u64..100_000_000_000) {
                let m = Money::from_cents(cents);
                prop_assert_eq!(Money::from_decimal(m.as_decimal()).unwrap(), m);
            }
        }
    }
}
