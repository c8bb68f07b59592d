//! # Money — Integer Centavo Arithmetic
//!
//! Every amount in VELA is a `u64` count of centavos. No floating point
//! anywhere near a balance: floats are for physics simulations, not for
//! other people's rent money. The display scale lives in
//! [`crate::config::CENTAVOS_PER_REAL`] and arithmetic never divides.
//!
//! All arithmetic that could overflow is checked. A credit that would wrap
//! a `u64` is rejected, not wrapped — at 184 quadrillion reais we would
//! have macroeconomic problems no wallet backend can fix, but the ledger
//! still refuses to corrupt itself on the way down.

use std::fmt;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::config::CENTAVOS_PER_REAL;

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A monetary amount in centavos.
///
/// `Amount` is `Copy` and totally ordered, so balance comparisons read the
/// way the business rule is written: `balance >= amount`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero centavos. The balance every account opens with.
    pub const ZERO: Amount = Amount(0);

    /// Construct from a raw centavo count.
    pub const fn from_centavos(centavos: u64) -> Self {
        Amount(centavos)
    }

    /// Construct from whole reais. Saturates at `u64::MAX` centavos rather
    /// than overflowing, which only matters for absurd inputs.
    pub const fn from_reais(reais: u64) -> Self {
        Amount(reais.saturating_mul(CENTAVOS_PER_REAL))
    }

    /// The raw centavo count.
    pub const fn centavos(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction. `None` if `other` exceeds `self`, which is how
    /// the non-negative-balance invariant surfaces at the arithmetic level.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Saturating addition, for reporting aggregates only. The ledger itself
    /// always uses the checked form.
    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    /// Renders as `R$ 12,34`. Display only — parsing and arithmetic never
    /// touch this representation.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R$ {},{:02}",
            self.0 / CENTAVOS_PER_REAL,
            self.0 % CENTAVOS_PER_REAL
        )
    }
}

impl Sum for Amount {
    /// Saturating sum, for reporting aggregates (admin volume totals).
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Amount::saturating_add)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_agree_on_scale() {
        assert_eq!(Amount::from_reais(50), Amount::from_centavos(5_000));
        assert_eq!(Amount::from_reais(0), Amount::ZERO);
    }

    #[test]
    fn ordering_reads_like_the_business_rule() {
        let balance = Amount::from_reais(50);
        let price = Amount::from_reais(20);
        assert!(balance >= price);
        assert!(price < balance);
    }

    #[test]
    fn checked_add_catches_overflow() {
        let max = Amount::from_centavos(u64::MAX);
        assert_eq!(max.checked_add(Amount::from_centavos(1)), None);
        assert_eq!(
            Amount::from_centavos(1).checked_add(Amount::from_centavos(2)),
            Some(Amount::from_centavos(3))
        );
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        let small = Amount::from_reais(5);
        let big = Amount::from_reais(15);
        assert_eq!(small.checked_sub(big), None);
        assert_eq!(big.checked_sub(small), Some(Amount::from_reais(10)));
    }

    #[test]
    fn display_uses_comma_decimals() {
        assert_eq!(Amount::from_centavos(1_234).to_string(), "R$ 12,34");
        assert_eq!(Amount::from_centavos(5).to_string(), "R$ 0,05");
        assert_eq!(Amount::ZERO.to_string(), "R$ 0,00");
    }

    #[test]
    fn sum_saturates_instead_of_panicking() {
        let total: Amount = [Amount::from_centavos(u64::MAX), Amount::from_centavos(10)]
            .into_iter()
            .sum();
        assert_eq!(total, Amount::from_centavos(u64::MAX));
    }
}
