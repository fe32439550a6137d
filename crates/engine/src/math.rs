//! Integer money math helpers.
//!
//! All intermediate products go through `u128` so no percentage or
//! rounding step can overflow a `u64` balance.

/// Floor of `amount * pct / 100`. With `pct <= 100` the result never
/// exceeds `amount`.
#[inline]
pub fn percent_of(amount: u64, pct: u8) -> u64 {
    ((amount as u128 * pct as u128) / 100) as u64
}

/// Divide rounding half-up. `rounded_div(x, 0)` is defined as 0 so
/// callers never divide a tip by an unset fee.
#[inline]
pub fn rounded_div(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    ((numerator as u128 + denominator as u128 / 2) / denominator as u128) as u64
}

/// Split a gross payout into (net, operator fee) for a fee percentage.
/// The fee is floored, the remainder goes to the player, so
/// `net + fee == gross` exactly.
#[inline]
pub fn fee_split(gross: u64, fee_pct: u8) -> (u64, u64) {
    let fee = percent_of(gross, fee_pct);
    (gross - fee, fee)
}

/// Absolute difference of two unsigned amounts.
#[inline]
pub fn abs_diff(a: u64, b: u64) -> u64 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn percent_of_floors() {
        assert_eq!(percent_of(999, 10), 99);
        assert_eq!(percent_of(10_000, 50), 5_000);
        assert_eq!(percent_of(7, 20), 1);
        assert_eq!(percent_of(u64::MAX, 100), u64::MAX);
    }

    #[test]
    fn rounded_div_rounds_half_up() {
        assert_eq!(rounded_div(1_500, 1_000), 2);
        assert_eq!(rounded_div(1_499, 1_000), 1);
        assert_eq!(rounded_div(500, 1_000), 1);
        assert_eq!(rounded_div(499, 1_000), 0);
        assert_eq!(rounded_div(42, 0), 0);
    }

    proptest! {
        #[test]
        fn percent_never_exceeds_amount(amount in any::<u64>(), pct in 0u8..=100) {
            prop_assert!(percent_of(amount, pct) <= amount);
        }

        #[test]
        fn fee_split_loses_nothing(gross in any::<u64>(), pct in 0u8..=100) {
            let (net, fee) = fee_split(gross, pct);
            prop_assert_eq!(net + fee, gross);
        }
    }
}
