//! Underlying-denominated balances from stored position state.

use crate::decimal::Decimal;
use crate::error::Result;
use crate::market::Market;
use crate::position::Position;

/// Supplied underlying: `ctoken_balance * exchange_rate`.
#[inline]
pub fn supply_balance_underlying(position: &Position, market: &Market) -> Decimal {
    &position.ctoken_balance * &market.exchange_rate
}

/// Borrowed underlying, accrued forward to the market's current index:
/// `stored_borrow_balance * borrow_index / account_borrow_index`.
///
/// A zero snapshot index means no borrow was ever recorded on this position
/// and yields zero. A division error past that check is returned, never
/// read as zero debt.
pub fn borrow_balance_underlying(position: &Position, market: &Market) -> Result<Decimal> {
    if position.account_borrow_index.is_zero() {
        return Ok(Decimal::zero());
    }
    let scaled = &position.stored_borrow_balance * &market.borrow_index;
    Ok(scaled.checked_div(&position.account_borrow_index)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::tests::market;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn position() -> Position {
        Position::new("m-a", "cM", "a", "m")
    }

    #[test]
    fn test_supply_balance_underlying() {
        let mut pos = position();
        pos.ctoken_balance = d("100");

        let m = market("m", "0.02", "1");
        assert_eq!(supply_balance_underlying(&pos, &m), d("2.0"));
    }

    #[test]
    fn test_borrow_balance_accrues_with_index() {
        let mut pos = position();
        pos.stored_borrow_balance = d("50");
        pos.account_borrow_index = d("1.0");

        let m = market("m", "0.02", "1.1");
        assert_eq!(borrow_balance_underlying(&pos, &m).unwrap(), d("55.0"));
    }

    #[test]
    fn test_borrow_balance_zero_without_snapshot() {
        let mut pos = position();
        pos.stored_borrow_balance = d("50");

        let m = market("m", "0.02", "1.1");
        assert!(borrow_balance_underlying(&pos, &m).unwrap().is_zero());
    }

    #[test]
    fn test_borrow_balance_multiplies_before_dividing() {
        // 10 * 4 / 3 = 13.333333333333333333; dividing first would give
        // 1.333333333333333333 * 10 = 13.33333333333333333.
        let mut pos = position();
        pos.stored_borrow_balance = d("10");
        pos.account_borrow_index = d("3");

        let m = market("m", "0.02", "4");
        assert_eq!(borrow_balance_underlying(&pos, &m).unwrap(), d("13.333333333333333333"));
    }

    #[test]
    fn test_borrow_balance_zero_snapshot_is_ok_zero() {
        // Stored balance with no snapshot index is a zero balance, not a
        // division error.
        let mut pos = position();
        pos.stored_borrow_balance = d("50");

        let m = market("m", "0.02", "0");
        let balance = borrow_balance_underlying(&pos, &m);
        assert!(matches!(balance, Ok(ref b) if b.is_zero()));
    }

    proptest! {
        #[test]
        fn prop_zero_index_always_zero(stored in 0u64..1_000_000_000, index in 1u64..10_000) {
            let mut pos = position();
            pos.stored_borrow_balance = Decimal::from(stored);

            let m = market("m", "0.02", &index.to_string());
            prop_assert!(borrow_balance_underlying(&pos, &m).unwrap().is_zero());
        }

        #[test]
        fn prop_unchanged_index_returns_stored(stored in 0u64..1_000_000_000, index in 1u64..10_000) {
            let mut pos = position();
            pos.stored_borrow_balance = Decimal::from(stored);
            pos.account_borrow_index = Decimal::from(index);

            let m = market("m", "0.02", &index.to_string());
            prop_assert_eq!(borrow_balance_underlying(&pos, &m).unwrap(), Decimal::from(stored));
        }
    }
}
