//! Account health ratio.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::decimal::Decimal;
use crate::error::Result;
use crate::market::Market;
use crate::portfolio::{total_borrow_value, total_collateral_value};
use crate::position::Position;

/// Borrow lifecycle of an account.
///
/// `NeverBorrowed` is left exactly once; the other two alternate as debt is
/// taken on and repaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    NeverBorrowed,
    OutstandingDebt,
    FullyRepaid,
}

impl HealthState {
    pub fn of(account: &Account, total_borrow: &Decimal) -> Self {
        if !account.has_borrowed() {
            Self::NeverBorrowed
        } else if total_borrow.is_zero() {
            Self::FullyRepaid
        } else {
            Self::OutstandingDebt
        }
    }
}

/// Collateral value over borrow value.
///
/// - `None` if the account never borrowed: health does not apply.
/// - Raw collateral value if it borrowed but owes nothing now. This is
///   not a ratio; consumers rely on it as-is.
/// - `collateral / borrow` otherwise.
pub fn health<S: AsRef<str>>(
    account: &Account,
    held_position_ids: &[S],
    markets: &HashMap<String, Market>,
    positions: &HashMap<String, Position>,
) -> Result<Option<Decimal>> {
    if !account.has_borrowed() {
        return Ok(None);
    }

    let total_borrow = total_borrow_value(account, held_position_ids, markets, positions)?;
    let total_collateral = total_collateral_value(held_position_ids, markets, positions)?;

    if total_borrow.is_zero() {
        return Ok(Some(total_collateral));
    }
    Ok(Some(total_collateral.checked_div(&total_borrow)?))
}

/// Health strictly below `threshold` while debt is outstanding.
///
/// A fully repaid account's health is its raw collateral value, not a
/// ratio, so it is never below any threshold.
pub fn is_below(state: HealthState, health: Option<&Decimal>, threshold: &Decimal) -> bool {
    state == HealthState::OutstandingDebt && health.is_some_and(|h| h < threshold)
}

/// Health below 1.0 with debt outstanding makes an account eligible for
/// liquidation.
pub fn is_liquidatable(state: HealthState, health: Option<&Decimal>) -> bool {
    is_below(state, health, &Decimal::one())
}
