//! Per-account collateral and borrow aggregation in the reference unit.
//!
//! `markets` is keyed by market id and `positions` by position id. Every
//! held id must resolve to a stored position whose market is known;
//! anything else is an inconsistent upstream state and is returned as an
//! error rather than skipped.

use std::collections::HashMap;

use crate::account::Account;
use crate::decimal::Decimal;
use crate::error::{LedgerError, Result};
use crate::market::Market;
use crate::normalizer::borrow_balance_underlying;
use crate::position::Position;

/// Reference-unit value of one cToken, weighted by collateral factor:
/// `collateral_factor * exchange_rate * underlying_price`.
#[inline]
pub fn token_value_in_reference_unit(market: &Market) -> Decimal {
    &(&market.collateral_factor * &market.exchange_rate) * &market.underlying_price
}

/// Resolve a held position id to its position and market.
pub(crate) fn resolve<'a>(
    position_id: &str,
    markets: &'a HashMap<String, Market>,
    positions: &'a HashMap<String, Position>,
) -> Result<(&'a Position, &'a Market)> {
    let position = positions
        .get(position_id)
        .ok_or_else(|| LedgerError::MissingPosition(position_id.to_string()))?;
    let market = markets
        .get(&position.market)
        .ok_or_else(|| LedgerError::MissingMarket(position.market.clone()))?;
    Ok((position, market))
}

/// Σ `token_value(market) * ctoken_balance` over the held positions.
pub fn total_collateral_value<S: AsRef<str>>(
    held_position_ids: &[S],
    markets: &HashMap<String, Market>,
    positions: &HashMap<String, Position>,
) -> Result<Decimal> {
    held_position_ids.iter().try_fold(Decimal::zero(), |total, id| {
        let (position, market) = resolve(id.as_ref(), markets, positions)?;
        Ok(total + token_value_in_reference_unit(market) * &position.ctoken_balance)
    })
}

/// Σ `underlying_price * borrow_balance_underlying` over the held positions.
///
/// Returns zero without touching any position when the account has never
/// borrowed.
pub fn total_borrow_value<S: AsRef<str>>(
    account: &Account,
    held_position_ids: &[S],
    markets: &HashMap<String, Market>,
    positions: &HashMap<String, Position>,
) -> Result<Decimal> {
    if !account.has_borrowed() {
        return Ok(Decimal::zero());
    }

    held_position_ids.iter().try_fold(Decimal::zero(), |total, id| {
        let (position, market) = resolve(id.as_ref(), markets, positions)?;
        Ok(total + &market.underlying_price * &borrow_balance_underlying(position, market)?)
    })
}

/// Everything aggregation needs for one account, captured at one moment.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub account: Account,
    /// Held position ids, sorted
    pub held: Vec<String>,
    /// Markets of the held positions, by market id
    pub markets: HashMap<String, Market>,
    /// Held positions, by position id
    pub positions: HashMap<String, Position>,
}

impl PortfolioSnapshot {
    pub fn total_collateral_value(&self) -> Result<Decimal> {
        total_collateral_value(&self.held, &self.markets, &self.positions)
    }

    pub fn total_borrow_value(&self) -> Result<Decimal> {
        total_borrow_value(&self.account, &self.held, &self.markets, &self.positions)
    }

    pub fn health(&self) -> Result<Option<Decimal>> {
        crate::health::health(&self.account, &self.held, &self.markets, &self.positions)
    }

    /// Held positions paired with their markets, in `held` order.
    pub fn entries(&self) -> Result<Vec<(&Position, &Market)>> {
        self.held
            .iter()
            .map(|id| resolve(id, &self.markets, &self.positions))
            .collect()
    }
}
