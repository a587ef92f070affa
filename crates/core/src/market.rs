//! Market state and the provider the ledger reads it from.
//!
//! Markets are owned by an external accrual process. The ledger only reads
//! them; [`MarketBook`] is the in-process provider that process writes into.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::account::normalize_id;
use crate::decimal::Decimal;
use crate::error::{LedgerError, Result};

/// One lending market (cToken) as of the current block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// cToken contract address (lower-case hex)
    pub id: String,
    pub symbol: String,
    /// Decimals of the underlying asset
    pub underlying_decimals: u32,
    /// cToken -> underlying
    pub exchange_rate: Decimal,
    /// Accrual index; non-decreasing
    pub borrow_index: Decimal,
    /// Fraction of value usable as borrowing power, in [0, 1]
    pub collateral_factor: Decimal,
    /// Underlying price in the reference unit
    pub underlying_price: Decimal,
}

impl Market {
    /// Check the snapshot's ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| LedgerError::InvalidMarket {
            market: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.collateral_factor.is_negative() || self.collateral_factor > Decimal::one() {
            return Err(invalid("collateral factor outside [0, 1]"));
        }
        if self.exchange_rate.is_negative() {
            return Err(invalid("negative exchange rate"));
        }
        if self.borrow_index.is_negative() {
            return Err(invalid("negative borrow index"));
        }
        if self.underlying_price.is_negative() {
            return Err(invalid("negative underlying price"));
        }
        Ok(())
    }
}

/// Source of current market state.
pub trait MarketStateProvider: Send + Sync {
    fn market(&self, id: &str) -> Option<Market>;

    /// Snapshot of every known market keyed by id.
    fn markets(&self) -> HashMap<String, Market>;
}

/// Concurrent in-memory market table.
#[derive(Debug, Default)]
pub struct MarketBook {
    markets: DashMap<String, Market>,
}

impl MarketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a market after validating it. The id is stored in
    /// normalised form.
    ///
    /// A borrow index lower than the one already held is accepted but
    /// logged, since the accrual process is the source of truth.
    pub fn upsert(&self, mut market: Market) -> Result<()> {
        market.validate()?;
        market.id = normalize_id(&market.id);

        if let Some(previous) = self.markets.get(&market.id) {
            if market.borrow_index < previous.borrow_index {
                tracing::warn!(
                    market = %market.id,
                    previous = %previous.borrow_index,
                    next = %market.borrow_index,
                    "Borrow index moved backwards"
                );
            }
        }

        debug!(
            market = %market.id,
            symbol = %market.symbol,
            exchange_rate = %market.exchange_rate,
            borrow_index = %market.borrow_index,
            price = %market.underlying_price,
            "Market updated"
        );
        self.markets.insert(market.id.clone(), market);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl MarketStateProvider for MarketBook {
    fn market(&self, id: &str) -> Option<Market> {
        self.markets.get(id).map(|m| m.clone())
    }

    fn markets(&self) -> HashMap<String, Market> {
        self.markets
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
