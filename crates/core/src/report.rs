//! Serializable per-account reports.

use serde::{Deserialize, Serialize};

use crate::config::config;
use crate::decimal::Decimal;
use crate::error::Result;
use crate::health::{self, HealthState};
use crate::normalizer::{borrow_balance_underlying, supply_balance_underlying};
use crate::portfolio::PortfolioSnapshot;

/// One held position with its underlying-denominated balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSummary {
    pub position: String,
    pub market: String,
    pub symbol: String,
    pub entered_market: bool,
    pub ctoken_balance: Decimal,
    pub supply_balance_underlying: Decimal,
    pub borrow_balance_underlying: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub account: String,
    pub has_borrowed: bool,
    pub count_liquidated: u32,
    pub count_liquidator: u32,
    pub total_collateral_value: Decimal,
    pub total_borrow_value: Decimal,
    pub health: Option<Decimal>,
    pub state: HealthState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<PositionSummary>,
}

impl AccountSummary {
    pub fn from_snapshot(snapshot: &PortfolioSnapshot) -> Result<Self> {
        let total_collateral_value = snapshot.total_collateral_value()?;
        let total_borrow_value = snapshot.total_borrow_value()?;
        let health = snapshot.health()?;

        let positions = snapshot
            .entries()?
            .into_iter()
            .map(|(position, market)| {
                Ok(PositionSummary {
                    position: position.id.clone(),
                    market: market.id.clone(),
                    symbol: position.symbol.clone(),
                    entered_market: position.entered_market,
                    ctoken_balance: position.ctoken_balance.clone(),
                    supply_balance_underlying: supply_balance_underlying(position, market),
                    borrow_balance_underlying: borrow_balance_underlying(position, market)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let account = &snapshot.account;
        Ok(Self {
            account: account.id.clone(),
            has_borrowed: account.has_borrowed(),
            count_liquidated: account.count_liquidated,
            count_liquidator: account.count_liquidator,
            state: HealthState::of(account, &total_borrow_value),
            total_collateral_value,
            total_borrow_value,
            health,
            positions,
        })
    }

    /// Health strictly below `threshold`. Only accounts with outstanding
    /// debt carry a ratio; every other account is never below it.
    pub fn is_below(&self, threshold: &Decimal) -> bool {
        health::is_below(self.state, self.health.as_ref(), threshold)
    }

    pub fn is_liquidatable(&self) -> bool {
        health::is_liquidatable(self.state, self.health.as_ref())
    }

    /// Health below the configured at-risk threshold.
    pub fn is_at_risk(&self) -> bool {
        self.is_below(&config().report.at_risk_threshold)
    }

    pub fn without_positions(mut self) -> Self {
        self.positions.clear();
        self
    }
}
