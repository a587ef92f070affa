//! Per-account, per-market position records and their transaction log.

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::store::{Entity, EntityKind};

/// Composite key of a position: `market-account`.
pub fn position_id(market_id: &str, account_id: &str) -> String {
    format!("{market_id}-{account_id}")
}

/// Composite key of a transaction record: `position-txhash-logindex`.
pub fn transaction_id(position_id: &str, tx_hash: &B256, log_index: u64) -> String {
    format!("{position_id}-{tx_hash}-{log_index}")
}

/// An account's stake in one lending market ("AccountCToken").
///
/// Balances are stored raw: `stored_borrow_balance` is only meaningful
/// together with `account_borrow_index`, the market borrow index at the
/// time it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub market: String,
    pub account: String,
    /// Block of the last event that touched this position
    pub accrual_block_number: u64,
    /// cToken balance (8 decimals)
    pub ctoken_balance: Decimal,
    pub total_underlying_supplied: Decimal,
    pub total_underlying_redeemed: Decimal,
    /// Market borrow index at the last borrow-affecting event; zero if none
    pub account_borrow_index: Decimal,
    pub total_underlying_borrowed: Decimal,
    pub total_underlying_repaid: Decimal,
    /// Borrow balance as of `account_borrow_index`
    pub stored_borrow_balance: Decimal,
    /// Whether the account entered this market as collateral
    pub entered_market: bool,
}

impl Position {
    /// A fresh position with every balance and accumulator at zero.
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        account: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            market: market.into(),
            account: account.into(),
            accrual_block_number: 0,
            ctoken_balance: Decimal::zero(),
            total_underlying_supplied: Decimal::zero(),
            total_underlying_redeemed: Decimal::zero(),
            account_borrow_index: Decimal::zero(),
            total_underlying_borrowed: Decimal::zero(),
            total_underlying_repaid: Decimal::zero(),
            stored_borrow_balance: Decimal::zero(),
            entered_market: false,
        }
    }

    /// Whether any borrow snapshot has ever been recorded.
    pub fn has_borrow_snapshot(&self) -> bool {
        !self.account_borrow_index.is_zero()
    }
}

impl Entity for Position {
    const KIND: EntityKind = EntityKind::Position;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Audit log entry for one event applied to one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    /// Owning position id
    pub position: String,
    pub tx_hash: B256,
    /// Block timestamp (unix seconds)
    pub timestamp: u64,
    pub block: u64,
    pub log_index: u64,
}

impl TransactionRecord {
    pub fn new(position: &str, tx_hash: B256, timestamp: u64, block: u64, log_index: u64) -> Self {
        Self {
            id: transaction_id(position, &tx_hash, log_index),
            position: position.to_string(),
            tx_hash,
            timestamp,
            block,
            log_index,
        }
    }

    /// Block timestamp as UTC, if representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.timestamp).ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}

impl Entity for TransactionRecord {
    const KIND: EntityKind = EntityKind::Transaction;

    fn id(&self) -> &str {
        &self.id
    }
}
