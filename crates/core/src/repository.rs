//! Load-or-create access to accounts, positions and transaction records.
//!
//! Every get-or-create goes through [`Store::load_or_create`], so a record
//! is created at most once per key even with concurrent callers. The
//! repository also keeps a reverse index from account to held position ids,
//! the derived `Account -> [Position]` relationship.

use std::sync::Arc;

use alloy::primitives::B256;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::account::Account;
use crate::error::Result;
use crate::events::EventMeta;
use crate::position::{position_id, transaction_id, Position, TransactionRecord};
use crate::store::{EntityKind, Store};

/// Position returned by [`Repository::touch_position`].
#[derive(Debug, Clone)]
pub struct Touched {
    /// Position with `accrual_block_number` moved to the event block
    pub position: Position,
    /// The `(position, tx, log)` key had already been recorded
    pub replayed: bool,
}

/// Repository adapter over a [`Store`].
pub struct Repository<S> {
    store: Arc<S>,
    /// Reverse index: account id -> position ids
    holdings: DashMap<String, DashSet<String>>,
}

impl<S: Store> Repository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            holdings: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // Accounts

    pub fn get_or_create_account(&self, account_id: &str) -> Result<Account> {
        let (account, created) = self
            .store
            .load_or_create(account_id, || Account::new(account_id))?;
        if created {
            debug!(account = account_id, "Account created");
        }
        Ok(account)
    }

    pub fn load_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.store.load(account_id)?)
    }

    pub fn save_account(&self, account: &Account) -> Result<()> {
        Ok(self.store.save(account)?)
    }

    /// Every stored account, sorted by id.
    pub fn accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = self.store.scan::<Account>()?;
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accounts)
    }

    // Positions

    /// Load the position for `market_id x account_id`, creating a zeroed one
    /// if none exists.
    pub fn get_or_create_position(
        &self,
        market_id: &str,
        symbol: &str,
        account_id: &str,
    ) -> Result<Position> {
        let id = position_id(market_id, account_id);
        let (position, created) = self
            .store
            .load_or_create(&id, || Position::new(id.clone(), symbol, account_id, market_id))?;

        if created {
            debug!(position = %id, symbol, "Position created");
        }
        self.index_holding(account_id, &id);
        Ok(position)
    }

    pub fn load_position(&self, position_id: &str) -> Result<Option<Position>> {
        Ok(self.store.load(position_id)?)
    }

    pub fn save_position(&self, position: &Position) -> Result<()> {
        self.store.save(position)?;
        self.index_holding(&position.account, &position.id);
        Ok(())
    }

    // Transactions

    /// Record one event against a position. Idempotent per
    /// `(position, tx_hash, log_index)`: a repeat returns the stored record.
    pub fn record_transaction(
        &self,
        position_id: &str,
        tx_hash: B256,
        timestamp: u64,
        block: u64,
        log_index: u64,
    ) -> Result<TransactionRecord> {
        self.record(position_id, tx_hash, timestamp, block, log_index)
            .map(|(record, _)| record)
    }

    fn record(
        &self,
        position_id: &str,
        tx_hash: B256,
        timestamp: u64,
        block: u64,
        log_index: u64,
    ) -> Result<(TransactionRecord, bool)> {
        let id = transaction_id(position_id, &tx_hash, log_index);
        let (record, created) = self.store.load_or_create(&id, || {
            TransactionRecord::new(position_id, tx_hash, timestamp, block, log_index)
        })?;
        Ok((record, created))
    }

    /// Whether `(position, tx_hash, log_index)` has been recorded.
    pub fn has_transaction(&self, position_id: &str, tx_hash: &B256, log_index: u64) -> Result<bool> {
        let id = transaction_id(position_id, tx_hash, log_index);
        Ok(self.store.load::<TransactionRecord>(&id)?.is_some())
    }

    pub fn transaction_count(&self) -> usize {
        self.store.count(EntityKind::Transaction)
    }

    // Event composition

    /// Get-or-create the position, record the transaction and move the
    /// position's accrual block to the event block.
    ///
    /// The returned position is not persisted; the caller applies the
    /// event-specific changes and saves it.
    pub fn update_position_on_event(
        &self,
        meta: &EventMeta,
        market_symbol: &str,
        account_id: &str,
    ) -> Result<Position> {
        self.touch_position(meta, market_symbol, account_id)
            .map(|touched| touched.position)
    }

    /// Same as [`Self::update_position_on_event`], also reporting whether the
    /// transaction key had been seen before.
    pub fn touch_position(
        &self,
        meta: &EventMeta,
        market_symbol: &str,
        account_id: &str,
    ) -> Result<Touched> {
        let mut position = self.get_or_create_position(&meta.market, market_symbol, account_id)?;
        let (_, created) = self.record(
            &position.id,
            meta.tx_hash,
            meta.timestamp,
            meta.block_number,
            meta.log_index,
        )?;
        position.accrual_block_number = meta.block_number;

        Ok(Touched {
            position,
            replayed: !created,
        })
    }

    // Holdings

    /// Position ids held by `account_id`, sorted.
    pub fn held_positions(&self, account_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .holdings
            .get(account_id)
            .map(|set| set.iter().map(|id| id.key().clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Account ids with at least one position, sorted.
    pub fn holders(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.holdings.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Rebuild the holdings index from the store, e.g. after attaching to a
    /// pre-populated store. Returns the number of positions indexed.
    pub fn rebuild_holdings(&self) -> Result<usize> {
        let positions = self.store.scan::<Position>()?;
        self.holdings.clear();
        for position in &positions {
            self.index_holding(&position.account, &position.id);
        }
        debug!(positions = positions.len(), "Holdings index rebuilt");
        Ok(positions.len())
    }

    fn index_holding(&self, account_id: &str, position_id: &str) {
        self.holdings
            .entry(account_id.to_string())
            .or_default()
            .insert(position_id.to_string());
    }
}
