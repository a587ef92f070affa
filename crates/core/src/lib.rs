//! Position ledger core logic.
//!
//! This crate tracks per-account positions in cToken-style lending markets:
//! - Fixed-point decimal arithmetic over raw on-chain amounts
//! - Pluggable entity store with an in-memory implementation
//! - Idempotent position/transaction recording keyed by (tx, log index)
//! - Event handlers for supply, borrow, repay, liquidation and transfer
//! - Collateral/borrow aggregation and the account health ratio
//! - Serializable account reports
//!
//! Market state (exchange rates, borrow indices, prices) is read from a
//! [`MarketStateProvider`] and never written by the ledger.

mod account;
pub mod config;
pub mod decimal;
mod error;
mod events;
mod handlers;
pub mod health;
mod ledger;
mod market;
pub mod normalizer;
pub mod portfolio;
mod position;
mod report;
mod repository;
pub mod store;

pub use account::{address_id, normalize_id, Account};
pub use config::{config, init_config, LedgerConfig};
pub use decimal::{Decimal, DecimalError};
pub use error::{LedgerError, Result};
pub use events::{EventKind, EventMeta, LedgerEvent};
pub use handlers::{apply_event, Applied};
pub use health::{health, is_below, is_liquidatable, HealthState};
pub use ledger::Ledger;
pub use market::{Market, MarketBook, MarketStateProvider};
pub use portfolio::{total_borrow_value, total_collateral_value, PortfolioSnapshot};
pub use position::{position_id, transaction_id, Position, TransactionRecord};
pub use report::{AccountSummary, PositionSummary};
pub use repository::{Repository, Touched};
pub use store::{Entity, EntityKind, MemoryStore, Store, StoreError};
