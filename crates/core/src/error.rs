//! Ledger error taxonomy.

use thiserror::Error;

use crate::decimal::DecimalError;
use crate::store::StoreError;

/// Errors surfaced by the ledger core.
///
/// Replayed transactions are absorbed and never show up here.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A position (or event) references a market the provider does not know.
    #[error("market '{0}' not found")]
    MissingMarket(String),

    /// A held position id has no stored position record.
    #[error("position '{0}' not found")]
    MissingPosition(String),

    /// A borrow-affecting event arrived while the market's borrow index is zero,
    /// which would leave a borrow balance without a usable index snapshot.
    #[error("market '{market}' has a zero borrow index; cannot snapshot borrow for '{position}'")]
    ZeroBorrowIndex { market: String, position: String },

    /// A market snapshot failed validation.
    #[error("invalid market '{market}': {reason}")]
    InvalidMarket { market: String, reason: String },

    #[error(transparent)]
    Decimal(#[from] DecimalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
