use ledger_core::LedgerError;
use thiserror::Error;

/// Errors raised while reading or replaying an event feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line that is not a valid feed record (1-based line number)
    #[error("line {line}: invalid feed record: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "event at block {block} log {log_index} arrived after block {last_block} log {last_log_index}"
    )]
    OutOfOrder {
        block: u64,
        log_index: u64,
        last_block: u64,
        last_log_index: u64,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
