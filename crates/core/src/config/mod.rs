//! Configuration for the ledger runtime.
//!
//! This module provides:
//! - Ledger configuration (profiles, feed input, report output)
//! - `${VAR}` expansion for paths
//! - A process-wide configuration holder

mod settings;

pub use settings::{config, init_config, FeedConfig, LedgerConfig, ReportConfig};
