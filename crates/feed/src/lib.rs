//! Position ledger event feed.
//!
//! This crate provides:
//! - JSON-lines feed records (market snapshots and lending events)
//! - A line reader that reports parse errors with their line number
//! - Ordering checks on the `(block, log index)` cursor
//! - Replay of a feed into a ledger

mod error;
mod order;
mod reader;
mod replay;

pub use error::FeedError;
pub use order::{CursorCheck, OrderGuard};
pub use reader::{FeedReader, FeedRecord};
pub use replay::{replay, ReplayOptions, ReplayStats};
