//! Event ordering checks.

use ledger_core::EventMeta;
use tracing::{debug, warn};

use crate::error::FeedError;

/// Where an event's cursor falls relative to the last one seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCheck {
    Advanced,
    /// Same `(block, log index)` as the last event: a replay
    Repeated,
    /// Lower cursor for an event the ledger has already applied: a replay
    Redelivered,
    /// Lower cursor for a new event, passed through because ordering is
    /// not enforced
    Regressed,
}

/// Tracks the highest `(block_number, log_index)` cursor seen so far.
#[derive(Debug, Clone)]
pub struct OrderGuard {
    last: Option<(u64, u64)>,
    enforce: bool,
}

impl OrderGuard {
    pub fn new(enforce: bool) -> Self {
        Self {
            last: None,
            enforce,
        }
    }

    pub fn last(&self) -> Option<(u64, u64)> {
        self.last
    }

    /// Check `meta` against the last cursor and advance.
    ///
    /// `already_applied` is only consulted for a lower cursor. An event
    /// that was already applied is a replay and always passes. A new event
    /// with a lower cursor is an error when ordering is enforced; otherwise
    /// it is logged. The high-water mark never moves back.
    pub fn check<F>(&mut self, meta: &EventMeta, already_applied: F) -> Result<CursorCheck, FeedError>
    where
        F: FnOnce() -> Result<bool, FeedError>,
    {
        let cursor = meta.cursor();
        let Some(last) = self.last else {
            self.last = Some(cursor);
            return Ok(CursorCheck::Advanced);
        };

        if cursor > last {
            self.last = Some(cursor);
            return Ok(CursorCheck::Advanced);
        }
        if cursor == last {
            return Ok(CursorCheck::Repeated);
        }

        if already_applied()? {
            debug!(
                block = cursor.0,
                log_index = cursor.1,
                "Earlier event redelivered"
            );
            return Ok(CursorCheck::Redelivered);
        }

        if self.enforce {
            return Err(FeedError::OutOfOrder {
                block: cursor.0,
                log_index: cursor.1,
                last_block: last.0,
                last_log_index: last.1,
            });
        }
        warn!(
            block = cursor.0,
            log_index = cursor.1,
            last_block = last.0,
            last_log_index = last.1,
            "Event out of order"
        );
        Ok(CursorCheck::Regressed)
    }
}
