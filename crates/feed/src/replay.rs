//! Drive a [`Ledger`] from a feed.

use std::io::BufRead;

use ledger_core::config::FeedConfig;
use ledger_core::{Ledger, MarketBook, Store};
use serde::Serialize;
use tracing::{error, info};

use crate::error::FeedError;
use crate::order::{CursorCheck, OrderGuard};
use crate::reader::{FeedReader, FeedRecord};

/// Replay settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    pub enforce_ordering: bool,
    /// Log progress every N events (0 disables)
    pub progress_every: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for ReplayOptions {
    fn from(config: &FeedConfig) -> Self {
        Self {
            enforce_ordering: config.enforce_ordering,
            progress_every: config.progress_every,
        }
    }
}

/// Counters from one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStats {
    /// Market snapshots applied
    pub markets: u64,
    /// Events applied, replays included
    pub events: u64,
    /// Events whose every touched position had already seen them
    pub replayed: u64,
    /// Events that touched no position (mint/redeem transfer legs)
    pub skipped: u64,
    /// Events tolerated with a cursor below the high-water mark
    pub out_of_order: u64,
    pub last_block: Option<u64>,
}

/// Apply every record from `reader` to `ledger`, in feed order.
///
/// Market records update the ledger's [`MarketBook`]. An earlier event
/// delivered again is absorbed as a replay even when ordering is enforced.
/// Stops at the first error.
pub fn replay<R, S>(
    reader: FeedReader<R>,
    ledger: &Ledger<S, MarketBook>,
    options: ReplayOptions,
) -> Result<ReplayStats, FeedError>
where
    R: BufRead,
    S: Store,
{
    let mut stats = ReplayStats::default();
    let mut guard = OrderGuard::new(options.enforce_ordering);
    let mut reader = reader;

    while let Some(record) = reader.next() {
        let line = reader.line();
        let outcome = record.and_then(|record| match record {
            FeedRecord::Market(market) => {
                ledger.markets().upsert(market)?;
                stats.markets += 1;
                Ok(())
            }
            FeedRecord::Event(event) => {
                let check = guard.check(&event.meta, || Ok(ledger.is_applied(&event)?))?;
                if check == CursorCheck::Regressed {
                    stats.out_of_order += 1;
                }

                let applied = ledger.apply(&event)?;
                stats.events += 1;
                if applied.touched.is_empty() {
                    stats.skipped += 1;
                } else if applied.replayed {
                    stats.replayed += 1;
                }

                if options.progress_every > 0 && stats.events % options.progress_every == 0 {
                    info!(
                        events = stats.events,
                        replayed = stats.replayed,
                        block = event.meta.block_number,
                        "Replay progress"
                    );
                }
                Ok(())
            }
        });

        if let Err(e) = outcome {
            error!(line, error = %e, "Replay stopped");
            return Err(e);
        }
    }

    stats.last_block = guard.last().map(|(block, _)| block);
    info!(
        markets = stats.markets,
        events = stats.events,
        replayed = stats.replayed,
        skipped = stats.skipped,
        out_of_order = stats.out_of_order,
        last_block = ?stats.last_block,
        "Replay complete"
    );
    Ok(stats)
}
