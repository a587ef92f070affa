//! Position Ledger
//!
//! Replays a lending-market event feed into the position ledger and writes
//! per-account collateral, borrow and health reports.
//! Features:
//! - JSON-lines feed with market snapshots and lending events
//! - Idempotent replay keyed by (tx hash, log index)
//! - Profile-based configuration (default/strict/audit)
//! - At-risk account warnings

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledger_core::config::ReportConfig;
use ledger_core::{init_config, AccountSummary, Ledger, LedgerConfig, MarketBook, MemoryStore};
use ledger_feed::{replay, FeedReader, ReplayOptions, ReplayStats};

/// Report document written at the end of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    generated_at: DateTime<Utc>,
    profile: String,
    replay: ReplayStats,
    at_risk: usize,
    liquidatable: usize,
    accounts: Vec<AccountSummary>,
}

fn main() -> Result<()> {
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // LEDGER_CONFIG selects a file, otherwise LEDGER_PROFILE a built-in profile
    let ledger_config = LedgerConfig::load()?;
    ledger_config.log_config();
    init_config(ledger_config);
    let config = ledger_core::config();

    let events_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.feed.events_path.clone());
    info!(path = %events_path, "Replaying event feed");

    let ledger = Ledger::new(Arc::new(MemoryStore::new()), Arc::new(MarketBook::new()));
    let reader = FeedReader::open(&events_path)
        .with_context(|| format!("Failed to open event feed {events_path}"))?;
    let stats = replay(reader, &ledger, ReplayOptions::from(&config.feed))?;

    let summaries = ledger.summaries()?;
    let at_risk = summaries
        .iter()
        .filter(|summary| summary.is_at_risk())
        .inspect(|summary| {
            warn!(
                account = %summary.account,
                health = ?summary.health.as_ref().map(ToString::to_string),
                collateral = %summary.total_collateral_value,
                borrow = %summary.total_borrow_value,
                liquidatable = summary.is_liquidatable(),
                "Account at risk"
            );
        })
        .count();
    let liquidatable = summaries.iter().filter(|summary| summary.is_liquidatable()).count();

    let accounts = if config.report.include_positions {
        summaries
    } else {
        summaries.into_iter().map(AccountSummary::without_positions).collect()
    };

    info!(accounts = accounts.len(), at_risk, liquidatable, "Ledger replay finished");

    let report = Report {
        generated_at: Utc::now(),
        profile: config.profile.clone(),
        replay: stats,
        at_risk,
        liquidatable,
        accounts,
    };
    write_report(&report, &config.report)
}

fn init_tracing() {
    // Logs go to stderr; stdout carries the report when no output path is set.
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ledger_core=debug,ledger_feed=debug")),
        )
        .init();
}

fn write_report(report: &Report, config: &ReportConfig) -> Result<()> {
    let body = if config.pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };

    match &config.output_path {
        Some(path) => {
            std::fs::write(path, body + "\n")
                .with_context(|| format!("Failed to write report to {path}"))?;
            info!(path = %path, "Report written");
        }
        None => println!("{body}"),
    }
    Ok(())
}

fn print_banner() {
    eprintln!(
        r#"
    ╦  ┌─┐┌┬┐┌─┐┌─┐┬─┐
    ║  ├┤  │││ ┬├┤ ├┬┘
    ╩═╝└─┘─┴┘└─┘└─┘┴└─
    Position Ledger v0.1.0
    "#
    );
}
