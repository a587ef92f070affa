//! Ledger runtime configuration with profile support.
//!
//! Provides centralized settings for the event feed and account reports
//! with named profiles (default, strict, audit).

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Event feed input
    #[serde(default)]
    pub feed: FeedConfig,

    /// Account report output
    #[serde(default)]
    pub report: ReportConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Event feed input settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// JSON-lines event file; `${VAR}` is expanded
    #[serde(default = "default_events_path")]
    pub events_path: String,

    /// Reject events whose (block, log index) cursor goes backwards
    #[serde(default = "default_enforce_ordering")]
    pub enforce_ordering: bool,

    /// Log replay progress every N events (0 disables)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_events_path() -> String {
    "data/events.jsonl".to_string()
}
fn default_enforce_ordering() -> bool {
    true
}
fn default_progress_every() -> u64 {
    10_000
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            events_path: default_events_path(),
            enforce_ordering: default_enforce_ordering(),
            progress_every: default_progress_every(),
        }
    }
}

/// Account report settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report file; stdout when unset. `${VAR}` is expanded, and a path that
    /// expands to nothing counts as unset.
    #[serde(default)]
    pub output_path: Option<String>,

    #[serde(default = "default_pretty")]
    pub pretty: bool,

    /// Emit per-position detail for each account
    #[serde(default = "default_include_positions")]
    pub include_positions: bool,

    /// Health strictly below this flags an account as at risk
    #[serde(default = "default_at_risk_threshold")]
    pub at_risk_threshold: Decimal,
}

fn default_pretty() -> bool {
    true
}
fn default_include_positions() -> bool {
    true
}
fn default_at_risk_threshold() -> Decimal {
    Decimal::one()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            pretty: default_pretty(),
            include_positions: default_include_positions(),
            at_risk_threshold: default_at_risk_threshold(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            feed: FeedConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file, expanding `${VAR}` in paths.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Ordering enforced, compact account-level reports.
    pub fn strict() -> Self {
        Self {
            profile: "strict".to_string(),
            feed: FeedConfig {
                enforce_ordering: true,
                ..FeedConfig::default()
            },
            report: ReportConfig {
                pretty: false,
                include_positions: false,
                ..ReportConfig::default()
            },
        }
    }

    /// Ordering anomalies tolerated, full pretty reports.
    pub fn audit() -> Self {
        Self {
            profile: "audit".to_string(),
            feed: FeedConfig {
                enforce_ordering: false,
                progress_every: 1_000,
                ..FeedConfig::default()
            },
            report: ReportConfig {
                pretty: true,
                include_positions: true,
                ..ReportConfig::default()
            },
        }
    }

    /// Profile named by `LEDGER_PROFILE`.
    pub fn from_profile_env() -> Self {
        let profile = std::env::var("LEDGER_PROFILE").unwrap_or_else(|_| "default".to_string());
        let mut config = match profile.to_lowercase().as_str() {
            "strict" => Self::strict(),
            "audit" => Self::audit(),
            _ => Self::default(),
        };
        config.expand_env_vars();
        config
    }

    /// Load from `LEDGER_CONFIG` if set, otherwise from `LEDGER_PROFILE`.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("LEDGER_CONFIG") {
            Ok(path) => Self::from_file(&path),
            Err(_) => Ok(Self::from_profile_env()),
        }
    }

    /// Same as [`Self::load`], falling back to the profile when the file
    /// cannot be read.
    pub fn from_env() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Config file unreadable, using profile");
            Self::from_profile_env()
        })
    }

    /// Expand `${VAR}` patterns in path settings.
    pub fn expand_env_vars(&mut self) {
        self.feed.events_path = expand_env(&self.feed.events_path);
        self.report.output_path = self
            .report
            .output_path
            .as_deref()
            .map(expand_env)
            .filter(|path| !path.is_empty() && !path.contains("${"));
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Ledger configuration loaded");
        tracing::info!(
            events_path = %self.feed.events_path,
            enforce_ordering = self.feed.enforce_ordering,
            progress_every = self.feed.progress_every,
            "Feed settings"
        );
        tracing::info!(
            output = self.report.output_path.as_deref().unwrap_or("stdout"),
            pretty = self.report.pretty,
            include_positions = self.report.include_positions,
            at_risk_threshold = %self.report.at_risk_threshold,
            "Report settings"
        );
    }
}

/// Expand `${VAR_NAME}` patterns with environment variable values. Unset
/// variables are left in place.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }
    result
}

static GLOBAL_CONFIG: OnceLock<LedgerConfig> = OnceLock::new();

/// Initialize global configuration. Only the first call takes effect.
pub fn init_config(config: LedgerConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static LedgerConfig {
    GLOBAL_CONFIG.get_or_init(LedgerConfig::from_env)
}
