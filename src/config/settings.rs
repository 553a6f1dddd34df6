//! Ledger settings loading from ledger.toml
//!
//! All keys live under a `[ledger]` table and are optional; a missing file means
//! defaults. The defaults encode the product rules: America/Sao_Paulo civil time
//! (UTC-3), settlement at 06:00 local, scheduling at most 7 days ahead.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Configuration structure representing the entire ledger.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Ledger rules and scheduler cadence
    #[serde(default)]
    pub ledger: LedgerSettings,
}

/// Tunable ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSettings {
    /// Offset of the operating civil timezone from UTC, in minutes
    pub utc_offset_minutes: i32,
    /// Local hour at which scheduled withdrawals become due
    pub settlement_hour: u32,
    /// How many days ahead a withdrawal may be scheduled (inclusive)
    pub max_schedule_days: u32,
    /// Smallest accepted withdrawal
    pub min_withdrawal: Decimal,
    /// Largest accepted single deposit
    pub max_deposit: Decimal,
    /// Upper bound for statement page size
    pub max_page_size: u64,
    /// Pause between scheduler batches when running continuously
    pub scheduler_interval_secs: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: -180,
            settlement_hour: 6,
            max_schedule_days: 7,
            min_withdrawal: Decimal::new(1, 2),
            max_deposit: Decimal::new(99_999_999, 2),
            max_page_size: 100,
            scheduler_interval_secs: 60,
        }
    }
}

impl LedgerSettings {
    /// Rejects values that would make the ledger rules meaningless.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::Config { message });

        if self.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            return invalid(format!(
                "utc_offset_minutes must be within ±1439, got {}",
                self.utc_offset_minutes
            ));
        }
        if self.settlement_hour > 23 {
            return invalid(format!(
                "settlement_hour must be 0-23, got {}",
                self.settlement_hour
            ));
        }
        if self.max_schedule_days == 0 {
            return invalid("max_schedule_days must be at least 1".to_string());
        }
        if self.min_withdrawal <= Decimal::ZERO || self.max_deposit <= Decimal::ZERO {
            return invalid("min_withdrawal and max_deposit must be positive".to_string());
        }
        if self.max_page_size == 0 {
            return invalid("max_page_size must be at least 1".to_string());
        }
        if self.scheduler_interval_secs == 0 {
            return invalid("scheduler_interval_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Loads ledger configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid or contains unknown keys
/// - A value is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration text.
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse ledger.toml: {e}"),
    })?;
    config.ledger.validate()?;
    Ok(config)
}

/// Loads configuration from `LEDGER_CONFIG` (default `./ledger.toml`), falling back
/// to defaults when the file does not exist.
pub fn load_default_config() -> Result<Config> {
    let path = std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| "ledger.toml".to_string());
    if Path::new(&path).exists() {
        load_config(&path)
    } else {
        info!("No configuration file at {path}, using built-in ledger defaults");
        Ok(Config::default())
    }
}
