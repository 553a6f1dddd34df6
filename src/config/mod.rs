/// Database connection and schema creation
pub mod database;

/// Ledger rules loaded from ledger.toml
pub mod settings;

pub use settings::{LedgerSettings, load_default_config};
