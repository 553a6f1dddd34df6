//! Shared test utilities for the ledger.
//!
//! In-memory databases, a fixed reference instant and notifier doubles.

#![allow(clippy::unwrap_used)]

use crate::{
    config::LedgerSettings,
    core::{
        clock::{Clock, ManualClock},
        ledger::Ledger,
        notify::{NotificationError, Notifier, WithdrawalNotice},
    },
    errors::Result,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use std::sync::{Arc, Mutex};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes log output through the test harness. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Monday 2025-10-20 12:00 UTC, 09:00 in the default operating timezone.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 20, 12, 0, 0).unwrap()
}

/// Keeps every notice it is handed.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<WithdrawalNotice>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<WithdrawalNotice> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_withdrawal_settled(&self, notice: &WithdrawalNotice) -> std::result::Result<(), NotificationError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Always fails, like an unreachable mail server.
#[derive(Debug, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify_withdrawal_settled(&self, _notice: &WithdrawalNotice) -> std::result::Result<(), NotificationError> {
        Err(NotificationError("smtp unavailable".to_string()))
    }
}

/// A ledger wired to handles the test can drive.
pub struct TestLedger {
    pub ledger: Ledger,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Ledger over a fresh database, with the clock at [`test_now`] and default settings.
pub async fn setup_ledger() -> Result<TestLedger> {
    let db = setup_test_db().await?;
    let clock = Arc::new(ManualClock::new(test_now()));
    let notifier = Arc::new(RecordingNotifier::default());
    let shared_clock: Arc<dyn Clock> = Arc::<ManualClock>::clone(&clock);
    let shared_notifier: Arc<dyn Notifier> = Arc::<RecordingNotifier>::clone(&notifier);
    let ledger = Ledger::new(db, shared_clock, shared_notifier, LedgerSettings::default())?;
    Ok(TestLedger {
        ledger,
        clock,
        notifier,
    })
}

/// Sets up a ledger where user 1 (`ana@example.com`) holds `cents`.
/// A non-zero balance is credited through a regular deposit.
pub async fn setup_with_balance(cents: i64) -> Result<TestLedger> {
    let t = setup_ledger().await?;
    t.ledger.open_account(1, "ana@example.com").await?;
    if cents > 0 {
        t.ledger.deposit(1, Decimal::new(cents, 2)).await?;
    }
    Ok(t)
}
