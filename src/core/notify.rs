//! Withdrawal notifications.
//!
//! Delivery is best-effort: the ledger calls the [`Notifier`] only after the withdrawal
//! has committed, and a failure is logged and dropped.

use super::money::Money;
use crate::entities::PixKeyType;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

/// What the user is told about a settled withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalNotice {
    /// Recipient address
    pub email: String,
    pub amount: Money,
    pub pix_key: String,
    pub pix_type: PixKeyType,
    /// Set for scheduled withdrawals, `None` for immediate ones
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Delivery failure. Logged by the ledger, never returned to callers.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotificationError(pub String);

/// Delivers withdrawal notices to the account owner.
pub trait Notifier: Send + Sync {
    /// Called once per withdrawal, after it has committed as PROCESSED.
    fn notify_withdrawal_settled(&self, notice: &WithdrawalNotice) -> Result<(), NotificationError>;
}

/// Writes one structured log line per notice. Stands in for the mail service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_withdrawal_settled(&self, notice: &WithdrawalNotice) -> Result<(), NotificationError> {
        info!(
            email = %notice.email,
            amount = %notice.amount.to_brl_string(),
            pix_type = %notice.pix_type,
            pix_key = %notice.pix_key,
            scheduled_at = ?notice.scheduled_at,
            "Withdrawal notification sent"
        );
        Ok(())
    }
}

/// Sends `notice`, logging instead of propagating any failure.
pub(crate) fn dispatch(notifier: &dyn Notifier, transaction_id: i64, notice: &WithdrawalNotice) {
    if let Err(e) = notifier.notify_withdrawal_settled(notice) {
        warn!(transaction_id, "Failed to notify {} about withdrawal: {e}", notice.email);
    }
}
