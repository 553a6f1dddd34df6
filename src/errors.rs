//! Unified error type for the ledger.
//!
//! Caller-facing failures (validation, insufficient funds, not-found) are kept apart
//! from internal ones (storage, configuration) so the HTTP layer can map them without
//! string matching. Notification failures live in [`crate::core::notify`] and never
//! convert into this type.

use crate::core::money::Money;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any state change.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending request field
        field: &'static str,
        /// Human-readable explanation
        message: String,
    },

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// Spendable balance at the time of the check
        available: Money,
        /// Amount the operation needed
        required: Money,
    },

    #[error("No account found for user {user_id}")]
    AccountNotFound {
        /// Owning user reference
        user_id: i64,
    },

    #[error("User {user_id} already has an account")]
    AccountAlreadyExists {
        /// Owning user reference
        user_id: i64,
    },

    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound {
        /// Requested transaction id
        transaction_id: i64,
    },

    /// Covers missing rows, other users' rows and rows that already left PENDING.
    #[error("Scheduled withdrawal {transaction_id} not found or already processed")]
    ScheduledWithdrawalNotFound {
        /// Requested transaction id
        transaction_id: i64,
    },

    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether the error is the caller's to fix (4xx) rather than an internal failure.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InsufficientFunds { .. }
                | Self::AccountNotFound { .. }
                | Self::AccountAlreadyExists { .. }
                | Self::TransactionNotFound { .. }
                | Self::ScheduledWithdrawalNotFound { .. }
        )
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
