//! Transaction entity - One deposit or withdrawal event.
//!
//! Deposits and immediate withdrawals are written already `PROCESSED`; scheduled
//! withdrawals start `PENDING` with `scheduled_at` set and leave that state exactly once.
use super::enums::{TransactionStatus, TransactionType};
use crate::core::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user reference
    pub user_id: i64,
    /// Account the amount moves in or out of
    pub account_id: i64,
    /// Deposit or withdrawal
    pub transaction_type: TransactionType,
    /// Amount in centavos, always positive
    pub amount: i64,
    /// Lifecycle state
    pub status: TransactionStatus,
    /// Settlement instant for scheduled withdrawals
    pub scheduled_at: Option<DateTimeUtc>,
    /// When the transaction reached a terminal state
    pub processed_at: Option<DateTimeUtc>,
    /// Why the transaction failed or was cancelled
    pub failure_reason: Option<String>,
    /// When the request was accepted
    pub created_at: DateTimeUtc,
    /// Last status change
    pub updated_at: DateTimeUtc,
}

impl Model {
    #[must_use]
    pub const fn amount(&self) -> Money {
        Money::from_cents(self.amount)
    }
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    /// Withdrawals carry exactly one set of PIX details
    #[sea_orm(has_one = "super::withdrawal_details::Entity")]
    WithdrawalDetails,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::withdrawal_details::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WithdrawalDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
