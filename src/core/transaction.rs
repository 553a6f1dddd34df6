//! Transaction business logic - creation and the PENDING state machine.
//!
//! Rows are written in their final state when the movement is synchronous (deposits,
//! immediate withdrawals). Scheduled withdrawals are written `PENDING` and leave that
//! state through [`transition_from_pending`] only, which is a conditional update on
//! `status = 'PENDING'`. Whoever lands that update first (the user cancelling or the
//! scheduler settling) wins; everybody else sees `false`.

use super::money::Money;
use crate::{
    entities::{
        PixKeyType, Transaction, TransactionStatus, TransactionType, WithdrawalDetails, account,
        transaction, withdrawal_details,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::collections::HashMap;

pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Terminal state a PENDING withdrawal can move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOutcome {
    Processed,
    Failed { reason: String },
    Cancelled,
}

impl PendingOutcome {
    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        match self {
            Self::Processed => TransactionStatus::Processed,
            Self::Failed { .. } => TransactionStatus::Failed,
            Self::Cancelled => TransactionStatus::Cancelled,
        }
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Processed => None,
            Self::Failed { reason } => Some(reason.clone()),
            Self::Cancelled => Some(CANCELLED_BY_USER.to_string()),
        }
    }
}

/// Validated PIX destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixDestination {
    pix_type: PixKeyType,
    pix_key: String,
}

impl PixDestination {
    pub fn new(pix_type: PixKeyType, pix_key: &str) -> Result<Self> {
        let pix_key = pix_key.trim();
        if pix_key.is_empty() {
            return Err(Error::validation("pix_key", "must not be empty"));
        }
        Ok(Self {
            pix_type,
            pix_key: pix_key.to_string(),
        })
    }

    #[must_use]
    pub const fn pix_type(&self) -> PixKeyType {
        self.pix_type
    }

    #[must_use]
    pub fn pix_key(&self) -> &str {
        &self.pix_key
    }
}

/// When a new withdrawal is debited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalTiming {
    /// Debited in the same database transaction, row written `PROCESSED`
    Immediate,
    /// Row written `PENDING`, debited by the scheduler at this instant
    ScheduledFor(DateTime<Utc>),
}

/// Records a deposit, already `PROCESSED`.
pub async fn insert_deposit<C>(
    db: &C,
    account: &account::Model,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let model = transaction::ActiveModel {
        user_id: Set(account.user_id),
        account_id: Set(account.id),
        transaction_type: Set(TransactionType::Deposit),
        amount: Set(amount.cents()),
        status: Set(TransactionStatus::Processed),
        scheduled_at: Set(None),
        processed_at: Set(Some(now)),
        failure_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    model.insert(db).await.map_err(Into::into)
}

/// Records a withdrawal and its PIX details. Does not touch the balance; immediate
/// withdrawals must be debited by the caller in the same database transaction.
///
/// # Arguments
/// * `db` - Database connection or transaction
/// * `account` - Account the amount leaves
/// * `amount` - Positive withdrawal amount
/// * `destination` - Validated PIX key
/// * `timing` - `Immediate` writes PROCESSED, `ScheduledFor` writes PENDING
/// * `now` - Creation timestamp
///
/// # Returns
/// The transaction row and its withdrawal details row
pub async fn insert_withdrawal<C>(
    db: &C,
    account: &account::Model,
    amount: Money,
    destination: &PixDestination,
    timing: WithdrawalTiming,
    now: DateTime<Utc>,
) -> Result<(transaction::Model, withdrawal_details::Model)>
where
    C: ConnectionTrait,
{
    let (status, scheduled_at, processed_at) = match timing {
        WithdrawalTiming::Immediate => (TransactionStatus::Processed, None, Some(now)),
        WithdrawalTiming::ScheduledFor(at) => (TransactionStatus::Pending, Some(at), None),
    };

    let transaction = transaction::ActiveModel {
        user_id: Set(account.user_id),
        account_id: Set(account.id),
        transaction_type: Set(TransactionType::Withdrawal),
        amount: Set(amount.cents()),
        status: Set(status),
        scheduled_at: Set(scheduled_at),
        processed_at: Set(processed_at),
        failure_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let details = withdrawal_details::ActiveModel {
        transaction_id: Set(transaction.id),
        pix_type: Set(destination.pix_type()),
        pix_key: Set(destination.pix_key().to_string()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok((transaction, details))
}

/// Moves a PENDING transaction to `outcome`.
///
/// `UPDATE transactions SET status = ? ... WHERE id = ? AND status = 'PENDING'`; returns
/// `true` iff this call performed the transition.
pub async fn transition_from_pending<C>(
    db: &C,
    transaction_id: i64,
    outcome: &PendingOutcome,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Transaction::update_many()
        .col_expr(transaction::Column::Status, Expr::value(outcome.status()))
        .col_expr(transaction::Column::ProcessedAt, Expr::value(Some(now)))
        .col_expr(
            transaction::Column::FailureReason,
            Expr::value(outcome.failure_reason()),
        )
        .col_expr(transaction::Column::UpdatedAt, Expr::value(now))
        .filter(transaction::Column::Id.eq(transaction_id))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// PENDING withdrawals whose settlement instant is at or before `now`, oldest first.
pub async fn find_due_scheduled_withdrawals<C>(
    db: &C,
    now: DateTime<Utc>,
) -> Result<Vec<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find()
        .filter(transaction::Column::TransactionType.eq(TransactionType::Withdrawal))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .filter(transaction::Column::ScheduledAt.is_not_null())
        .filter(transaction::Column::ScheduledAt.lte(now))
        .order_by_asc(transaction::Column::ScheduledAt)
        .order_by_asc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a specific transaction by its unique ID.
pub async fn get_transaction_by_id<C>(
    db: &C,
    transaction_id: i64,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds the PIX details of a withdrawal.
pub async fn get_withdrawal_details<C>(
    db: &C,
    transaction_id: i64,
) -> Result<Option<withdrawal_details::Model>>
where
    C: ConnectionTrait,
{
    WithdrawalDetails::find()
        .filter(withdrawal_details::Column::TransactionId.eq(transaction_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// PIX destination as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WithdrawalDetailsRecord {
    pub pix_type: PixKeyType,
    pub pix_key: String,
}

/// Client-facing view of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub formatted_amount: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawal_details: Option<WithdrawalDetailsRecord>,
}

impl TransactionRecord {
    #[must_use]
    pub fn from_models(
        transaction: transaction::Model,
        details: Option<withdrawal_details::Model>,
    ) -> Self {
        let amount = transaction.amount();
        Self {
            id: transaction.id,
            transaction_type: transaction.transaction_type,
            amount: amount.to_decimal(),
            formatted_amount: amount.to_brl_string(),
            status: transaction.status,
            created_at: transaction.created_at,
            scheduled_at: transaction.scheduled_at,
            processed_at: transaction.processed_at,
            failure_reason: transaction.failure_reason,
            withdrawal_details: details.map(|d| WithdrawalDetailsRecord {
                pix_type: d.pix_type,
                pix_key: d.pix_key,
            }),
        }
    }
}

/// Attaches withdrawal details to `transactions` with one extra query, keeping order.
pub async fn load_records<C>(
    db: &C,
    transactions: Vec<transaction::Model>,
) -> Result<Vec<TransactionRecord>>
where
    C: ConnectionTrait,
{
    let withdrawal_ids: Vec<i64> = transactions
        .iter()
        .filter(|t| t.transaction_type == TransactionType::Withdrawal)
        .map(|t| t.id)
        .collect();

    let mut details: HashMap<i64, withdrawal_details::Model> = if withdrawal_ids.is_empty() {
        HashMap::new()
    } else {
        WithdrawalDetails::find()
            .filter(withdrawal_details::Column::TransactionId.is_in(withdrawal_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|d| (d.transaction_id, d))
            .collect()
    };

    Ok(transactions
        .into_iter()
        .map(|t| {
            let d = details.remove(&t.id);
            TransactionRecord::from_models(t, d)
        })
        .collect())
}
