//! Administrator overview.
//!
//! Aggregate figures for the back-office dashboard. Pending withdrawals are summed
//! whether or not they are already due.

use super::{
    money::Money,
    transaction::{TransactionRecord, load_records},
};
use crate::{
    entities::{Account, Transaction, TransactionStatus, TransactionType, account, transaction},
    errors::Result,
};
use rust_decimal::Decimal;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerOverview {
    pub total_accounts: u64,
    pub total_transactions: u64,
    /// Sum of all raw balances
    pub total_funds: Decimal,
    pub formatted_total_funds: String,
    /// Sum of every PENDING withdrawal
    pub total_pending_withdrawals: Decimal,
    pub formatted_total_pending_withdrawals: String,
    /// Newest transactions across all users
    pub recent_transactions: Vec<TransactionRecord>,
}

/// Builds the overview with up to `recent_limit` recent transactions.
pub async fn generate_overview<C>(db: &C, recent_limit: u64) -> Result<LedgerOverview>
where
    C: ConnectionTrait,
{
    let total_accounts = Account::find().count(db).await?;
    let total_transactions = Transaction::find().count(db).await?;

    let total_funds: Option<i64> = Account::find()
        .select_only()
        .column_as(account::Column::Balance.sum(), "total")
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();
    let total_funds = Money::from_cents(total_funds.unwrap_or(0));

    let pending: Option<i64> = Transaction::find()
        .select_only()
        .column_as(transaction::Column::Amount.sum(), "total")
        .filter(transaction::Column::TransactionType.eq(TransactionType::Withdrawal))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();
    let pending = Money::from_cents(pending.unwrap_or(0));

    let recent = Transaction::find()
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id)
        .limit(recent_limit)
        .all(db)
        .await?;

    Ok(LedgerOverview {
        total_accounts,
        total_transactions,
        total_funds: total_funds.to_decimal(),
        formatted_total_funds: total_funds.to_brl_string(),
        total_pending_withdrawals: pending.to_decimal(),
        formatted_total_pending_withdrawals: pending.to_brl_string(),
        recent_transactions: load_records(db, recent).await?,
    })
}
