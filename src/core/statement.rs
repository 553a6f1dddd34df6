//! Statement and activity queries.
//!
//! Read-only projections over the transaction log, newest first. Ordering breaks
//! `created_at` ties by id so pages are stable.

use super::transaction::{TransactionRecord, load_records};
use crate::{
    entities::{Transaction, TransactionStatus, TransactionType, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;

/// Optional statement filters; `None` means "all".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementFilter {
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

impl Pagination {
    fn validate(self, max_page_size: u64) -> Result<Self> {
        if self.page == 0 {
            return Err(Error::validation("page", "must be at least 1"));
        }
        if self.per_page == 0 || self.per_page > max_page_size {
            return Err(Error::validation(
                "per_page",
                format!("must be between 1 and {max_page_size}"),
            ));
        }
        // The row offset must fit the signed OFFSET the database accepts
        let offset = (self.page - 1).checked_mul(self.per_page);
        if !offset.is_some_and(|o| i64::try_from(o).is_ok()) {
            return Err(Error::validation("page", "is out of range"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageInfo {
    fn new(pagination: Pagination, total: u64) -> Self {
        let total_pages = total.div_ceil(pagination.per_page);
        Self {
            current_page: pagination.page,
            per_page: pagination.per_page,
            total,
            total_pages,
            has_next_page: pagination.page < total_pages,
            has_prev_page: pagination.page > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementPage {
    pub transactions: Vec<TransactionRecord>,
    pub pagination: PageInfo,
}

/// Paginated, filtered statement of `user_id`.
///
/// # Arguments
/// * `db` - Database connection
/// * `user_id` - Owner of the transactions
/// * `filter` - Optional type and status filters
/// * `pagination` - One-based page request
/// * `max_page_size` - Largest accepted `per_page`
///
/// # Returns
/// The requested page, newest first, with its page info
pub async fn get_statement<C>(
    db: &C,
    user_id: i64,
    filter: StatementFilter,
    pagination: Pagination,
    max_page_size: u64,
) -> Result<StatementPage>
where
    C: ConnectionTrait,
{
    let pagination = pagination.validate(max_page_size)?;

    let mut query = Transaction::find().filter(transaction::Column::UserId.eq(user_id));
    if let Some(kind) = filter.transaction_type {
        query = query.filter(transaction::Column::TransactionType.eq(kind));
    }
    if let Some(status) = filter.status {
        query = query.filter(transaction::Column::Status.eq(status));
    }
    let query = query
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id);

    let paginator = query.paginate(db, pagination.per_page);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(pagination.page - 1).await?;

    Ok(StatementPage {
        transactions: load_records(db, rows).await?,
        pagination: PageInfo::new(pagination, total),
    })
}

/// Up to `limit` of the user's transactions created in the last `days` days.
pub async fn get_recent_transactions<C>(
    db: &C,
    user_id: i64,
    limit: u64,
    days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<TransactionRecord>>
where
    C: ConnectionTrait,
{
    if limit == 0 {
        return Err(Error::validation("limit", "must be at least 1"));
    }
    let since = Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| Error::validation("days", format!("{days} days is out of range")))?;

    let rows = Transaction::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::CreatedAt.gte(since))
        .order_by_desc(transaction::Column::CreatedAt)
        .order_by_desc(transaction::Column::Id)
        .limit(limit)
        .all(db)
        .await?;

    load_records(db, rows).await
}

/// A single transaction of `user_id`; other users' rows are reported as missing.
pub async fn get_user_transaction<C>(
    db: &C,
    user_id: i64,
    transaction_id: i64,
) -> Result<TransactionRecord>
where
    C: ConnectionTrait,
{
    let row = Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(Error::TransactionNotFound { transaction_id })?;

    load_records(db, vec![row])
        .await?
        .pop()
        .ok_or(Error::TransactionNotFound { transaction_id })
}
