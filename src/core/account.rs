//! Account business logic - balance ownership and sufficiency rules.
//!
//! The raw balance is the only persisted figure. Available balance is recomputed on every
//! read as `balance - scheduled_withdrawals_total`, where the total covers the user's
//! PENDING withdrawals scheduled strictly after `now`. Nothing caches it, so it cannot
//! drift from the transaction log.
//!
//! Balance mutations are single SQL statements: credits add in place, debits are
//! conditional on `balance >= amount` and report whether a row was touched. There is no
//! read-then-write path for the balance.

use super::money::Money;
use crate::{
    entities::{Account, Transaction, TransactionStatus, TransactionType, account, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{QuerySelect, Set, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::debug;

/// Read-only balance projection for the client dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    pub available_balance: Decimal,
    pub total_balance: Decimal,
    pub scheduled_withdrawals_total: Decimal,
    pub formatted_available_balance: String,
    pub formatted_total_balance: String,
    pub formatted_scheduled_withdrawals_total: String,
}

impl BalanceSnapshot {
    #[must_use]
    pub fn new(total_balance: Money, scheduled_withdrawals_total: Money) -> Self {
        let available = available_from(total_balance, scheduled_withdrawals_total);
        Self {
            available_balance: available.to_decimal(),
            total_balance: total_balance.to_decimal(),
            scheduled_withdrawals_total: scheduled_withdrawals_total.to_decimal(),
            formatted_available_balance: available.to_brl_string(),
            formatted_total_balance: total_balance.to_brl_string(),
            formatted_scheduled_withdrawals_total: scheduled_withdrawals_total.to_brl_string(),
        }
    }
}

fn available_from(balance: Money, scheduled: Money) -> Money {
    Money::from_cents(balance.cents().saturating_sub(scheduled.cents()).max(0))
}

/// Opens the single account of `user_id` with a zero balance.
///
/// # Arguments
/// * `db` - Database connection or transaction
/// * `user_id` - Owning user reference
/// * `owner_email` - Notification address, trimmed and required
/// * `now` - Creation timestamp
///
/// # Returns
/// The new account, or [`Error::AccountAlreadyExists`] for a second account
pub async fn open_account<C>(
    db: &C,
    user_id: i64,
    owner_email: &str,
    now: DateTime<Utc>,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let owner_email = owner_email.trim();
    if owner_email.is_empty() {
        return Err(Error::validation("owner_email", "must not be empty"));
    }

    let existing = Account::find()
        .filter(account::Column::UserId.eq(user_id))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(Error::AccountAlreadyExists { user_id });
    }

    let account = account::ActiveModel {
        user_id: Set(user_id),
        owner_email: Set(owner_email.to_string()),
        balance: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    account.insert(db).await.map_err(Into::into)
}

/// Finds the account owned by `user_id`.
pub async fn find_account_by_user<C>(db: &C, user_id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    Account::find()
        .filter(account::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or(Error::AccountNotFound { user_id })
}

/// Finds an account by its primary key.
pub async fn find_account_by_id<C>(db: &C, account_id: i64) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find_by_id(account_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Sum of the user's PENDING withdrawals scheduled strictly after `now`.
pub async fn scheduled_withdrawals_total<C>(
    db: &C,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Money>
where
    C: ConnectionTrait,
{
    let total: Option<i64> = Transaction::find()
        .select_only()
        .column_as(transaction::Column::Amount.sum(), "total")
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::TransactionType.eq(TransactionType::Withdrawal))
        .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
        .filter(transaction::Column::ScheduledAt.gt(now))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?
        .flatten();

    Ok(Money::from_cents(total.unwrap_or(0)))
}

/// Raw balance minus the amounts committed to future scheduled withdrawals.
pub async fn available_balance<C>(
    db: &C,
    account: &account::Model,
    now: DateTime<Utc>,
) -> Result<Money>
where
    C: ConnectionTrait,
{
    let scheduled = scheduled_withdrawals_total(db, account.user_id, now).await?;
    Ok(available_from(account.balance(), scheduled))
}

/// Whether `amount` fits in the available balance. Advisory only: the debit itself is
/// guarded by [`subtract_balance`].
pub async fn has_sufficient_balance<C>(
    db: &C,
    account: &account::Model,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(available_balance(db, account, now).await? >= amount)
}

/// Atomically credits `amount`: `UPDATE accounts SET balance = balance + amount`.
pub async fn add_balance<C>(
    db: &C,
    account_id: i64,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    if !amount.is_positive() {
        return Err(Error::validation("amount", "must be greater than zero"));
    }

    let result = Account::update_many()
        .col_expr(
            account::Column::Balance,
            Expr::col(account::Column::Balance).add(amount.cents()),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(now))
        .filter(account::Column::Id.eq(account_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::Database(DbErr::RecordNotFound(format!(
            "account {account_id}"
        ))));
    }
    Ok(())
}

/// Debits `amount` only if the raw balance covers it.
///
/// Runs `UPDATE accounts SET balance = balance - amount WHERE id = ? AND balance >= amount`
/// and returns `true` iff exactly one row changed. Two racing debits can never both
/// succeed against the same funds.
///
/// # Arguments
/// * `db` - Database connection or transaction
/// * `account_id` - Account to debit
/// * `amount` - Positive amount to take
/// * `now` - Stored as `updated_at`
pub async fn subtract_balance<C>(
    db: &C,
    account_id: i64,
    amount: Money,
    now: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    if !amount.is_positive() {
        return Err(Error::validation("amount", "must be greater than zero"));
    }

    let result = Account::update_many()
        .col_expr(
            account::Column::Balance,
            Expr::col(account::Column::Balance).sub(amount.cents()),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(now))
        .filter(account::Column::Id.eq(account_id))
        .filter(account::Column::Balance.gte(amount.cents()))
        .exec(db)
        .await?;

    debug!(
        account_id,
        amount = %amount,
        rows = result.rows_affected,
        "Conditional debit"
    );
    Ok(result.rows_affected == 1)
}

/// Balance projection of `account` as of `now`.
pub async fn balance_snapshot<C>(
    db: &C,
    account: &account::Model,
    now: DateTime<Utc>,
) -> Result<BalanceSnapshot>
where
    C: ConnectionTrait,
{
    let scheduled = scheduled_withdrawals_total(db, account.user_id, now).await?;
    Ok(BalanceSnapshot::new(account.balance(), scheduled))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_open_account_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = open_account(&db, 1, "   ", test_now()).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::Validation {
                field: "owner_email",
                ..
            }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_open_account_integration() -> Result<()> {
        let db = setup_test_db().await?;

        let account = open_account(&db, 7, " ana@example.com ", test_now()).await?;
        assert_eq!(account.user_id, 7);
        assert_eq!(account.owner_email, "ana@example.com");
        assert_eq!(account.balance(), Money::ZERO);

        let found = find_account_by_user(&db, 7).await?;
        assert_eq!(found, account);

        Ok(())
    }

    #[tokio::test]
    async fn test_open_account_twice_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        open_account(&db, 7, "ana@example.com", test_now()).await?;

        let result = open_account(&db, 7, "other@example.com", test_now()).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::AccountAlreadyExists { user_id: 7 }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_find_account_by_user_not_found() -> Result<()> {
        let db = setup_test_db().await?;

        let result = find_account_by_user(&db, 404).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::AccountNotFound { user_id: 404 }
        ));

        Ok(())
    }

    #[tokio::test]
    async fn test_add_balance_rejects_non_positive() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = add_balance(&db, 1, Money::ZERO, test_now()).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        let result = subtract_balance(&db, 1, Money::from_cents(-5), test_now()).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_add_and_subtract_balance() -> Result<()> {
        let db = setup_test_db().await?;
        let account = open_account(&db, 1, "ana@example.com", test_now()).await?;

        add_balance(&db, account.id, Money::from_cents(10_000), test_now()).await?;
        assert!(subtract_balance(&db, account.id, Money::from_cents(2_550), test_now()).await?);

        let reloaded = find_account_by_user(&db, 1).await?;
        assert_eq!(reloaded.balance(), Money::from_cents(7_450));

        Ok(())
    }

    #[tokio::test]
    async fn test_subtract_balance_never_goes_negative() -> Result<()> {
        let db = setup_test_db().await?;
        let account = open_account(&db, 1, "ana@example.com", test_now()).await?;
        add_balance(&db, account.id, Money::from_cents(5_000), test_now()).await?;

        let debited = subtract_balance(&db, account.id, Money::from_cents(5_001), test_now()).await?;
        assert!(!debited);
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(5_000));

        // Exactly the whole balance is allowed
        assert!(subtract_balance(&db, account.id, Money::from_cents(5_000), test_now()).await?);
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::ZERO);

        Ok(())
    }

    #[tokio::test]
    async fn test_add_balance_unknown_account() -> Result<()> {
        let db = setup_test_db().await?;

        let result = add_balance(&db, 999, Money::from_cents(100), test_now()).await;
        assert!(matches!(result.unwrap_err(), Error::Database(_)));

        Ok(())
    }

    #[test]
    fn test_snapshot_formats_each_figure() {
        let snapshot = BalanceSnapshot::new(Money::from_cents(10_000), Money::from_cents(6_000));
        assert_eq!(snapshot.available_balance, Decimal::new(4_000, 2));
        assert_eq!(snapshot.total_balance, Decimal::new(10_000, 2));
        assert_eq!(snapshot.scheduled_withdrawals_total, Decimal::new(6_000, 2));
        assert_eq!(snapshot.formatted_available_balance, "R$ 40,00");
        assert_eq!(snapshot.formatted_total_balance, "R$ 100,00");
        assert_eq!(snapshot.formatted_scheduled_withdrawals_total, "R$ 60,00");
    }

    #[test]
    fn test_snapshot_serializes_decimals_as_strings() {
        let snapshot = BalanceSnapshot::new(Money::from_cents(123_456), Money::from_cents(6_000));
        let rendered = toml::to_string(&snapshot).unwrap();
        assert!(rendered.contains(r#"available_balance = "1174.56""#));
        assert!(rendered.contains(r#"formatted_total_balance = "R$ 1.234,56""#));
    }

    #[test]
    fn test_available_never_negative() {
        let snapshot = BalanceSnapshot::new(Money::from_cents(1_000), Money::from_cents(4_000));
        assert_eq!(snapshot.available_balance, Decimal::new(0, 2));
        assert_eq!(snapshot.formatted_available_balance, "R$ 0,00");
    }
}
