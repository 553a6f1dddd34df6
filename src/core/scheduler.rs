//! Scheduled withdrawal settlement.
//!
//! A batch finds every PENDING withdrawal whose `scheduled_at` has passed and settles
//! each one in its own database transaction:
//!
//! 1. Re-check the available balance. If it no longer covers the amount, the row moves
//!    to FAILED and nothing is debited.
//! 2. Otherwise move the row to PROCESSED with a conditional update. Losing that update
//!    means another run or a cancellation got there first, and the row is skipped.
//! 3. Debit with the conditional balance update. If the balance moved underneath us,
//!    the whole unit rolls back and the row is marked FAILED instead.
//!
//! So a row is PROCESSED if and only if its amount was debited, and a second batch run
//! finds nothing left to do for rows that already settled.

use super::{
    account::{find_account_by_id, has_sufficient_balance, subtract_balance},
    clock::Clock,
    notify::{Notifier, WithdrawalNotice, dispatch},
    transaction::{
        PendingOutcome, find_due_scheduled_withdrawals, get_withdrawal_details,
        transition_from_pending,
    },
};
use crate::{
    entities::transaction,
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

pub const INSUFFICIENT_FUNDS_AT_SETTLEMENT: &str = "insufficient funds at settlement time";
pub const BALANCE_CHANGED_BEFORE_DEBIT: &str = "balance changed before the debit could be applied";

/// Result of settling one due withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Debited and marked PROCESSED
    Processed,
    /// Marked FAILED without a debit
    Failed { reason: String },
    /// Someone else moved the row out of PENDING first
    AlreadySettled,
    /// `scheduled_at` is still in the future, or the row was never scheduled
    NotDue,
}

/// End-of-run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettlementSummary {
    /// Due rows found at the start of the run
    pub total_found: usize,
    pub processed_count: usize,
    /// Rows marked FAILED plus rows that could not be processed at all
    pub failed_count: usize,
    /// Rows settled or cancelled concurrently by someone else, or no longer due
    pub skipped_count: usize,
}

/// Settles every due withdrawal once. Only the initial lookup can fail the batch; a
/// storage error on one row is logged, counted as failed and the row stays PENDING
/// for the next run.
#[instrument(skip(db, clock, notifier))]
pub async fn process_scheduled_withdrawals(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    notifier: &dyn Notifier,
) -> Result<SettlementSummary> {
    let now = clock.now();
    let due = find_due_scheduled_withdrawals(db, now).await?;
    let mut summary = SettlementSummary {
        total_found: due.len(),
        ..SettlementSummary::default()
    };

    if due.is_empty() {
        info!("No scheduled withdrawals due at {now}");
        return Ok(summary);
    }
    info!("Processing {} scheduled withdrawals due at {now}", due.len());

    for withdrawal in due {
        match settle_withdrawal(db, &withdrawal, clock.now()).await {
            Ok(SettlementOutcome::Processed) => {
                info!(
                    transaction_id = withdrawal.id,
                    amount = %withdrawal.amount(),
                    "Scheduled withdrawal processed"
                );
                summary.processed_count += 1;
                notify_settled(db, notifier, &withdrawal).await;
            }
            Ok(SettlementOutcome::Failed { reason }) => {
                warn!(transaction_id = withdrawal.id, "Scheduled withdrawal failed: {reason}");
                summary.failed_count += 1;
            }
            Ok(SettlementOutcome::AlreadySettled) => {
                info!(transaction_id = withdrawal.id, "Scheduled withdrawal already settled, skipping");
                summary.skipped_count += 1;
            }
            Ok(SettlementOutcome::NotDue) => {
                warn!(transaction_id = withdrawal.id, "Scheduled withdrawal is not due, skipping");
                summary.skipped_count += 1;
            }
            Err(e) => {
                error!(transaction_id = withdrawal.id, "Error processing scheduled withdrawal: {e}");
                summary.failed_count += 1;
            }
        }
    }

    info!(
        processed = summary.processed_count,
        failed = summary.failed_count,
        skipped = summary.skipped_count,
        "Scheduled withdrawal batch finished"
    );
    Ok(summary)
}

/// Applies the settle transition to one due withdrawal as a single atomic unit.
///
/// # Arguments
/// * `db` - Database connection; the settlement opens its own database transaction
/// * `withdrawal` - A withdrawal row as read by [`find_due_scheduled_withdrawals`]
/// * `now` - Settlement instant, recorded as `processed_at`
///
/// # Returns
/// [`SettlementOutcome::NotDue`] without touching storage when `scheduled_at` is absent
/// or after `now`. `scheduled_at` never changes once written, so checking the row read
/// by the caller is enough.
pub async fn settle_withdrawal(
    db: &DatabaseConnection,
    withdrawal: &transaction::Model,
    now: DateTime<Utc>,
) -> Result<SettlementOutcome> {
    if !withdrawal.scheduled_at.is_some_and(|at| at <= now) {
        return Ok(SettlementOutcome::NotDue);
    }

    let amount = withdrawal.amount();
    let txn = db.begin().await?;

    let account = find_account_by_id(&txn, withdrawal.account_id)
        .await?
        .ok_or_else(|| Error::AccountNotFound {
            user_id: withdrawal.user_id,
        })?;

    if !has_sufficient_balance(&txn, &account, amount, now).await? {
        let outcome = PendingOutcome::Failed {
            reason: INSUFFICIENT_FUNDS_AT_SETTLEMENT.to_string(),
        };
        let won = transition_from_pending(&txn, withdrawal.id, &outcome, now).await?;
        txn.commit().await?;
        return Ok(settled_as(won, outcome));
    }

    if !transition_from_pending(&txn, withdrawal.id, &PendingOutcome::Processed, now).await? {
        txn.rollback().await?;
        return Ok(SettlementOutcome::AlreadySettled);
    }

    if subtract_balance(&txn, account.id, amount, now).await? {
        txn.commit().await?;
        return Ok(SettlementOutcome::Processed);
    }

    // The row must not stay PROCESSED without a debit
    txn.rollback().await?;
    let outcome = PendingOutcome::Failed {
        reason: BALANCE_CHANGED_BEFORE_DEBIT.to_string(),
    };
    let won = transition_from_pending(db, withdrawal.id, &outcome, now).await?;
    Ok(settled_as(won, outcome))
}

fn settled_as(won: bool, outcome: PendingOutcome) -> SettlementOutcome {
    match (won, outcome) {
        (true, PendingOutcome::Failed { reason }) => SettlementOutcome::Failed { reason },
        (true, PendingOutcome::Processed) => SettlementOutcome::Processed,
        _ => SettlementOutcome::AlreadySettled,
    }
}

async fn notify_settled(
    db: &DatabaseConnection,
    notifier: &dyn Notifier,
    withdrawal: &transaction::Model,
) {
    let lookup = async {
        let account = find_account_by_id(db, withdrawal.account_id).await?;
        let details = get_withdrawal_details(db, withdrawal.id).await?;
        Ok::<_, Error>(account.zip(details))
    };

    match lookup.await {
        Ok(Some((account, details))) => {
            let notice = WithdrawalNotice {
                email: account.owner_email,
                amount: withdrawal.amount(),
                pix_key: details.pix_key,
                pix_type: details.pix_type,
                scheduled_at: withdrawal.scheduled_at,
            };
            dispatch(notifier, withdrawal.id, &notice);
        }
        Ok(None) => warn!(
            transaction_id = withdrawal.id,
            "No account or PIX details to notify about"
        ),
        Err(e) => warn!(
            transaction_id = withdrawal.id,
            "Could not load notification data: {e}"
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        account::{add_balance, find_account_by_user, open_account},
        clock::ManualClock,
        money::Money,
        transaction::{PixDestination, WithdrawalTiming, get_transaction_by_id, insert_withdrawal},
    };
    use crate::entities::{PixKeyType, TransactionStatus, TransactionType, account};
    use crate::test_utils::*;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    async fn funded(db: &DatabaseConnection, cents: i64) -> Result<account::Model> {
        let account = open_account(db, 1, "ana@example.com", test_now()).await?;
        add_balance(db, account.id, Money::from_cents(cents), test_now()).await?;
        find_account_by_user(db, 1).await
    }

    async fn schedule(
        db: &DatabaseConnection,
        account: &account::Model,
        cents: i64,
        due: DateTime<Utc>,
    ) -> Result<transaction::Model> {
        let pix = PixDestination::new(PixKeyType::Email, "ana@example.com")?;
        let (tx, _) = insert_withdrawal(
            db,
            account,
            Money::from_cents(cents),
            &pix,
            WithdrawalTiming::ScheduledFor(due),
            test_now(),
        )
        .await?;
        Ok(tx)
    }

    #[tokio::test]
    async fn test_settles_due_withdrawal() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        let tx = schedule(&db, &account, 6_000, due).await?;

        let clock = ManualClock::new(due);
        let notifier = RecordingNotifier::default();
        let summary = process_scheduled_withdrawals(&db, &clock, &notifier).await?;

        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.failed_count, 0);

        let stored = get_transaction_by_id(&db, tx.id).await?.unwrap();
        assert_eq!(stored.status, TransactionStatus::Processed);
        assert_eq!(stored.processed_at, Some(due));
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(4_000));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, "ana@example.com");
        assert_eq!(sent[0].amount, Money::from_cents(6_000));
        assert_eq!(sent[0].scheduled_at, Some(due));

        Ok(())
    }

    #[tokio::test]
    async fn test_not_yet_due_is_left_alone() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(2);
        let tx = schedule(&db, &account, 1_000, due).await?;

        let clock = ManualClock::new(due - Duration::seconds(1));
        let summary = process_scheduled_withdrawals(&db, &clock, &RecordingNotifier::default()).await?;

        assert_eq!(summary, SettlementSummary::default());
        let stored = get_transaction_by_id(&db, tx.id).await?.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);

        Ok(())
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        schedule(&db, &account, 3_000, due).await?;

        let clock = ManualClock::new(due + Duration::minutes(5));
        let notifier = RecordingNotifier::default();
        let first = process_scheduled_withdrawals(&db, &clock, &notifier).await?;
        let second = process_scheduled_withdrawals(&db, &clock, &notifier).await?;

        assert_eq!(first.processed_count, 1);
        assert_eq!(second, SettlementSummary::default());
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(7_000));
        assert_eq!(notifier.sent().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_settling_same_row_twice_debits_once() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        let tx = schedule(&db, &account, 2_500, due).await?;

        // Two overlapping runs that both read the row while it was PENDING
        assert_eq!(settle_withdrawal(&db, &tx, due).await?, SettlementOutcome::Processed);
        assert_eq!(settle_withdrawal(&db, &tx, due).await?, SettlementOutcome::AlreadySettled);

        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(7_500));

        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_funds_fails_without_debit() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        let first = schedule(&db, &account, 7_000, due).await?;
        let second = schedule(&db, &account, 7_000, due).await?;

        let clock = ManualClock::new(due);
        let notifier = RecordingNotifier::default();
        let summary = process_scheduled_withdrawals(&db, &clock, &notifier).await?;

        assert_eq!(summary.total_found, 2);
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(3_000));

        let first = get_transaction_by_id(&db, first.id).await?.unwrap();
        let second = get_transaction_by_id(&db, second.id).await?.unwrap();
        assert_eq!(first.status, TransactionStatus::Processed);
        assert_eq!(second.status, TransactionStatus::Failed);
        assert_eq!(second.failure_reason.as_deref(), Some(INSUFFICIENT_FUNDS_AT_SETTLEMENT));
        assert_eq!(second.processed_at, Some(due));
        assert_eq!(notifier.sent().len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_future_commitments_count_against_due_withdrawal() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        let tx = schedule(&db, &account, 6_000, due).await?;
        schedule(&db, &account, 5_000, test_now() + Duration::days(3)).await?;

        let outcome = settle_withdrawal(&db, &tx, due).await?;
        assert_eq!(
            outcome,
            SettlementOutcome::Failed {
                reason: INSUFFICIENT_FUNDS_AT_SETTLEMENT.to_string()
            }
        );
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(10_000));

        Ok(())
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_settlement() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let due = test_now() + Duration::days(1);
        let tx = schedule(&db, &account, 1_000, due).await?;

        let clock = ManualClock::new(due);
        let summary = process_scheduled_withdrawals(&db, &clock, &FailingNotifier).await?;

        assert_eq!(summary.processed_count, 1);
        let stored = get_transaction_by_id(&db, tx.id).await?.unwrap();
        assert_eq!(stored.status, TransactionStatus::Processed);

        Ok(())
    }

    #[tokio::test]
    async fn test_settle_refuses_withdrawal_before_due() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let tx = schedule(&db, &account, 1_000, test_now() + Duration::days(3)).await?;

        let outcome = settle_withdrawal(&db, &tx, test_now()).await?;
        assert_eq!(outcome, SettlementOutcome::NotDue);

        let stored = get_transaction_by_id(&db, tx.id).await?.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.processed_at, None);
        assert_eq!(find_account_by_user(&db, 1).await?.balance(), Money::from_cents(10_000));

        Ok(())
    }

    #[tokio::test]
    async fn test_settle_refuses_unscheduled_withdrawal() -> Result<()> {
        let db = setup_test_db().await?;
        let account = funded(&db, 10_000).await?;
        let pix = PixDestination::new(PixKeyType::Email, "ana@example.com")?;
        let (tx, _) = insert_withdrawal(
            &db,
            &account,
            Money::from_cents(1_000),
            &pix,
            WithdrawalTiming::Immediate,
            test_now(),
        )
        .await?;

        let outcome = settle_withdrawal(&db, &tx, test_now() + Duration::days(1)).await?;
        assert_eq!(outcome, SettlementOutcome::NotDue);

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_debit_after_transition_marks_failed() -> Result<()> {
        let due = test_now() + Duration::days(1);
        let account = account::Model {
            id: 1,
            user_id: 1,
            owner_email: "ana@example.com".to_string(),
            balance: 10_000,
            created_at: test_now(),
            updated_at: test_now(),
        };
        let withdrawal = transaction::Model {
            id: 9,
            user_id: 1,
            account_id: 1,
            transaction_type: TransactionType::Withdrawal,
            amount: 1_000,
            status: TransactionStatus::Pending,
            scheduled_at: Some(due),
            processed_at: None,
            failure_reason: None,
            created_at: test_now(),
            updated_at: test_now(),
        };
        let affected = |rows_affected| MockExecResult {
            last_insert_id: 0,
            rows_affected,
        };

        // Pre-check passes, the PROCESSED transition wins, then the balance has moved
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![account]])
            .append_query_results([vec![BTreeMap::from([("total", Value::BigInt(Some(0)))])]])
            .append_exec_results([affected(1), affected(0), affected(1)])
            .into_connection();

        let outcome = settle_withdrawal(&db, &withdrawal, due).await?;
        assert_eq!(
            outcome,
            SettlementOutcome::Failed {
                reason: BALANCE_CHANGED_BEFORE_DEBIT.to_string()
            }
        );

        Ok(())
    }
}
