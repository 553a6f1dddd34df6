//! Ledger service - the entry point the HTTP layer and the operator binary talk to.
//!
//! Each mutating operation re-reads the account inside one database transaction, applies
//! the balance change through the conditional updates in [`super::account`] and writes
//! the transaction rows before committing once. Either everything lands or nothing does.
//! Collaborators (clock, notifier) are injected at construction.

use super::{
    account::{self, BalanceSnapshot},
    calendar::SettlementCalendar,
    clock::Clock,
    money::Money,
    notify::{Notifier, WithdrawalNotice, dispatch},
    report::{self, LedgerOverview},
    scheduler::{self, SettlementSummary},
    statement::{self, Pagination, StatementFilter, StatementPage},
    transaction::{
        PendingOutcome, PixDestination, TransactionRecord, WithdrawalTiming, get_withdrawal_details,
        insert_deposit, insert_withdrawal, transition_from_pending,
    },
};
use crate::{
    config::LedgerSettings,
    entities::{
        PixKeyType, Transaction, TransactionStatus, TransactionType, account as account_entity,
        transaction,
    },
    errors::{Error, Result},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, TransactionTrait, prelude::*};
use std::sync::Arc;
use tracing::{info, instrument};

/// A withdrawal as requested by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub pix_type: PixKeyType,
    pub pix_key: String,
    /// Civil date in the operating timezone; `None` withdraws immediately
    pub scheduled_for: Option<NaiveDate>,
}

/// What a successful deposit or withdrawal returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Receipt {
    pub transaction: TransactionRecord,
    pub balance: BalanceSnapshot,
}

/// Ledger service over one database, owning its clock, notifier and settings.
pub struct Ledger {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    calendar: SettlementCalendar,
    settings: LedgerSettings,
}

impl Ledger {
    /// Builds the service after validating `settings`.
    ///
    /// # Arguments
    /// * `db` - Database connection with the ledger tables created
    /// * `clock` - Source of "now" for every operation
    /// * `notifier` - Receives a notice for each settled withdrawal
    /// * `settings` - Amount limits, calendar and pagination rules
    ///
    /// # Returns
    /// The service, or [`Error::Config`] when a setting is out of range
    pub fn new(
        db: DatabaseConnection,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        settings: LedgerSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let calendar = SettlementCalendar::from_settings(&settings)?;
        Ok(Self {
            db,
            clock,
            notifier,
            calendar,
            settings,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Opens the single account of `user_id`.
    #[instrument(skip(self))]
    pub async fn open_account(&self, user_id: i64, owner_email: &str) -> Result<account_entity::Model> {
        let account = account::open_account(&self.db, user_id, owner_email, self.clock.now()).await?;
        info!(account_id = account.id, "Account opened");
        Ok(account)
    }

    /// Credits `amount` and records a PROCESSED deposit.
    #[instrument(skip(self), fields(amount = %amount))]
    pub async fn deposit(&self, user_id: i64, amount: Decimal) -> Result<Receipt> {
        let amount = self.deposit_amount(amount)?;
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        let account = account::find_account_by_user(&txn, user_id).await?;
        account::add_balance(&txn, account.id, amount, now).await?;
        let deposit = insert_deposit(&txn, &account, amount, now).await?;
        txn.commit().await?;

        info!(transaction_id = deposit.id, "Deposit of {amount} processed");
        self.receipt(user_id, TransactionRecord::from_models(deposit, None))
            .await
    }

    /// Withdraws now or schedules a withdrawal, depending on `request.scheduled_for`.
    ///
    /// Both paths require the available balance to cover the amount. Immediate
    /// withdrawals are debited before commit; scheduled ones only reserve the amount by
    /// existing as PENDING.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the account to withdraw from
    /// * `request` - Amount, PIX destination and optional settlement date
    ///
    /// # Returns
    /// The new transaction and the balance after commit. Fails with
    /// [`Error::InsufficientFunds`] without writing anything when funds are short.
    #[instrument(skip(self, request), fields(amount = %request.amount, scheduled_for = ?request.scheduled_for))]
    pub async fn withdraw(&self, user_id: i64, request: WithdrawalRequest) -> Result<Receipt> {
        let amount = self.withdrawal_amount(request.amount)?;
        let destination = PixDestination::new(request.pix_type, &request.pix_key)?;
        let now = self.clock.now();
        let timing = match request.scheduled_for {
            Some(date) => WithdrawalTiming::ScheduledFor(self.calendar.scheduled_instant(date, now)?),
            None => WithdrawalTiming::Immediate,
        };

        let txn = self.db.begin().await?;
        let account = account::find_account_by_user(&txn, user_id).await?;

        let available = account::available_balance(&txn, &account, now).await?;
        if available < amount {
            return Err(Error::InsufficientFunds {
                available,
                required: amount,
            });
        }

        if timing == WithdrawalTiming::Immediate
            && !account::subtract_balance(&txn, account.id, amount, now).await?
        {
            // Balance moved between the check and the debit; nothing was written
            return Err(Error::InsufficientFunds {
                available,
                required: amount,
            });
        }

        let (withdrawal, details) =
            insert_withdrawal(&txn, &account, amount, &destination, timing, now).await?;
        txn.commit().await?;

        match timing {
            WithdrawalTiming::Immediate => {
                info!(transaction_id = withdrawal.id, "Withdrawal of {amount} processed");
                let notice = WithdrawalNotice {
                    email: account.owner_email.clone(),
                    amount,
                    pix_key: details.pix_key.clone(),
                    pix_type: details.pix_type,
                    scheduled_at: None,
                };
                dispatch(self.notifier.as_ref(), withdrawal.id, &notice);
            }
            WithdrawalTiming::ScheduledFor(at) => {
                info!(transaction_id = withdrawal.id, "Withdrawal of {amount} scheduled for {at}");
            }
        }

        self.receipt(
            user_id,
            TransactionRecord::from_models(withdrawal, Some(details)),
        )
        .await
    }

    /// Cancels a PENDING withdrawal of `user_id`.
    ///
    /// Unknown ids, other users' withdrawals and withdrawals that already left PENDING
    /// (including ones the scheduler settled a moment ago) all report
    /// [`Error::ScheduledWithdrawalNotFound`].
    #[instrument(skip(self))]
    pub async fn cancel_scheduled_withdrawal(
        &self,
        transaction_id: i64,
        user_id: i64,
    ) -> Result<TransactionRecord> {
        let not_found = || Error::ScheduledWithdrawalNotFound { transaction_id };
        let now = self.clock.now();

        let txn = self.db.begin().await?;
        Transaction::find_by_id(transaction_id)
            .filter(transaction::Column::UserId.eq(user_id))
            .filter(transaction::Column::TransactionType.eq(TransactionType::Withdrawal))
            .filter(transaction::Column::Status.eq(TransactionStatus::Pending))
            .one(&txn)
            .await?
            .ok_or_else(not_found)?;

        if !transition_from_pending(&txn, transaction_id, &PendingOutcome::Cancelled, now).await? {
            return Err(not_found());
        }

        let cancelled = Transaction::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .ok_or_else(not_found)?;
        let details = get_withdrawal_details(&txn, transaction_id).await?;
        txn.commit().await?;

        info!("Scheduled withdrawal cancelled");
        Ok(TransactionRecord::from_models(cancelled, details))
    }

    /// Paginated statement of `user_id`, newest first.
    pub async fn get_statement(
        &self,
        user_id: i64,
        filter: StatementFilter,
        pagination: Pagination,
    ) -> Result<StatementPage> {
        statement::get_statement(&self.db, user_id, filter, pagination, self.settings.max_page_size)
            .await
    }

    /// Transactions of `user_id` created within the last `days` days.
    pub async fn get_recent_transactions(
        &self,
        user_id: i64,
        limit: u64,
        days: u32,
    ) -> Result<Vec<TransactionRecord>> {
        statement::get_recent_transactions(&self.db, user_id, limit, days, self.clock.now()).await
    }

    /// One transaction of `user_id`.
    pub async fn get_transaction(&self, user_id: i64, transaction_id: i64) -> Result<TransactionRecord> {
        statement::get_user_transaction(&self.db, user_id, transaction_id).await
    }

    /// Current balance projection of `user_id`.
    pub async fn get_balance_snapshot(&self, user_id: i64) -> Result<BalanceSnapshot> {
        let account = account::find_account_by_user(&self.db, user_id).await?;
        account::balance_snapshot(&self.db, &account, self.clock.now()).await
    }

    /// Settles every due scheduled withdrawal. Safe to call repeatedly.
    pub async fn process_scheduled_withdrawals(&self) -> Result<SettlementSummary> {
        scheduler::process_scheduled_withdrawals(&self.db, self.clock.as_ref(), self.notifier.as_ref())
            .await
    }

    /// Back-office figures with up to `recent_limit` recent transactions.
    pub async fn admin_overview(&self, recent_limit: u64) -> Result<LedgerOverview> {
        report::generate_overview(&self.db, recent_limit).await
    }

    fn deposit_amount(&self, amount: Decimal) -> Result<Money> {
        let money = Money::from_decimal(amount)?;
        if !money.is_positive() {
            return Err(Error::validation("amount", "must be greater than zero"));
        }
        if amount > self.settings.max_deposit {
            return Err(Error::validation(
                "amount",
                format!("cannot exceed {}", self.settings.max_deposit),
            ));
        }
        Ok(money)
    }

    fn withdrawal_amount(&self, amount: Decimal) -> Result<Money> {
        let money = Money::from_decimal(amount)?;
        if !money.is_positive() || amount < self.settings.min_withdrawal {
            return Err(Error::validation(
                "amount",
                format!("must be at least {}", self.settings.min_withdrawal),
            ));
        }
        Ok(money)
    }

    async fn receipt(&self, user_id: i64, transaction: TransactionRecord) -> Result<Receipt> {
        Ok(Receipt {
            transaction,
            balance: self.get_balance_snapshot(user_id).await?,
        })
    }
}
