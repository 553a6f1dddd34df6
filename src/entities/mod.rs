//! Entity module - SeaORM definitions for the ledger tables.
//! `accounts` owns the balance, `transactions` is the movement log and
//! `withdrawal_details` carries the PIX destination of each withdrawal.

pub mod account;
pub mod enums;
pub mod transaction;
pub mod withdrawal_details;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use enums::{PixKeyType, TransactionStatus, TransactionType};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
pub use withdrawal_details::{
    Column as WithdrawalDetailsColumn, Entity as WithdrawalDetails,
    Model as WithdrawalDetailsModel,
};
