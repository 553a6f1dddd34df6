pub mod account;
pub mod calendar;
pub mod clock;
pub mod ledger;
pub mod money;
pub mod notify;
pub mod report;
pub mod scheduler;
pub mod statement;
pub mod transaction;
