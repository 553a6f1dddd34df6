//! Account entity - One wallet per user.
//!
//! `balance` is stored in centavos so conditional updates compare exact integers.
//! Available balance is never stored; see [`crate::core::account`].

use crate::core::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user reference (1:1)
    #[sea_orm(unique)]
    pub user_id: i64,
    /// Address that receives withdrawal notifications
    pub owner_email: String,
    /// Raw balance in centavos, never negative
    pub balance: i64,
    /// When the account was opened
    pub created_at: DateTimeUtc,
    /// Last balance mutation
    pub updated_at: DateTimeUtc,
}

impl Model {
    #[must_use]
    pub const fn balance(&self) -> Money {
        Money::from_cents(self.balance)
    }
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
