//! Withdrawal details entity - PIX destination of a withdrawal, immutable once written.
use super::enums::PixKeyType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "withdrawal_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Withdrawal this destination belongs to (1:1)
    #[sea_orm(unique)]
    pub transaction_id: i64,
    pub pix_type: PixKeyType,
    /// Opaque key value
    pub pix_key: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transaction::Entity",
        from = "Column::TransactionId",
        to = "super::transaction::Column::Id"
    )]
    Transaction,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
