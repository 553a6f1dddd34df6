//! Closed enumerations persisted as string columns.
//!
//! The stored values are the upper-case English names, so the database never holds
//! free-form status or type strings.

use crate::errors::Error;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::StringLen;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Kind of ledger movement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money credited to the account
    #[sea_orm(string_value = "DEPOSIT")]
    Deposit,
    /// Money debited to a PIX destination
    #[sea_orm(string_value = "WITHDRAWAL")]
    Withdrawal,
}

/// Lifecycle state of a transaction. Everything except `Pending` is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Scheduled withdrawal waiting for settlement
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Amount was actually credited or debited
    #[sea_orm(string_value = "PROCESSED")]
    Processed,
    /// Settlement was attempted and nothing was debited
    #[sea_orm(string_value = "FAILED")]
    Failed,
    /// Withdrawn by the user before settlement
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

/// PIX key kind of a withdrawal destination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixKeyType {
    #[sea_orm(string_value = "EMAIL")]
    Email,
    #[sea_orm(string_value = "PHONE")]
    Phone,
    #[sea_orm(string_value = "CPF")]
    Cpf,
    #[sea_orm(string_value = "RANDOM")]
    Random,
}

impl PixKeyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Cpf => "CPF",
            Self::Random => "RANDOM",
        }
    }
}

impl fmt::Display for PixKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixKeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Ok(Self::Email),
            "PHONE" => Ok(Self::Phone),
            "CPF" => Ok(Self::Cpf),
            "RANDOM" => Ok(Self::Random),
            other => Err(Error::validation(
                "pix_type",
                format!("unknown PIX key type '{other}', expected EMAIL, PHONE, CPF or RANDOM"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_pix_key_type_parses_case_insensitively() {
        assert_eq!("email".parse::<PixKeyType>().unwrap(), PixKeyType::Email);
        assert_eq!(" Cpf ".parse::<PixKeyType>().unwrap(), PixKeyType::Cpf);
        assert_eq!("RANDOM".parse::<PixKeyType>().unwrap(), PixKeyType::Random);
    }

    #[test]
    fn test_pix_key_type_rejects_unknown() {
        let err = "CNPJ".parse::<PixKeyType>().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "pix_type", .. }));
    }

    #[test]
    fn test_stored_values() {
        assert_eq!(TransactionStatus::Pending.to_value(), "PENDING");
        assert_eq!(TransactionType::Withdrawal.to_value(), "WITHDRAWAL");
        assert_eq!(PixKeyType::Phone.to_value(), "PHONE");
    }
}
