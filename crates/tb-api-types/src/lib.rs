mod accounts;
mod auth;
mod cards;
mod normalize;
mod transactions;

pub use accounts::*;
pub use auth::*;
pub use cards::*;
pub use normalize::*;
pub use transactions::*;

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_CURRENCY: &str = "TRY";

/// Decoded case-insensitively: the accounts service is not consistent about `ACTIVE` vs `active`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Closed,
    Frozen,
    Pending,
    Unknown,
}

impl AccountStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => AccountStatus::Active,
            "CLOSED" => AccountStatus::Closed,
            "FROZEN" => AccountStatus::Frozen,
            "PENDING" => AccountStatus::Pending,
            _ => AccountStatus::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for AccountStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AccountStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Debit,
    #[serde(alias = "SANAL")]
    Virtual,
    Credit,
    #[serde(other)]
    Unknown,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "DEBIT",
            CardType::Virtual => "VIRTUAL",
            CardType::Credit => "CREDIT",
            CardType::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Active,
    Blocked,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    /// `Pending` and `Processing` are the only states a poller keeps waiting on.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TransactionStatus::Pending,
            "PROCESSING" => TransactionStatus::Processing,
            "COMPLETED" => TransactionStatus::Completed,
            "FAILED" => TransactionStatus::Failed,
            _ => TransactionStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Unknown => "UNKNOWN",
        }
    }
}

/// List responses arrive as a bare array, `{ "items": [...] }` or a Spring page `{ "content": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Items { items: Vec<T> },
    Page { content: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) => items,
            ListEnvelope::Items { items } => items,
            ListEnvelope::Page { content } => content,
        }
    }
}
