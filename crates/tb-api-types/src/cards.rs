use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{CardStatus, CardType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub id: String,
    #[serde(alias = "type")]
    pub card_type: CardType,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub cardholder_name: Option<String>,
    #[serde(default)]
    pub expiry_month: Option<u32>,
    #[serde(default)]
    pub expiry_year: Option<u32>,
    #[serde(default, alias = "brand")]
    pub card_brand: Option<String>,
    pub status: CardStatus,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub block_reason: Option<String>,
    /// Type-specific attributes (limits, single-use flags, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl CardRecord {
    pub fn expiry(&self) -> Option<String> {
        match (self.expiry_month, self.expiry_year) {
            (Some(month), Some(year)) => Some(format!("{month:02}/{}", year % 100)),
            _ => None,
        }
    }

    /// Virtual cards that left `ACTIVE` are soft-deleted and never shown.
    pub fn is_listed(&self) -> bool {
        self.card_type != CardType::Virtual || self.status == CardStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDebitCardRequest {
    pub account_id: String,
    pub cardholder_name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub daily_withdrawal_limit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atm_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVirtualCardRequest {
    pub account_id: String,
    pub cardholder_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_use: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_use_validity_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_restriction: Option<String>,
}
