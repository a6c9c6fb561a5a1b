use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::AccountStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(alias = "accountId", alias = "account_id")]
    pub id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default, alias = "iban", alias = "Iban")]
    pub account_number: Option<String>,
    #[serde(default, alias = "type", alias = "product")]
    pub product_code: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

impl AccountRecord {
    pub fn is_active(&self) -> bool {
        self.status == Some(AccountStatus::Active)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRecord {
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default, alias = "available_balance")]
    pub available_balance: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl BalanceRecord {
    /// Ledger responses sometimes carry only one of the two figures.
    pub fn resolved(&self) -> (Decimal, Decimal) {
        let balance = self.balance.or(self.available_balance).unwrap_or_default();
        let available = self.available_balance.or(self.balance).unwrap_or_default();
        (balance, available)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub customer_id: String,
    pub currency: String,
    pub product_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAccountStatusRequest {
    pub status: AccountStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementEntry {
    #[serde(default)]
    pub entry_id: Option<i64>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub running_balance: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMetadata {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub total_elements: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatement {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub opening_balance: Option<Decimal>,
    #[serde(default)]
    pub closing_balance: Option<Decimal>,
    #[serde(default)]
    pub total_debits: Option<Decimal>,
    #[serde(default)]
    pub total_credits: Option<Decimal>,
    #[serde(default)]
    pub entries: Vec<StatementEntry>,
    #[serde(default)]
    pub pagination: Option<PaginationMetadata>,
}
