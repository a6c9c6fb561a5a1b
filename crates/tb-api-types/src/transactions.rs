use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::TransactionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account_id: String,
    /// Internal account id, or an IBAN for external transfers.
    pub to_account_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(alias = "transactionId", alias = "transaction_id")]
    pub id: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default, alias = "transactionStatus")]
    pub status: Option<TransactionStatus>,
    #[serde(default, alias = "amount")]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub from_account_id: Option<String>,
    #[serde(default)]
    pub to_account_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub failure_details: Option<String>,
}

impl TransactionRecord {
    pub fn status_or_pending(&self) -> TransactionStatus {
        self.status.unwrap_or(TransactionStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_amount_is_sent_as_a_number() {
        let body = serde_json::to_value(TransferRequest {
            from_account_id: "a-1".to_owned(),
            to_account_id: "TR330006100519786457841326".to_owned(),
            amount: Decimal::new(2550, 2),
            currency: "TRY".to_owned(),
            description: None,
            idempotency_key: "web-1-abcdef".to_owned(),
        })
        .unwrap();

        assert_eq!(body["amount"], 25.5);
        assert_eq!(body["idempotencyKey"], "web-1-abcdef");
        assert!(body.get("description").is_none());
    }

    #[test]
    fn failed_transaction_exposes_details() {
        let record: TransactionRecord = serde_json::from_str(
            r#"{"transactionId":"t-9","status":"FAILED","failureReason":"LEDGER","failureDetails":"Insufficient funds"}"#,
        )
        .unwrap();

        assert_eq!(record.status_or_pending(), TransactionStatus::Failed);
        assert_eq!(record.failure_details.as_deref(), Some("Insufficient funds"));
    }
}
