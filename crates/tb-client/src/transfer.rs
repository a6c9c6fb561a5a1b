//! Money movement: transfers between the user's own accounts and the
//! two-phase IBAN transfer, each followed by a background status poll.

use rand::Rng;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tb_api_types::{
    DEFAULT_CURRENCY, TransactionStatus, TransferRequest, extract_transaction_id, extract_transaction_status,
    first_text,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accounts::AccountsCache;
use crate::api::{ApiClient, path_segment};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::forms::FormGuards;
use crate::transport::Method;
use crate::ui::{Form, Notice, UiSink};
use crate::validation::{ValidationError, format_iban, validate_iban, validate_receiver_name};

const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `web-{epoch millis}-{6 random base36 chars}`, fresh for every submission attempt.
pub fn new_idempotency_key() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect();
    format!("web-{millis}-{suffix}")
}

/// Accepts `12.5` and `12,5`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.trim().replace(',', ".")).ok()
}

/// Phase-one data of an IBAN transfer, validated and kept for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecipient {
    pub iban: String,
    pub receiver_name: String,
    pub from_account_id: String,
}

impl ExternalRecipient {
    pub fn new(iban: &str, receiver_name: &str, from_account_id: &str) -> Result<Self, ValidationError> {
        let iban = validate_iban(iban)?;
        let receiver_name = validate_receiver_name(receiver_name)?;
        let from_account_id = from_account_id.trim();
        if from_account_id.is_empty() {
            return Err(ValidationError::new("fromAccountId", "Please select a sender account."));
        }
        Ok(Self {
            iban,
            receiver_name,
            from_account_id: from_account_id.to_owned(),
        })
    }

    pub fn formatted_iban(&self) -> String {
        format_iban(&self.iban)
    }
}

/// Accepted submission. `poll` resolves to the terminal status, if one was observed.
#[derive(Debug)]
pub struct TransferReceipt {
    pub idempotency_key: String,
    pub transaction_id: Option<String>,
    pub status: TransactionStatus,
    pub poll: Option<JoinHandle<Option<TransactionStatus>>>,
}

pub struct TransferOrchestrator {
    api: Arc<ApiClient>,
    accounts: Arc<AccountsCache>,
    forms: Arc<FormGuards>,
    ui: Arc<dyn UiSink>,
    config: Arc<ClientConfig>,
}

impl TransferOrchestrator {
    pub fn new(
        api: Arc<ApiClient>,
        accounts: Arc<AccountsCache>,
        forms: Arc<FormGuards>,
        ui: Arc<dyn UiSink>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            api,
            accounts,
            forms,
            ui,
            config,
        }
    }

    pub async fn submit_between_accounts(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<TransferReceipt, ApiError> {
        let _guard = self.forms.begin(Form::TransferBetweenAccounts)?;
        let owned = match self.accounts.load(false).await {
            Ok(accounts) => accounts,
            Err(err) => return Err(self.fail(err)),
        };
        if owned.len() < 2 {
            return Err(self.reject("You need at least 2 accounts to transfer between your accounts."));
        }
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() || amount <= Decimal::ZERO {
            return Err(self.reject("Please enter valid transfer details."));
        }
        if from == to {
            return Err(self.reject("Sender and receiver accounts cannot be the same."));
        }

        let request = TransferRequest {
            from_account_id: from.to_owned(),
            to_account_id: to.to_owned(),
            amount,
            currency: self.currency_of(from),
            description: description.map(str::trim).filter(|text| !text.is_empty()).map(ToOwned::to_owned),
            idempotency_key: new_idempotency_key(),
        };
        let receipt = match self.submit(&request).await {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.fail_transfer(err)),
        };
        let id = receipt.transaction_id.as_deref().unwrap_or_default();
        self.ui
            .notify(Notice::success(format!("Transfer request sent. Transaction ID: {id}")));
        Ok(receipt)
    }

    /// Phase one of an IBAN transfer. Loads the accounts if needed; no transfer is sent.
    pub async fn prepare_external(
        &self,
        iban: &str,
        receiver_name: &str,
        from_account_id: &str,
    ) -> Result<ExternalRecipient, ApiError> {
        let owned = match self.accounts.load(false).await {
            Ok(accounts) => accounts,
            Err(err) => return Err(self.fail(err)),
        };
        if owned.is_empty() {
            return Err(self.reject("You need at least one account to make a transfer."));
        }
        ExternalRecipient::new(iban, receiver_name, from_account_id).map_err(|err| self.reject(err.message))
    }

    /// Phase two. On failure the recipient is untouched so the form can be resubmitted.
    pub async fn submit_external(
        &self,
        recipient: &ExternalRecipient,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<TransferReceipt, ApiError> {
        let _guard = self.forms.begin(Form::ExternalTransfer)?;
        if amount <= Decimal::ZERO {
            return Err(self.reject("Please enter a valid amount."));
        }
        if let Some(source) = self.accounts.find(&recipient.from_account_id) {
            if source.balance < amount {
                let message = format!("Insufficient balance. Available balance: {:.2} TL", source.balance);
                self.ui.notify(Notice::error(message.clone()));
                return Err(ApiError::BusinessRule(message));
            }
        }

        let description = description
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("Transfer: {}", recipient.receiver_name));
        let request = TransferRequest {
            from_account_id: recipient.from_account_id.clone(),
            to_account_id: recipient.iban.clone(),
            amount,
            currency: self.currency_of(&recipient.from_account_id),
            description: Some(description),
            idempotency_key: new_idempotency_key(),
        };

        let receipt = match self.submit(&request).await {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.fail_transfer(err)),
        };
        match receipt.transaction_id.as_deref() {
            Some(id) => self
                .ui
                .notify(Notice::success(format!("Transfer created successfully! Transaction ID: {id}"))),
            None => self
                .ui
                .notify(Notice::info("Transfer request sent, but no transaction ID was returned.")),
        }
        Ok(receipt)
    }

    /// Posts one transfer and applies the optimistic balance move at most once
    /// per idempotency key. A rejected submission (409 included) changes nothing.
    pub async fn submit(&self, request: &TransferRequest) -> Result<TransferReceipt, ApiError> {
        let payload = self
            .api
            .call_with("/v1/transactions/transfer", Method::Post, request, true)
            .await?
            .into_json();

        let transaction_id = extract_transaction_id(&payload);
        let status = extract_transaction_status(&payload);
        info!(
            idempotency_key = %request.idempotency_key,
            transaction_id = transaction_id.as_deref().unwrap_or("-"),
            status = status.as_str(),
            "transfer accepted"
        );

        if status != TransactionStatus::Failed {
            self.accounts.apply_transfer_once(
                &request.idempotency_key,
                &request.from_account_id,
                &request.to_account_id,
                request.amount,
            );
        }

        let poll = match (&transaction_id, status) {
            (Some(id), status) if status.is_in_flight() => Some(self.poll_status(id.clone())),
            (_, TransactionStatus::Completed) => {
                self.ui.notify(Notice::success("Transfer completed successfully!"));
                None
            }
            (_, TransactionStatus::Failed) => {
                let reason = first_text(&payload, &["failureReason", "failureDetails"])
                    .unwrap_or_else(|| "Unknown reason".to_owned());
                self.ui.notify(Notice::error(format!("Transfer failed: {reason}")));
                None
            }
            _ => None,
        };

        Ok(TransferReceipt {
            idempotency_key: request.idempotency_key.clone(),
            transaction_id,
            status,
            poll,
        })
    }

    /// Polls `/v1/transactions/{id}` until it leaves PENDING/PROCESSING or the
    /// attempt limit runs out. Runs detached from the submitting form.
    pub fn poll_status(&self, transaction_id: String) -> JoinHandle<Option<TransactionStatus>> {
        let api = self.api.clone();
        let ui = self.ui.clone();
        let attempts = self.config.poll_attempts.max(1);
        let interval = self.config.poll_interval;

        tokio::spawn(async move {
            let endpoint = format!("/v1/transactions/{}", path_segment(&transaction_id));
            for attempt in 1..=attempts {
                match api.get::<Value>(&endpoint).await {
                    Ok(payload) => {
                        let status = extract_transaction_status(&payload);
                        if !status.is_in_flight() {
                            let notice = format!("Transaction status: {}", status.as_str());
                            if status == TransactionStatus::Completed {
                                ui.notify(Notice::success(notice));
                            } else {
                                ui.notify(Notice::error(notice));
                            }
                            return Some(status);
                        }
                    }
                    Err(ApiError::AuthExpired) => return None,
                    Err(err) => debug!(attempt, %transaction_id, "status poll failed: {err}"),
                }
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
            warn!(%transaction_id, "transaction still pending after polling");
            ui.notify(Notice::info(format!(
                "Transaction {transaction_id} is still being processed."
            )));
            None
        })
    }

    fn currency_of(&self, account_id: &str) -> String {
        self.accounts
            .find(account_id)
            .map(|account| account.currency)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned())
    }

    fn reject(&self, message: impl Into<String>) -> ApiError {
        let message = message.into();
        self.ui.notify(Notice::error(message.clone()));
        ApiError::Validation(message)
    }

    fn fail(&self, err: ApiError) -> ApiError {
        self.ui.notify(Notice::error(err.to_string()));
        err
    }

    fn fail_transfer(&self, err: ApiError) -> ApiError {
        warn!("transfer rejected: {err}");
        self.ui.notify(Notice::error(transfer_failure(&err)));
        err
    }
}

fn transfer_failure(err: &ApiError) -> String {
    match err.status() {
        Some(400) => format!("Invalid request: {err}"),
        Some(401) => "Your session has expired. Please sign in again.".to_owned(),
        Some(403) => "You are not authorized for this operation.".to_owned(),
        Some(404) => "Account not found. Please check the account details.".to_owned(),
        Some(409) => "This transfer was already submitted (duplicate request).".to_owned(),
        Some(429) => "Too many requests. Please try again later.".to_owned(),
        Some(500) => "Server error. Please try again later.".to_owned(),
        Some(status) if status > 500 => format!("Server error ({status}). Please try again later."),
        _ => format!("Transfer failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CustomerProfile;
    use crate::testkit::Harness;
    use serde_json::json;

    const IBAN: &str = "TR330006100519786457841326";

    async fn funded() -> anyhow::Result<Harness> {
        let harness = Harness::signed_in("u-1");
        harness.ctx.session.set_profile(CustomerProfile {
            client_id: Some("c-1".to_owned()),
            ..CustomerProfile::default()
        });
        harness.transport.on(
            Method::Get,
            "/v1/accounts",
            200,
            json!([{"id": "a-1", "status": "ACTIVE"}, {"id": "a-2", "status": "ACTIVE"}]),
        );
        harness
            .transport
            .on(Method::Get, "/api/v1/ledger/balances/a-1", 200, json!({"balance": 100}));
        harness
            .transport
            .on(Method::Get, "/api/v1/ledger/balances/a-2", 200, json!({"balance": 50}));
        harness.ctx.accounts.load(false).await?;
        Ok(harness)
    }

    fn balance(harness: &Harness, id: &str) -> Option<Decimal> {
        harness.ctx.accounts.find(id).map(|account| account.balance)
    }

    #[test]
    fn idempotency_keys_are_unique_and_shaped() {
        let first = new_idempotency_key();
        let second = new_idempotency_key();
        assert_ne!(first, second);

        let parts: Vec<&str> = first.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "web");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 6);
    }

    #[test]
    fn amounts_accept_comma_decimal_separator() {
        assert_eq!(parse_amount("12,5"), Some(Decimal::new(125, 1)));
        assert_eq!(parse_amount("abc"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn between_accounts_applies_optimistic_update_and_polls() -> anyhow::Result<()> {
        let harness = funded().await?;
        harness
            .transport
            .on(Method::Post, "/v1/transactions/transfer", 201, json!({"id": "t-1", "status": "PENDING"}));
        harness
            .transport
            .on(Method::Get, "/v1/transactions/t-1", 200, json!({"status": "PENDING"}));
        harness
            .transport
            .on(Method::Get, "/v1/transactions/t-1", 200, json!({"status": "PROCESSING"}));
        harness
            .transport
            .on(Method::Get, "/v1/transactions/t-1", 200, json!({"status": "COMPLETED"}));

        let receipt = harness
            .ctx
            .transfers
            .submit_between_accounts("a-1", "a-2", Decimal::from(30), None)
            .await?;

        assert_eq!(balance(&harness, "a-1"), Some(Decimal::from(70)));
        assert_eq!(balance(&harness, "a-2"), Some(Decimal::from(80)));
        let body = harness
            .transport
            .last_body(Method::Post, "/v1/transactions/transfer")
            .unwrap();
        assert_eq!(body["idempotencyKey"], json!(receipt.idempotency_key));
        assert_eq!(body["currency"], "TRY");

        let terminal = receipt.poll.unwrap().await?;
        assert_eq!(terminal, Some(TransactionStatus::Completed));
        assert_eq!(harness.transport.count(Method::Get, "/v1/transactions/t-1"), 3);
        assert!(harness
            .ui
            .notices()
            .contains(&Notice::success("Transaction status: COMPLETED")));
        Ok(())
    }

    #[tokio::test]
    async fn same_account_is_rejected_locally() -> anyhow::Result<()> {
        let harness = funded().await?;

        let result = harness
            .ctx
            .transfers
            .submit_between_accounts("a-1", "a-1", Decimal::from(5), None)
            .await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(harness.transport.count(Method::Post, "/v1/transactions/transfer"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn resubmitting_the_same_key_debits_once() -> anyhow::Result<()> {
        let harness = funded().await?;
        harness
            .transport
            .on(Method::Post, "/v1/transactions/transfer", 200, json!({"id": "t-1", "status": "COMPLETED"}));
        let request = TransferRequest {
            from_account_id: "a-1".to_owned(),
            to_account_id: "a-2".to_owned(),
            amount: Decimal::from(30),
            currency: "TRY".to_owned(),
            description: None,
            idempotency_key: "web-1-abcdef".to_owned(),
        };

        harness.ctx.transfers.submit(&request).await?;
        harness.ctx.transfers.submit(&request).await?;

        assert_eq!(balance(&harness, "a-1"), Some(Decimal::from(70)));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_conflict_changes_nothing() -> anyhow::Result<()> {
        let harness = funded().await?;
        harness
            .transport
            .on(Method::Post, "/v1/transactions/transfer", 409, json!({"message": "duplicate"}));
        let recipient = harness.ctx.transfers.prepare_external(IBAN, "Ayşe Çelik", "a-1").await?;

        let err = harness
            .ctx
            .transfers
            .submit_external(&recipient, Decimal::from(10), None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(409));
        assert_eq!(balance(&harness, "a-1"), Some(Decimal::from(100)));
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("This transfer was already submitted (duplicate request).")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn external_transfer_checks_balance_before_sending() -> anyhow::Result<()> {
        let harness = funded().await?;
        let recipient = harness.ctx.transfers.prepare_external(IBAN, "Ayşe Çelik", "a-2").await?;

        let result = harness
            .ctx
            .transfers
            .submit_external(&recipient, Decimal::from(75), None)
            .await;

        assert!(matches!(result, Err(ApiError::BusinessRule(_))));
        assert_eq!(harness.transport.count(Method::Post, "/v1/transactions/transfer"), 0);
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("Insufficient balance. Available balance: 50.00 TL")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn external_transfer_sends_iban_and_default_description() -> anyhow::Result<()> {
        let harness = funded().await?;
        harness
            .transport
            .on(Method::Post, "/v1/transactions/transfer", 200, json!({"transactionId": "t-5", "status": "COMPLETED"}));
        let recipient = harness
            .ctx
            .transfers
            .prepare_external("tr33 0006 1005 1978 6457 8413 26", "Ayşe Çelik", "a-1")
            .await?;
        assert_eq!(recipient.formatted_iban(), "TR33 0006 1005 1978 6457 8413 26");

        let receipt = harness
            .ctx
            .transfers
            .submit_external(&recipient, Decimal::from(25), None)
            .await?;

        let body = harness
            .transport
            .last_body(Method::Post, "/v1/transactions/transfer")
            .unwrap();
        assert_eq!(body["toAccountId"], IBAN);
        assert_eq!(body["description"], "Transfer: Ayşe Çelik");
        assert_eq!(receipt.transaction_id.as_deref(), Some("t-5"));
        assert!(receipt.poll.is_none());
        assert_eq!(balance(&harness, "a-1"), Some(Decimal::from(75)));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_recipient_is_rejected_in_phase_one() -> anyhow::Result<()> {
        let harness = funded().await?;

        let result = harness
            .ctx
            .transfers
            .prepare_external("TR00 0000 0000 0000 0000 0000 00", "Ayşe Çelik", "a-1")
            .await;

        assert!(result.is_err());
        assert_eq!(harness.ui.notices().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn phase_one_loads_accounts_on_a_cold_cache() -> anyhow::Result<()> {
        let harness = Harness::signed_in("u-1");
        harness.ctx.session.set_profile(CustomerProfile {
            client_id: Some("c-1".to_owned()),
            ..CustomerProfile::default()
        });
        harness.transport.on(
            Method::Get,
            "/v1/accounts",
            200,
            json!([{"id": "a-1", "status": "ACTIVE"}, {"id": "a-2", "status": "ACTIVE"}]),
        );

        let recipient = harness
            .ctx
            .transfers
            .prepare_external(IBAN, "Ada Yilmaz", "a-1")
            .await?;

        assert_eq!(recipient.from_account_id, "a-1");
        assert_eq!(harness.transport.count(Method::Get, "/v1/accounts"), 1);
        assert!(harness.ui.notices().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn phase_one_without_accounts_is_refused() -> anyhow::Result<()> {
        let harness = Harness::signed_in("u-1");
        harness.ctx.session.set_profile(CustomerProfile {
            client_id: Some("c-1".to_owned()),
            ..CustomerProfile::default()
        });
        harness.transport.on(Method::Get, "/v1/accounts", 200, json!([]));

        let result = harness.ctx.transfers.prepare_external(IBAN, "Ada Yilmaz", "a-1").await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::error("You need at least one account to make a transfer.")]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn polling_gives_up_after_ten_attempts() -> anyhow::Result<()> {
        let harness = funded().await?;
        harness
            .transport
            .on(Method::Get, "/v1/transactions/t-7", 200, json!({"status": "PENDING"}));

        let terminal = harness.ctx.transfers.poll_status("t-7".to_owned()).await?;

        assert_eq!(terminal, None);
        assert_eq!(harness.transport.count(Method::Get, "/v1/transactions/t-7"), 10);
        assert_eq!(
            harness.ui.notices(),
            vec![Notice::info("Transaction t-7 is still being processed.")]
        );
        Ok(())
    }
}
