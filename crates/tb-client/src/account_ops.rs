//! Account lifecycle actions and ledger/transaction reads.

use rust_decimal::Decimal;
use std::sync::Arc;
use tb_api_types::{
    AccountRecord, AccountStatement, AccountStatus, BalanceRecord, CreateAccountRequest, DEFAULT_CURRENCY,
    ListEnvelope, TransactionRecord, TransactionStatus, UpdateAccountStatusRequest,
};
use tracing::{info, warn};

use crate::accounts::AccountsCache;
use crate::api::{ApiClient, Query, path_segment};
use crate::error::ApiError;
use crate::forms::FormGuards;
use crate::session::SessionStore;
use crate::transport::Method;
use crate::ui::{Form, Notice, UiSink};

pub const DEFAULT_PRODUCT_CODE: &str = "CHECKING_TRY";
const CLOSE_REASON: &str = "Closed at customer request";
const BALANCE_KEYWORDS: &[&str] = &["balance", "bakiye", "para"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

/// Statement filters. Page defaults to 0 and size to 20.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub entry_type: Option<EntryType>,
    pub keyword: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub include_running_balance: Option<bool>,
}

impl StatementQuery {
    fn to_endpoint(&self, account_id: &str) -> String {
        Query::new()
            .push_opt("startDate", self.start_date.as_deref())
            .push_opt("endDate", self.end_date.as_deref())
            .push_opt("type", self.entry_type.map(|kind| kind.as_str()))
            .push_opt("keyword", self.keyword.as_deref().filter(|word| !word.trim().is_empty()))
            .push("page", self.page.unwrap_or(0))
            .push("size", self.size.unwrap_or(20))
            .push_opt("includeRunningBalance", self.include_running_balance)
            .to_endpoint(&format!(
                "/api/v1/ledger/accounts/{}/statement",
                path_segment(account_id)
            ))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<TransactionStatus>,
    pub sort: Option<String>,
}

pub struct AccountService {
    api: Arc<ApiClient>,
    accounts: Arc<AccountsCache>,
    session: Arc<SessionStore>,
    forms: Arc<FormGuards>,
    ui: Arc<dyn UiSink>,
}

impl AccountService {
    pub fn new(
        api: Arc<ApiClient>,
        accounts: Arc<AccountsCache>,
        session: Arc<SessionStore>,
        forms: Arc<FormGuards>,
        ui: Arc<dyn UiSink>,
    ) -> Self {
        Self {
            api,
            accounts,
            session,
            forms,
            ui,
        }
    }

    /// Opens a TRY checking account for the signed-in customer.
    pub async fn create_account(&self) -> Result<AccountRecord, ApiError> {
        let _guard = self.forms.begin(Form::AccountAction)?;
        if !self.session.is_signed_in() {
            return Err(self.reject("No active session. Please sign in."));
        }
        if self.session.client_id().is_none() {
            // Looks the client record up and stores it on the session when found.
            if let Err(ApiError::AuthExpired) = self.accounts.customer_id().await {
                return Err(self.fail(ApiError::AuthExpired));
            }
        }
        let Some(customer_id) = self.session.client_id() else {
            return Err(self.reject(
                "Your client record is not yet created. Please try again after your profile is available.",
            ));
        };

        let request = CreateAccountRequest {
            customer_id,
            currency: DEFAULT_CURRENCY.to_owned(),
            product_code: DEFAULT_PRODUCT_CODE.to_owned(),
        };
        let created = match self.api.call_with("/v1/accounts", Method::Post, &request, true).await {
            Ok(payload) => payload.decode::<AccountRecord>(),
            Err(err) => Err(err),
        };
        match created {
            Ok(account) => {
                info!(account_id = %account.id, "account created");
                self.ui.notify(Notice::success("Account created successfully."));
                self.refresh_accounts().await;
                Ok(account)
            }
            Err(err) => {
                let message = match err.status() {
                    Some(400) => "Invalid request. Please check the information.".to_owned(),
                    Some(401) => err.to_string(),
                    _ => "Error creating account.".to_owned(),
                };
                self.ui.notify(Notice::error(message));
                Err(err)
            }
        }
    }

    /// Closes an account whose balance is zero. The ledger is asked first; if it
    /// cannot answer, the cached balance decides and the backend has the final say.
    pub async fn close_account(&self, account_id: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::AccountAction)?;
        let (balance, currency) = match self.fetch_balance(account_id).await {
            Ok(record) => {
                let (balance, available) = record.resolved();
                let held = if available > Decimal::ZERO { available } else { balance };
                (held, record.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_owned()))
            }
            Err(err) => {
                warn!(account_id, "balance check before close failed: {err}");
                self.accounts
                    .find(account_id)
                    .map(|account| (account.balance, account.currency))
                    .unwrap_or((Decimal::ZERO, DEFAULT_CURRENCY.to_owned()))
            }
        };
        if balance > Decimal::ZERO {
            let message = format!(
                "Account cannot be closed. Account has {balance:.2} {currency}. Balance must be 0 to close the account."
            );
            self.ui.notify(Notice::error(message.clone()));
            return Err(ApiError::BusinessRule(message));
        }

        let request = UpdateAccountStatusRequest {
            status: AccountStatus::Closed,
            reason: CLOSE_REASON.to_owned(),
        };
        let endpoint = format!("/v1/accounts/{}/status", path_segment(account_id));
        match self.api.call_with(&endpoint, Method::Patch, &request, true).await {
            Ok(_) => {
                info!(account_id, "account closed");
                self.accounts.remove(account_id);
                self.ui.notify(Notice::success("Account closed successfully."));
                self.refresh_accounts().await;
                Ok(())
            }
            Err(err) => {
                let text = err.server_text();
                if BALANCE_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
                    let message =
                        "Account cannot be closed. Account has balance. Balance must be 0 to close the account.";
                    self.ui.notify(Notice::error(message));
                    return Err(ApiError::BusinessRule(message.to_owned()));
                }
                self.ui.notify(Notice::error("Error closing account."));
                Err(err)
            }
        }
    }

    async fn refresh_accounts(&self) {
        if let Err(err) = self.accounts.load(true).await {
            warn!("accounts reload after action failed: {err}");
        }
    }

    pub async fn get_account(&self, account_id: &str) -> Result<AccountRecord, ApiError> {
        self.api
            .get(&format!("/v1/accounts/{}", path_segment(account_id)))
            .await
    }

    pub async fn fetch_balance(&self, account_id: &str) -> Result<BalanceRecord, ApiError> {
        self.api
            .get(&format!("/api/v1/ledger/balances/{}", path_segment(account_id)))
            .await
    }

    pub async fn fetch_statement(
        &self,
        account_id: &str,
        query: &StatementQuery,
    ) -> Result<AccountStatement, ApiError> {
        self.api.get(&query.to_endpoint(account_id)).await
    }

    pub async fn list_transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<TransactionRecord>, ApiError> {
        let endpoint = Query::new()
            .push("accountId", account_id)
            .push_opt("page", query.page)
            .push_opt("size", query.size)
            .push_opt("status", query.status.map(|status| status.as_str()))
            .push_opt("sort", query.sort.as_deref())
            .to_endpoint("/v1/transactions");
        Ok(self
            .api
            .get::<ListEnvelope<TransactionRecord>>(&endpoint)
            .await?
            .into_vec())
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Result<TransactionRecord, ApiError> {
        self.api
            .get(&format!("/v1/transactions/{}", path_segment(transaction_id)))
            .await
    }

    fn reject(&self, message: &str) -> ApiError {
        self.ui.notify(Notice::error(message));
        ApiError::Validation(message.to_owned())
    }

    fn fail(&self, err: ApiError) -> ApiError {
        self.ui.notify(Notice::error(err.to_string()));
        err
    }
}
