//! In-memory accounts cache with balances.
//!
//! Reads are served from memory unless a forced refresh is requested. At most
//! one population runs at a time; callers arriving mid-load wait for it and
//! reuse its result. Optimistic transfer adjustments never fail.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tb_api_types::{AccountRecord, AccountStatus, BalanceRecord, DEFAULT_CURRENCY, ListEnvelope};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Query, path_segment};
use crate::error::ApiError;
use crate::profile::ProfileService;
use crate::session::SessionStore;

const APPLIED_KEYS_CAP: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub account_number: Option<String>,
    pub product_code: Option<String>,
    pub currency: String,
    pub balance: Decimal,
    pub available_balance: Decimal,
    pub status: Option<AccountStatus>,
}

impl Account {
    fn from_record(record: AccountRecord, balance: Option<BalanceRecord>) -> Self {
        let (balance_value, available) = balance.as_ref().map(BalanceRecord::resolved).unwrap_or_default();
        let currency = record
            .currency
            .or_else(|| balance.and_then(|balance| balance.currency))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());
        Self {
            id: record.id,
            account_number: record.account_number,
            product_code: record.product_code,
            currency,
            balance: balance_value,
            available_balance: available,
            status: record.status,
        }
    }

    /// Matches either the internal id or the account number (IBAN).
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        !key.is_empty()
            && (self.id == key
                || self
                    .account_number
                    .as_deref()
                    .is_some_and(|number| number.replace(' ', "").eq_ignore_ascii_case(&key.replace(' ', ""))))
    }
}

#[derive(Debug, Default)]
struct CacheState {
    accounts: Vec<Account>,
    populated: bool,
    last_updated: Option<SystemTime>,
    epoch: u64,
    /// Most recent idempotency keys already applied, oldest first.
    applied_keys: VecDeque<String>,
}

pub struct AccountsCache {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    profile: Arc<ProfileService>,
    state: Mutex<CacheState>,
    load_lock: tokio::sync::Mutex<()>,
    loads: AtomicU64,
}

impl AccountsCache {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>, profile: Arc<ProfileService>) -> Self {
        Self {
            api,
            session,
            profile,
            state: Mutex::new(CacheState::default()),
            load_lock: tokio::sync::Mutex::new(()),
            loads: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Contents belonging to the current session, if populated.
    fn snapshot(&self) -> Option<Vec<Account>> {
        let state = self.state();
        (state.populated && state.epoch == self.session.epoch()).then(|| state.accounts.clone())
    }

    pub async fn load(&self, force: bool) -> Result<Vec<Account>, ApiError> {
        if !force {
            if let Some(accounts) = self.snapshot() {
                return Ok(accounts);
            }
        }

        let seen = self.loads.load(Ordering::SeqCst);
        let _loading = self.load_lock.lock().await;
        if self.loads.load(Ordering::SeqCst) != seen {
            if let Some(accounts) = self.snapshot() {
                debug!("reusing accounts loaded while waiting");
                return Ok(accounts);
            }
        }

        let epoch = self.session.epoch();
        let accounts = self.fetch().await?;
        {
            let mut state = self.state();
            if state.epoch != epoch {
                state.applied_keys.clear();
            }
            state.accounts = accounts.clone();
            state.populated = true;
            state.epoch = epoch;
            state.last_updated = Some(SystemTime::now());
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        info!(count = accounts.len(), "accounts loaded");
        Ok(accounts)
    }

    async fn fetch(&self) -> Result<Vec<Account>, ApiError> {
        let customer_id = self.customer_id().await?;
        let endpoint = Query::new()
            .push("customerId", &customer_id)
            .push("status", "ACTIVE")
            .to_endpoint("/v1/accounts");
        let records = self
            .api
            .get::<ListEnvelope<AccountRecord>>(&endpoint)
            .await?
            .into_vec()
            .into_iter()
            .filter(AccountRecord::is_active)
            .collect::<Vec<_>>();

        let balances = join_all(records.iter().map(|record| self.fetch_balance(&record.id))).await;
        Ok(records
            .into_iter()
            .zip(balances)
            .map(|(record, balance)| Account::from_record(record, balance))
            .collect())
    }

    async fn fetch_balance(&self, account_id: &str) -> Option<BalanceRecord> {
        let endpoint = format!("/api/v1/ledger/balances/{}", path_segment(account_id));
        match self.api.get::<BalanceRecord>(&endpoint).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                warn!(account_id, "balance fetch failed, showing zero: {err}");
                None
            }
        }
    }

    /// Client id from the loaded profile, the client record, or the user id, in that order.
    pub async fn customer_id(&self) -> Result<String, ApiError> {
        if let Some(client_id) = self.session.client_id() {
            return Ok(client_id);
        }
        match self.profile.fetch_client().await {
            Ok(Some(profile)) => {
                if let Some(client_id) = profile.client_id.filter(|id| !id.trim().is_empty()) {
                    return Ok(client_id);
                }
            }
            Ok(None) => debug!("no client record, falling back to user id"),
            Err(ApiError::AuthExpired) => return Err(ApiError::AuthExpired),
            Err(err) => debug!("client lookup failed, falling back to user id: {err}"),
        }
        self.session
            .user_id()
            .ok_or_else(|| ApiError::Validation("No active session. Please sign in.".to_owned()))
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.snapshot().unwrap_or_default()
    }

    pub fn find(&self, key: &str) -> Option<Account> {
        self.accounts().into_iter().find(|account| account.matches(key))
    }

    pub fn last_updated(&self) -> Option<SystemTime> {
        let state = self.state();
        (state.epoch == self.session.epoch()).then_some(state.last_updated).flatten()
    }

    pub fn is_loading(&self) -> bool {
        self.load_lock.try_lock().is_err()
    }

    /// Moves `amount` locally from `from` to `to` (id or account number).
    /// The source is floored at zero; an unknown destination is left alone.
    pub fn apply_optimistic_transfer(&self, from: &str, to: &str, amount: Decimal) {
        if amount <= Decimal::ZERO {
            return;
        }
        let mut state = self.state();
        if let Some(source) = state.accounts.iter_mut().find(|account| account.matches(from)) {
            source.balance = (source.balance - amount).max(Decimal::ZERO);
            source.available_balance = (source.available_balance - amount).max(Decimal::ZERO);
        }
        if let Some(target) = state.accounts.iter_mut().find(|account| account.matches(to)) {
            if !target.matches(from) {
                target.balance += amount;
                target.available_balance += amount;
            }
        }
    }

    /// Applies a transfer at most once per idempotency key.
    pub fn apply_transfer_once(&self, idempotency_key: &str, from: &str, to: &str, amount: Decimal) -> bool {
        {
            let mut state = self.state();
            if state.applied_keys.iter().any(|key| key == idempotency_key) {
                debug!(idempotency_key, "optimistic update already applied");
                return false;
            }
            if state.applied_keys.len() >= APPLIED_KEYS_CAP {
                state.applied_keys.pop_front();
            }
            state.applied_keys.push_back(idempotency_key.to_owned());
        }
        self.apply_optimistic_transfer(from, to, amount);
        true
    }

    pub fn remove(&self, account_id: &str) {
        self.state().accounts.retain(|account| account.id != account_id);
    }

    pub fn clear(&self) {
        *self.state() = CacheState::default();
    }
}
