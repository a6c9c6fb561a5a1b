//! Card listing and lifecycle actions.
//!
//! Inactive virtual cards are soft-deleted: they stay on the server but are
//! dropped from every list this service returns.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tb_api_types::{CardRecord, CardType, IssueDebitCardRequest, IssueVirtualCardRequest, ListEnvelope};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Query, path_segment};
use crate::error::ApiError;
use crate::forms::FormGuards;
use crate::transport::Method;
use crate::ui::{Form, Notice, UiSink};

/// Client-side type filter applied after the server query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CardFilter {
    #[default]
    All,
    Debit,
    Virtual,
}

impl CardFilter {
    fn admits(&self, card: &CardRecord) -> bool {
        match self {
            CardFilter::All => true,
            CardFilter::Debit => card.card_type == CardType::Debit,
            CardFilter::Virtual => card.card_type == CardType::Virtual,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardQuery {
    pub customer_id: Option<String>,
    pub account_id: Option<String>,
    pub card_types: Vec<CardType>,
    pub filter: CardFilter,
}

impl CardQuery {
    fn to_endpoint(&self) -> String {
        let types = (!self.card_types.is_empty()).then(|| {
            self.card_types
                .iter()
                .map(CardType::as_str)
                .collect::<Vec<_>>()
                .join(",")
        });
        Query::new()
            .push_opt("customerId", self.customer_id.as_deref())
            .push_opt("accountId", self.account_id.as_deref())
            .push_opt("cardType", types)
            .to_endpoint("/v1/cards")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    UserRequest,
    /// Deleting a virtual card. Same call, different wording.
    UserDeleted,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::UserRequest => "user_request",
            BlockReason::UserDeleted => "user_deleted",
        }
    }
}

pub struct CardService {
    api: Arc<ApiClient>,
    forms: Arc<FormGuards>,
    ui: Arc<dyn UiSink>,
    last_query: Mutex<CardQuery>,
    cards: Mutex<Vec<CardRecord>>,
}

impl CardService {
    pub fn new(api: Arc<ApiClient>, forms: Arc<FormGuards>, ui: Arc<dyn UiSink>) -> Self {
        Self {
            api,
            forms,
            ui,
            last_query: Mutex::new(CardQuery::default()),
            cards: Mutex::new(Vec::new()),
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last list result.
    pub fn cards(&self) -> Vec<CardRecord> {
        Self::lock(&self.cards).clone()
    }

    pub async fn list(&self, query: CardQuery) -> Result<Vec<CardRecord>, ApiError> {
        match self.fetch(query).await {
            Ok(cards) => Ok(cards),
            Err(err) => {
                warn!("card list failed: {err}");
                self.ui.notify(Notice::error("Error loading cards."));
                Err(err)
            }
        }
    }

    async fn fetch(&self, query: CardQuery) -> Result<Vec<CardRecord>, ApiError> {
        let cards = self
            .api
            .get::<ListEnvelope<CardRecord>>(&query.to_endpoint())
            .await?
            .into_vec()
            .into_iter()
            .filter(|card| card.is_listed() && query.filter.admits(card))
            .collect::<Vec<_>>();
        debug!(count = cards.len(), "cards loaded");
        *Self::lock(&self.cards) = cards.clone();
        *Self::lock(&self.last_query) = query;
        Ok(cards)
    }

    /// Forced refresh of the last list after a mutating action.
    async fn reload(&self) {
        let query = Self::lock(&self.last_query).clone();
        if let Err(err) = self.fetch(query).await {
            warn!("card list reload failed: {err}");
        }
    }

    pub async fn get(&self, card_id: &str) -> Result<CardRecord, ApiError> {
        let endpoint = format!("/v1/cards/{}", path_segment(card_id));
        self.api.get::<CardRecord>(&endpoint).await.map_err(|err| {
            self.ui.notify(Notice::error("Error loading card details."));
            err
        })
    }

    pub async fn issue_debit(&self, request: &IssueDebitCardRequest) -> Result<CardRecord, ApiError> {
        self.issue("/v1/cards/debit", &request.account_id, request, "Debit card request sent.")
            .await
    }

    pub async fn issue_virtual(&self, request: &IssueVirtualCardRequest) -> Result<CardRecord, ApiError> {
        self.issue("/v1/cards/virtual", &request.account_id, request, "Virtual card created.")
            .await
    }

    async fn issue<B: Serialize>(
        &self,
        endpoint: &str,
        account_id: &str,
        request: &B,
        success: &str,
    ) -> Result<CardRecord, ApiError> {
        let _guard = self.forms.begin(Form::CardAction)?;
        if account_id.trim().is_empty() {
            let message = "Please select an account.";
            self.ui.notify(Notice::error(message));
            return Err(ApiError::Validation(message.to_owned()));
        }

        let card = match self.api.call_with(endpoint, Method::Post, request, true).await {
            Ok(payload) => payload.decode::<CardRecord>(),
            Err(err) => Err(err),
        };
        match card {
            Ok(card) => {
                info!(card_id = %card.id, "card issued");
                self.ui.notify(Notice::success(success));
                self.reload().await;
                Ok(card)
            }
            Err(err) => {
                self.ui.notify(Notice::error(err.to_string()));
                Err(err)
            }
        }
    }

    pub async fn block(&self, card_id: &str, reason: BlockReason) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::CardAction)?;
        let endpoint = Query::new()
            .push("reason", reason.as_str())
            .to_endpoint(&format!("/v1/cards/{}/block", path_segment(card_id)));
        let (done, failed) = match reason {
            BlockReason::UserDeleted => ("Virtual card deleted.", "Error deleting card."),
            BlockReason::UserRequest => ("Card blocked.", "Error blocking card."),
        };

        match self.api.call(&endpoint, Method::Patch, None, true).await {
            Ok(_) => {
                info!(card_id, reason = reason.as_str(), "card blocked");
                self.ui.notify(Notice::success(done));
                self.reload().await;
                Ok(())
            }
            Err(err) => {
                warn!(card_id, "block failed: {err}");
                self.ui.notify(Notice::error(failed));
                Err(err)
            }
        }
    }

    pub async fn activate(&self, card_id: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::CardAction)?;
        let endpoint = format!("/v1/cards/{}/activate", path_segment(card_id));
        match self.api.call(&endpoint, Method::Patch, None, true).await {
            Ok(_) => {
                self.ui.notify(Notice::success("Card activated."));
                self.reload().await;
                Ok(())
            }
            Err(err) => {
                warn!(card_id, "activate failed: {err}");
                self.ui.notify(Notice::error("Error activating card."));
                Err(err)
            }
        }
    }
}
