//! Explicit wiring of every client component.
//!
//! One [`AppContext`] per signed-in browser tab or console process. Components
//! share state only through the `Arc`s handed out here.

use std::sync::Arc;
use tb_storage::LocalStore;

use crate::account_ops::AccountService;
use crate::accounts::AccountsCache;
use crate::api::ApiClient;
use crate::cards::CardService;
use crate::config::ClientConfig;
use crate::forms::FormGuards;
use crate::profile::ProfileService;
use crate::session::SessionStore;
use crate::theme::ThemePreference;
use crate::token::TokenManager;
use crate::transfer::TransferOrchestrator;
use crate::transport::Transport;
use crate::ui::UiSink;
use crate::verification::VerificationFlow;

pub struct AppContext {
    pub config: Arc<ClientConfig>,
    pub tokens: Arc<TokenManager>,
    pub session: Arc<SessionStore>,
    pub api: Arc<ApiClient>,
    pub forms: Arc<FormGuards>,
    pub profile: Arc<ProfileService>,
    pub accounts: Arc<AccountsCache>,
    pub verification: Arc<VerificationFlow>,
    pub transfers: Arc<TransferOrchestrator>,
    pub cards: Arc<CardService>,
    pub account_ops: Arc<AccountService>,
    pub theme: Arc<ThemePreference>,
}

impl AppContext {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
        ui: Arc<dyn UiSink>,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenManager::new(store.clone(), transport.clone(), config.clone()));
        let session = Arc::new(SessionStore::new());
        let api = Arc::new(ApiClient::new(
            config.clone(),
            transport,
            tokens.clone(),
            session.clone(),
            ui.clone(),
        ));
        let forms = Arc::new(FormGuards::new(ui.clone()));
        let profile = Arc::new(ProfileService::new(
            api.clone(),
            tokens.clone(),
            session.clone(),
            forms.clone(),
            ui.clone(),
            config.clone(),
        ));
        let accounts = Arc::new(AccountsCache::new(api.clone(), session.clone(), profile.clone()));
        let verification = Arc::new(VerificationFlow::new(
            api.clone(),
            tokens.clone(),
            session.clone(),
            profile.clone(),
            forms.clone(),
            ui.clone(),
            config.clone(),
        ));
        let transfers = Arc::new(TransferOrchestrator::new(
            api.clone(),
            accounts.clone(),
            forms.clone(),
            ui.clone(),
            config.clone(),
        ));
        let cards = Arc::new(CardService::new(api.clone(), forms.clone(), ui.clone()));
        let account_ops = Arc::new(AccountService::new(
            api.clone(),
            accounts.clone(),
            session.clone(),
            forms.clone(),
            ui,
        ));
        let theme = Arc::new(ThemePreference::new(store));

        Self {
            config,
            tokens,
            session,
            api,
            forms,
            profile,
            accounts,
            verification,
            transfers,
            cards,
            account_ops,
            theme,
        }
    }
}
