//! Identity and customer-record operations: silent session restore, client
//! record lookup, profile edits, password change, account deletion, logout.

use std::sync::Arc;
use tb_api_types::{
    AddressPayload, ClientRecord, CreateClientRequest, DeleteAccountRequest, PasswordChangeRequest,
    ProfileUpdateRequest, TokenValidationResponse, UpdateClientRequest, UserRecord,
};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, path_segment};
use crate::config::ClientConfig;
use crate::error::{ApiError, Payload};
use crate::forms::FormGuards;
use crate::session::{CustomerProfile, SessionStore, UserIdentity};
use crate::token::TokenManager;
use crate::transport::Method;
use crate::ui::{Form, Notice, Page, UiSink};
use crate::validation::{digits_only, validate_email, validate_phone, validate_tc};

const WRONG_OLD_PASSWORD_HINTS: &[&str] = &[
    "old password",
    "mevcut şifre",
    "incorrect password",
    "yanlış şifre",
    "invalid password",
    "wrong password",
    "password mismatch",
];

/// Input for `POST /clients`.
#[derive(Debug, Clone, Default)]
pub struct ClientForm {
    pub full_name: String,
    pub email: String,
    pub tc: String,
    pub phone: String,
    pub street: String,
}

/// Input for `DELETE /auth/delete-account`.
#[derive(Debug, Clone, Default)]
pub struct DeleteAccountForm {
    pub tc: String,
    pub password: String,
    /// Typed confirmation (`SIL` or `DELETE`), required when the identity has no TC loaded.
    pub confirmation: String,
}

pub struct ProfileService {
    api: Arc<ApiClient>,
    tokens: Arc<TokenManager>,
    session: Arc<SessionStore>,
    forms: Arc<FormGuards>,
    ui: Arc<dyn UiSink>,
    config: Arc<ClientConfig>,
}

impl ProfileService {
    pub fn new(
        api: Arc<ApiClient>,
        tokens: Arc<TokenManager>,
        session: Arc<SessionStore>,
        forms: Arc<FormGuards>,
        ui: Arc<dyn UiSink>,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            api,
            tokens,
            session,
            forms,
            ui,
            config,
        }
    }

    /// Startup session check. Never notifies; any failure means "signed out".
    pub async fn restore_session(&self) -> bool {
        let token = match self.tokens.token() {
            Some(token) => token,
            None => {
                if !self.tokens.refresh().await {
                    return false;
                }
                match self.tokens.token() {
                    Some(token) => token,
                    None => return false,
                }
            }
        };

        if self.tokens.is_valid(&token) {
            let subject = crate::token::decode_claims(&token)
                .and_then(|claims| claims.user_id().map(ToOwned::to_owned));
            if let Some(user_id) = subject {
                debug!(%user_id, "session restored from local token");
                self.session.set_user(UserIdentity::with_id(user_id));
                return true;
            }
        }

        match self.identify(&token).await {
            Some(identity) => {
                self.session.set_user(identity);
                true
            }
            None => false,
        }
    }

    async fn identify(&self, token: &str) -> Option<UserIdentity> {
        if let Ok((status, payload)) = self.api.silent_call("/auth/me", Method::Get, token).await {
            if (200..300).contains(&status) {
                if let Some(identity) = identity_from_me(payload) {
                    return Some(identity);
                }
            }
        }

        let status = match self.api.silent_call("/auth/validation", Method::Post, token).await {
            Ok((status, payload)) if (200..300).contains(&status) => return identity_from_validation(payload),
            Ok((status, _)) => Some(status),
            Err(err) => {
                debug!("session validation check failed: {err}");
                None
            }
        };

        // 401 or an unreachable validator: spend the refresh cookie once.
        if !matches!(status, Some(401) | None) || !self.tokens.refresh().await {
            return None;
        }
        let token = self.tokens.token()?;
        match self.api.silent_call("/auth/validation", Method::Post, &token).await {
            Ok((status, payload)) if (200..300).contains(&status) => identity_from_validation(payload),
            _ => None,
        }
    }

    /// `GET /auth/me` after a successful sign-in. Falls back to the token subject.
    pub async fn load_user_profile(&self) -> Result<UserIdentity, ApiError> {
        match self.api.get::<UserRecord>("/auth/me").await {
            Ok(record) => {
                let identity = UserIdentity::from(record);
                self.session.set_user(identity.clone());
                Ok(identity)
            }
            Err(err) => {
                let fallback = self
                    .tokens
                    .claims()
                    .and_then(|claims| claims.user_id().map(UserIdentity::with_id));
                match fallback {
                    Some(identity) => {
                        warn!("profile fetch failed, using token subject: {err}");
                        self.session.set_user(identity.clone());
                        Ok(identity)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Looks up the client record, retrying on 404 because it is created
    /// asynchronously after registration. `Ok(None)` once the retries run out.
    pub async fn fetch_client(&self) -> Result<Option<CustomerProfile>, ApiError> {
        let user_id = self
            .session
            .user_id()
            .ok_or_else(|| ApiError::Validation("No active session. Please sign in.".to_owned()))?;
        let endpoint = format!("/clients/user/{}", path_segment(&user_id));
        let attempts = self.config.client_lookup_attempts.max(1);
        let mut delay = self.config.client_lookup_backoff;

        for attempt in 1..=attempts {
            match self.api.get::<ClientRecord>(&endpoint).await {
                Ok(record) => {
                    let profile = CustomerProfile::from(record);
                    self.session.set_profile(profile.clone());
                    return Ok(Some(profile));
                }
                Err(err) if err.status() == Some(404) || matches!(err, ApiError::Network(_)) => {
                    debug!(attempt, "client record not available yet: {err}");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Profile view entry point around [`fetch_client`](Self::fetch_client).
    pub async fn load_client(&self) -> Option<CustomerProfile> {
        match self.fetch_client().await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                self.ui.notify(Notice::info("Client record not found."));
                None
            }
            Err(ApiError::AuthExpired) => {
                self.ui.notify(Notice::error(ApiError::AuthExpired.to_string()));
                None
            }
            Err(err) => {
                let message = match err.status() {
                    Some(status) => format!("Client load failed (status: {status})."),
                    None => err.to_string(),
                };
                self.ui.notify(Notice::error(message));
                None
            }
        }
    }

    pub async fn create_client(&self, form: &ClientForm) -> Result<CustomerProfile, ApiError> {
        let _guard = self.forms.begin(Form::ClientRecord)?;
        let tc = match validate_tc(&form.tc) {
            Ok(tc) => tc,
            Err(_) => {
                return Err(self.reject("Please enter a valid 11-digit ID number."));
            }
        };

        let gsm = match validate_phone(&form.phone) {
            Ok(phone) => phone,
            Err(err) => return Err(self.reject(err.message)),
        };

        let full_name = form.full_name.trim();
        let (first_name, last_name) = match full_name.split_once(' ') {
            Some((first, rest)) => (first.to_owned(), rest.trim().to_owned()),
            None => (full_name.to_owned(), String::new()),
        };
        let request = CreateClientRequest {
            user_id: self.session.user_id(),
            tc_no: tc,
            first_name,
            last_name,
            email: form.email.trim().to_owned(),
            gsm,
            address: AddressPayload {
                street: form.street.trim().to_owned(),
            },
        };

        match self.api.call_with("/clients", Method::Post, &request, true).await {
            Ok(payload) => {
                let record = payload.decode::<ClientRecord>().map_err(|err| self.fail(err))?;
                let profile = CustomerProfile::from(record);
                self.session.set_profile(profile.clone());
                self.ui.notify(Notice::success("Client record created."));
                Ok(profile)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Updates the auth contact phone first, then the client record.
    pub async fn update_client(&self, phone: &str, street: &str) -> Result<CustomerProfile, ApiError> {
        let _guard = self.forms.begin(Form::ClientRecord)?;
        let Some(current) = self.session.profile() else {
            return Err(self.reject("Client info not loaded."));
        };
        let Some(client_id) = current.client_id.clone() else {
            return Err(self.reject("Client info not loaded."));
        };
        let phone = digits_only(phone);
        if phone.is_empty() {
            return Err(self.reject("Phone cannot be empty."));
        }

        let contact = ProfileUpdateRequest {
            email: None,
            phone: Some(phone.clone()),
        };
        if let Err(err) = self.api.call_with("/auth/user/update", Method::Post, &contact, true).await {
            warn!("auth contact update failed: {err}");
            let message = match err {
                ApiError::AuthExpired => err.to_string(),
                _ => "Auth phone update failed.".to_owned(),
            };
            self.ui.notify(Notice::error(message));
            return Err(err);
        }

        let request = UpdateClientRequest {
            gsm: phone,
            address: AddressPayload {
                street: street.trim().to_owned(),
            },
        };
        let endpoint = format!("/clients/{}", path_segment(&client_id));
        let record = match self.api.call_with(&endpoint, Method::Put, &request, true).await {
            Ok(payload) => payload.decode::<ClientRecord>().map_err(|err| self.fail(err))?,
            Err(err) => return Err(self.fail(err)),
        };

        let mut updated = CustomerProfile::from(record);
        if updated.client_id.is_none() {
            updated.client_id = Some(client_id);
        }
        let truncated = updated.email.as_deref().is_some_and(|email| email.chars().count() <= 1);
        let previous_ok = current.email.as_deref().is_some_and(|email| email.chars().count() > 1);
        if truncated && previous_ok {
            warn!("client update returned a truncated email, keeping the previous one");
            updated.email = current.email.clone();
            self.session.set_profile(updated.clone());
            self.ui.notify(Notice::error(
                "Unexpected email received from server. Keeping previous email.",
            ));
            return Ok(updated);
        }

        self.session.set_profile(updated.clone());
        self.ui.notify(Notice::success("Client info updated."));
        Ok(updated)
    }

    pub async fn update_profile(&self, email: &str, phone: &str) -> Result<UserIdentity, ApiError> {
        let _guard = self.forms.begin(Form::ProfileUpdate)?;
        let email = match validate_email(email) {
            Ok(email) => email,
            Err(err) => return Err(self.reject(err.message)),
        };
        let phone = digits_only(phone);
        let request = ProfileUpdateRequest {
            email: Some(email),
            phone: (!phone.is_empty()).then_some(phone),
        };

        if let Err(err) = self.api.call_with("/auth/user/update", Method::Post, &request, true).await {
            return Err(self.fail(err));
        }
        self.ui.notify(Notice::success("Profile updated."));
        let identity = match self.load_user_profile().await {
            Ok(identity) => identity,
            Err(err) => {
                warn!("profile reload after update failed: {err}");
                self.session.user().unwrap_or_default()
            }
        };
        self.ui.navigate(Page::Profile);
        Ok(identity)
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::PasswordChange)?;
        if old_password.is_empty() || new_password.is_empty() {
            return Err(self.reject("Old and new password required."));
        }
        if new_password.chars().count() < 6 {
            return Err(self.reject("New password must be at least 6 characters."));
        }

        let request = PasswordChangeRequest {
            old_password: old_password.to_owned(),
            new_password: new_password.to_owned(),
        };
        match self.api.call_with("/auth/password-change", Method::Post, &request, true).await {
            Ok(_) => {
                self.ui.notify(Notice::success("Password changed successfully."));
                self.ui.navigate(Page::Dashboard);
                Ok(())
            }
            Err(err) => {
                let text = err.server_text();
                if WRONG_OLD_PASSWORD_HINTS.iter().any(|hint| text.contains(hint)) {
                    self.ui.notify(Notice::error(
                        "Current password is incorrect. Please try again.",
                    ));
                    return Err(err);
                }
                Err(self.fail(err))
            }
        }
    }

    pub async fn delete_account(&self, form: &DeleteAccountForm) -> Result<(), ApiError> {
        let _guard = self.forms.begin(Form::DeleteAccount)?;
        let tc = match validate_tc(&form.tc) {
            Ok(tc) => tc,
            Err(_) => return Err(self.reject("Please enter an 11-digit ID.")),
        };
        if form.password.is_empty() {
            return Err(self.reject("Please enter your password."));
        }

        let known_tc = self.session.user().and_then(|user| user.tc).filter(|tc| !tc.is_empty());
        match known_tc {
            Some(known) if known != tc => {
                return Err(self.reject("Entered ID does not match your account."));
            }
            Some(_) => {}
            None => {
                let confirmation = form.confirmation.trim().to_uppercase();
                if confirmation != "SIL" && confirmation != "DELETE" {
                    return Err(self.reject("Please type \"DELETE\" to confirm."));
                }
            }
        }

        if !self.tokens.refresh().await {
            return Err(self.reject("No active session found. Please sign in again."));
        }

        let request = DeleteAccountRequest {
            tc,
            password: form.password.clone(),
        };
        match self.api.call_with("/auth/delete-account", Method::Delete, &request, true).await {
            Ok(_) => {
                info!("account deleted");
                self.tokens.clear();
                self.session.clear();
                self.ui.notify(Notice::success("Account deleted."));
                self.ui.navigate(Page::Home);
                Ok(())
            }
            Err(err) => {
                if err.server_text().contains("refresh token") {
                    self.ui.notify(Notice::error(
                        "Refresh token not present on server. Please sign in again.",
                    ));
                    return Err(err);
                }
                Err(self.fail(err))
            }
        }
    }

    /// Best-effort server logout; local state is always cleared.
    pub async fn logout(&self) {
        if let Err(err) = self.api.call("/auth/logout", Method::Post, None, false).await {
            debug!("logout call failed: {err}");
        }
        self.tokens.clear();
        self.session.clear();
        self.ui.notify(Notice::success("Logged out."));
        self.ui.navigate(Page::Home);
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
}

fn identity_from_me(payload: Payload) -> Option<UserIdentity> {
    let record: UserRecord = payload.decode().ok()?;
    record.user_id.is_some().then(|| UserIdentity::from(record))
}

fn identity_from_validation(payload: Payload) -> Option<UserIdentity> {
    let response: TokenValidationResponse = payload.decode().ok()?;
    response.user_id.map(UserIdentity::with_id)
}
