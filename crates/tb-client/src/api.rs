//! HTTP client core.
//!
//! Every gateway call goes through [`ApiClient::call`]: JSON in, [`Payload`] out,
//! bearer attached when the call is authenticated, one refresh-and-retry on 401,
//! and the global loader driven by the [`RequestGate`].
//! This layer never notifies the user; entry points do that exactly once.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, Payload};
use crate::gate::RequestGate;
use crate::session::SessionStore;
use crate::token::TokenManager;
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::ui::{Page, UiSink};

const GENERIC_FAILURE: &str = "Request failed";

pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
    session: Arc<SessionStore>,
    ui: Arc<dyn UiSink>,
    gate: RequestGate,
}

impl ApiClient {
    pub fn new(
        config: Arc<ClientConfig>,
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenManager>,
        session: Arc<SessionStore>,
        ui: Arc<dyn UiSink>,
    ) -> Self {
        Self {
            gate: RequestGate::new(ui.clone()),
            config,
            transport,
            tokens,
            session,
            ui,
        }
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
        requires_auth: bool,
    ) -> Result<Payload, ApiError> {
        let _in_flight = self.gate.enter();
        let body = match body {
            Some(value) => Some(serde_json::to_string(&value).map_err(|err| ApiError::Decode(err.to_string()))?),
            None => None,
        };

        let token = if requires_auth { self.tokens.token() } else { None };
        let response = self.send(endpoint, method, body.clone(), token.as_deref()).await?;

        if response.status != 401 || !requires_auth {
            return self.finish(response);
        }

        debug!(endpoint, "authenticated call rejected, refreshing token");
        if !self.tokens.refresh_after(token.as_deref()).await {
            self.expire_session().await;
            return Err(ApiError::AuthExpired);
        }

        let retry_token = self.tokens.token();
        let retried = self.send(endpoint, method, body, retry_token.as_deref()).await?;
        if retried.status == 401 {
            warn!(endpoint, "still unauthorized after refresh");
            self.expire_session().await;
            return Err(ApiError::AuthExpired);
        }
        self.finish(retried)
    }

    pub async fn call_with<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        method: Method,
        body: &B,
        requires_auth: bool,
    ) -> Result<Payload, ApiError> {
        let value = serde_json::to_value(body).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.call(endpoint, method, Some(value), requires_auth).await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.call(endpoint, Method::Get, None, true).await?.decode()
    }

    /// Bypasses the loader, the refresh-retry and forced logout. Used only by
    /// silent session restore, which must fail closed without side effects.
    pub(crate) async fn silent_call(
        &self,
        endpoint: &str,
        method: Method,
        token: &str,
    ) -> Result<(u16, Payload), ApiError> {
        let response = self.send(endpoint, method, None, Some(token)).await?;
        Ok((response.status, Payload::parse(&response.body)))
    }

    async fn send(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<String>,
        token: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = vec![
            ("Content-Type".to_owned(), "application/json".to_owned()),
            ("Accept".to_owned(), "application/json".to_owned()),
        ];
        if let Some(token) = token {
            headers.push(("Authorization".to_owned(), format!("Bearer {token}")));
        }

        let request = HttpRequest {
            method,
            url: self.config.url(endpoint),
            headers,
            body,
        };
        Ok(self.transport.send(request).await?)
    }

    fn finish(&self, response: HttpResponse) -> Result<Payload, ApiError> {
        let payload = Payload::parse(&response.body);
        if response.is_success() {
            return Ok(payload);
        }

        if response.status == 429 {
            let retry_after_secs = response
                .header("Retry-After")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(self.config.default_retry_after_secs);
            return Err(ApiError::RateLimited {
                retry_after_secs,
                payload,
            });
        }

        let message = payload.message().unwrap_or_else(|| GENERIC_FAILURE.to_owned());
        Err(ApiError::Http {
            status: response.status,
            message,
            payload,
        })
    }

    /// Forced logout after an unrecoverable 401.
    async fn expire_session(&self) {
        info!("session expired, signing out");
        let logout = self.send("/auth/logout", Method::Post, None, None).await;
        if let Err(err) = logout {
            debug!("best-effort logout failed: {err}");
        }
        self.tokens.clear();
        self.session.clear();
        self.ui.navigate(Page::Home);
    }
}

/// `encodeURIComponent`: everything but alphanumerics and `-_.!~*'()` is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Builds `path?key=value&...` with keys and values percent-encoded.
#[derive(Debug, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn push_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    pub fn to_endpoint(&self, path: &str) -> String {
        if self.pairs.is_empty() {
            return path.to_owned();
        }
        let query = self
            .pairs
            .iter()
            .map(|(key, value)| format!("{}={}", path_segment(key), path_segment(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{path}?{query}")
    }
}

/// One escaped path segment or query component.
pub fn path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}
