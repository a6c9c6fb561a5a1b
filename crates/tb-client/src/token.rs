//! Access-token persistence, local expiry checks and refresh-cookie exchange.
//!
//! The payload decode here is unverified and exists only to skip pointless
//! round trips. Authorization is decided by the backend's own 401s.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tb_api_types::extract_refreshed_token;
use tb_storage::LocalStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::Payload;
use crate::transport::{HttpRequest, Method, Transport};

pub const TOKEN_KEY: &str = "triobank_token";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub exp: Option<f64>,
}

impl TokenClaims {
    pub fn user_id(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .or(self.subject.as_deref())
            .filter(|id| !id.trim().is_empty())
    }
}

pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// A token without `exp` is accepted; a malformed one is not.
pub fn is_token_valid_at(token: &str, now_secs: u64, grace_secs: u64) -> bool {
    match decode_claims(token) {
        None => false,
        Some(claims) => match claims.exp {
            None => true,
            Some(exp) => exp > (now_secs + grace_secs) as f64,
        },
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct TokenManager {
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    refresh_flight: Mutex<()>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn LocalStore>, transport: Arc<dyn Transport>, config: Arc<ClientConfig>) -> Self {
        Self {
            store,
            transport,
            config,
            refresh_flight: Mutex::new(()),
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|value| !value.trim().is_empty()),
            Err(err) => {
                warn!("failed to read stored token: {err:#}");
                None
            }
        }
    }

    pub fn set_token(&self, token: &str) {
        if let Err(err) = self.store.set(TOKEN_KEY, token) {
            warn!("failed to persist token: {err:#}");
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.store.remove(TOKEN_KEY) {
            warn!("failed to clear stored token: {err:#}");
        }
    }

    pub fn is_valid(&self, token: &str) -> bool {
        is_token_valid_at(token, now_secs(), self.config.token_grace_secs)
    }

    pub fn claims(&self) -> Option<TokenClaims> {
        self.token().as_deref().and_then(decode_claims)
    }

    /// Exchanges the refresh cookie for a new access token. Fails closed.
    pub async fn refresh(&self) -> bool {
        let request = HttpRequest {
            method: Method::Post,
            url: self.config.url("/auth/refresh"),
            headers: vec![
                ("Content-Type".to_owned(), "application/json".to_owned()),
                ("Accept".to_owned(), "application/json".to_owned()),
            ],
            body: None,
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("token refresh transport failure: {err}");
                self.clear();
                return false;
            }
        };

        if response.status == 401 {
            info!("refresh cookie rejected, clearing access token");
            self.clear();
            return false;
        }
        if !response.is_success() {
            warn!(status = response.status, "token refresh failed");
            return false;
        }

        match Payload::parse(&response.body).as_json().and_then(extract_refreshed_token) {
            Some(token) => {
                self.set_token(&token);
                debug!("access token refreshed");
                true
            }
            None => {
                warn!("refresh response carried no access token");
                false
            }
        }
    }

    /// Single-flight refresh for callers that just saw `stale` rejected.
    ///
    /// If another caller rotated the token while this one waited, the rotated
    /// token is reused instead of spending the refresh cookie again.
    pub async fn refresh_after(&self, stale: Option<&str>) -> bool {
        let _flight = self.refresh_flight.lock().await;
        if let Some(current) = self.token() {
            if Some(current.as_str()) != stale {
                debug!("token already rotated by a concurrent refresh");
                return true;
            }
        }
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockTransport, jwt, test_config};
    use serde_json::json;
    use tb_storage::MemoryStore;

    fn manager(transport: Arc<MockTransport>) -> (TokenManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenManager::new(store.clone(), transport, Arc::new(test_config()));
        (tokens, store)
    }

    #[test]
    fn expiry_inside_grace_window_is_invalid() {
        let now = 1_800_000_000;
        let soon = jwt(json!({"sub": "u-1", "exp": now + 1}));
        let later = jwt(json!({"sub": "u-1", "exp": now + 10}));

        assert!(!is_token_valid_at(&soon, now, 2));
        assert!(is_token_valid_at(&later, now, 2));
    }

    #[test]
    fn malformed_tokens_are_invalid_and_missing_exp_is_valid() {
        assert!(!is_token_valid_at("not-a-token", 0, 2));
        assert!(!is_token_valid_at("a.%%%.c", 0, 2));
        assert!(is_token_valid_at(&jwt(json!({"sub": "u-1"})), 0, 2));
    }

    #[test]
    fn claims_expose_subject() {
        let claims = decode_claims(&jwt(json!({"subject": "u-9"}))).unwrap();
        assert_eq!(claims.user_id(), Some("u-9"));
    }

    #[tokio::test]
    async fn refresh_persists_token_from_any_tolerated_field() -> anyhow::Result<()> {
        let transport = MockTransport::new();
        transport.on(Method::Post, "/auth/refresh", 200, json!({"accessToken": "fresh"}));
        let (tokens, store) = manager(transport.clone());

        assert!(tokens.refresh().await);
        assert_eq!(store.get(TOKEN_KEY)?.as_deref(), Some("fresh"));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejection_clears_token() -> anyhow::Result<()> {
        let transport = MockTransport::new();
        transport.on(Method::Post, "/auth/refresh", 401, json!({"message": "no refresh token"}));
        let (tokens, store) = manager(transport);
        tokens.set_token("old");

        assert!(!tokens.refresh().await);
        assert_eq!(store.get(TOKEN_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_network_failure_fails_closed() -> anyhow::Result<()> {
        let transport = MockTransport::new();
        transport.fail(Method::Post, "/auth/refresh");
        let (tokens, store) = manager(transport);
        tokens.set_token("old");

        assert!(!tokens.refresh().await);
        assert_eq!(store.get(TOKEN_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_after_reuses_rotated_token() -> anyhow::Result<()> {
        let transport = MockTransport::new();
        let (tokens, _store) = manager(transport.clone());
        tokens.set_token("rotated");

        assert!(tokens.refresh_after(Some("stale")).await);
        assert_eq!(transport.count(Method::Post, "/auth/refresh"), 0);
        Ok(())
    }
}
