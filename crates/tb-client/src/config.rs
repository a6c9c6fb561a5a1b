use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Tunables for the client core. Defaults match the web client's constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_base: String,
    pub verification_window: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    pub client_lookup_attempts: u32,
    pub client_lookup_backoff: Duration,
    /// Tokens expiring within this many seconds are treated as already expired.
    pub token_grace_secs: u64,
    /// Used when a 429 response carries no readable `Retry-After`.
    pub default_retry_after_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_URL.to_owned(),
            verification_window: Duration::from_secs(180),
            poll_interval: Duration::from_millis(1500),
            poll_attempts: 10,
            client_lookup_attempts: 5,
            client_lookup_backoff: Duration::from_millis(500),
            token_grace_secs: 2,
            default_retry_after_secs: 60,
        }
    }
}

impl ClientConfig {
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            ..Self::default()
        }
    }

    /// Reads `TRIOBANK_API_URL`, `TRIOBANK_POLL_INTERVAL_MS`, `TRIOBANK_POLL_ATTEMPTS`
    /// and `TRIOBANK_VERIFICATION_SECS`; anything missing or unparsable keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("TRIOBANK_API_URL").filter(|value| !value.trim().is_empty()) {
            config.api_base = url.trim().trim_end_matches('/').to_owned();
        }
        if let Some(ms) = parse_number(&lookup, "TRIOBANK_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_number(&lookup, "TRIOBANK_POLL_ATTEMPTS") {
            config.poll_attempts = u32::try_from(attempts).unwrap_or(u32::MAX).max(1);
        }
        if let Some(secs) = parse_number(&lookup, "TRIOBANK_VERIFICATION_SECS") {
            config.verification_window = Duration::from_secs(secs);
        }

        config
    }

    pub fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_owned();
        }
        format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'))
    }
}

fn parse_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring non-numeric configuration value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TRIOBANK_API_URL", "https://bank.example/api/"),
            ("TRIOBANK_POLL_INTERVAL_MS", "250"),
            ("TRIOBANK_POLL_ATTEMPTS", "many"),
        ]);
        let config = ClientConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));

        assert_eq!(config.api_base, "https://bank.example/api");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_attempts, 10);
        assert_eq!(config.verification_window, Duration::from_secs(180));
    }

    #[test]
    fn url_joins_endpoint_under_base() {
        let config = ClientConfig::with_api_base("http://bank.test/api/");
        assert_eq!(config.url("/auth/login"), "http://bank.test/api/auth/login");
        assert_eq!(config.url("v1/cards"), "http://bank.test/api/v1/cards");
    }
}
