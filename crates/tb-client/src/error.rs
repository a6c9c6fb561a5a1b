use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::transport::TransportError;

/// A response body, decoded as JSON when possible and kept as text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Empty bodies (204, bare 200) become an empty JSON object.
    pub fn parse(body: &str) -> Self {
        if body.trim().is_empty() {
            return Payload::Json(Value::Object(Map::new()));
        }
        match serde_json::from_str(body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(body.to_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
        }
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.into_json()).map_err(|err| ApiError::Decode(err.to_string()))
    }

    /// Server-provided explanation: `message`, then `error`, then the raw text body.
    pub fn message(&self) -> Option<String> {
        match self {
            Payload::Json(value) => ["message", "error"].iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(ToOwned::to_owned)
            }),
            Payload::Text(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_owned())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthExpired,
    RateLimited,
    ValidationFailed,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    ServerError,
    NetworkFailure,
    BusinessRule,
    Busy,
    Decode,
    Other,
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),
    #[error("session expired, please sign in again")]
    AuthExpired,
    #[error("too many requests, retry in {retry_after_secs} seconds")]
    RateLimited {
        retry_after_secs: u64,
        payload: Payload,
    },
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        payload: Payload,
    },
    #[error("network error: {0}")]
    Network(#[from] TransportError),
    #[error("{0}")]
    BusinessRule(String),
    /// The same form already has a submission in flight.
    #[error("request already in progress")]
    Busy,
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthExpired => Some(401),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation(_) => ErrorKind::ValidationFailed,
            ApiError::AuthExpired => ErrorKind::AuthExpired,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Network(_) => ErrorKind::NetworkFailure,
            ApiError::BusinessRule(_) => ErrorKind::BusinessRule,
            ApiError::Busy => ErrorKind::Busy,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::Http { status, .. } => match status {
                400 | 422 => ErrorKind::ValidationFailed,
                401 => ErrorKind::Unauthorized,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                500..=599 => ErrorKind::ServerError,
                _ => ErrorKind::Other,
            },
        }
    }

    /// Everything except an expired session can be retried by the user.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ApiError::AuthExpired)
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            ApiError::RateLimited { payload, .. } | ApiError::Http { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Lower-cased server message, for keyword matching on loosely specified errors.
    pub(crate) fn server_text(&self) -> String {
        match self {
            ApiError::Http { message, .. } => message.to_lowercase(),
            ApiError::BusinessRule(message) | ApiError::Validation(message) => message.to_lowercase(),
            other => other
                .payload()
                .and_then(Payload::message)
                .unwrap_or_default()
                .to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_falls_back_to_text() {
        assert_eq!(Payload::parse("  "), Payload::Json(Value::Object(Map::new())));
        assert_eq!(Payload::parse("gateway down"), Payload::Text("gateway down".to_owned()));
        assert_eq!(
            Payload::parse(r#"{"error":"Bad Request"}"#).message().as_deref(),
            Some("Bad Request")
        );
    }

    #[test]
    fn kind_follows_status() {
        let conflict = ApiError::Http {
            status: 409,
            message: "duplicate".to_owned(),
            payload: Payload::Text("duplicate".to_owned()),
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.is_recoverable());

        let gateway = ApiError::Http {
            status: 502,
            message: "Request failed".to_owned(),
            payload: Payload::parse(""),
        };
        assert_eq!(gateway.kind(), ErrorKind::ServerError);

        assert!(!ApiError::AuthExpired.is_recoverable());
        assert_eq!(ApiError::AuthExpired.status(), Some(401));
    }
}
