//! Field lookups for payloads whose key names vary between backend services.

use serde_json::Value;

use crate::TransactionStatus;

const SESSION_ID_KEYS: &[&str] = &["session-id", "sessionId", "session_id", "session", "sessionid"];
const ACCESS_TOKEN_KEYS: &[&str] = &["access_token", "accessToken", "token", "jwt"];
const REFRESHED_TOKEN_KEYS: &[&str] = &["access_token", "accessToken", "token"];
const TRANSACTION_ID_KEYS: &[&str] = &["id", "transactionId", "transaction_id"];
const TRANSACTION_STATUS_KEYS: &[&str] = &["status", "transactionStatus", "state"];

/// Returns the first key holding a non-empty string (or a number, stringified).
pub fn first_text(payload: &Value, keys: &[&str]) -> Option<String> {
    let object = payload.as_object()?;
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

pub fn extract_session_id(payload: &Value) -> Option<String> {
    first_text(payload, SESSION_ID_KEYS)
}

pub fn extract_access_token(payload: &Value) -> Option<String> {
    first_text(payload, ACCESS_TOKEN_KEYS)
}

pub fn extract_refreshed_token(payload: &Value) -> Option<String> {
    first_text(payload, REFRESHED_TOKEN_KEYS)
}

pub fn extract_transaction_id(payload: &Value) -> Option<String> {
    first_text(payload, TRANSACTION_ID_KEYS)
}

/// Missing or unreadable status is treated as `Pending`.
pub fn extract_transaction_status(payload: &Value) -> TransactionStatus {
    first_text(payload, TRANSACTION_STATUS_KEYS)
        .map(|raw| TransactionStatus::parse(&raw))
        .unwrap_or(TransactionStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_id_prefers_dashed_key() {
        let payload = json!({"sessionId": "b", "session-id": "a"});
        assert_eq!(extract_session_id(&payload).as_deref(), Some("a"));

        let payload = json!({"session": "", "sessionid": "c"});
        assert_eq!(extract_session_id(&payload).as_deref(), Some("c"));
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let payload = json!({"transactionId": 42});
        assert_eq!(extract_transaction_id(&payload).as_deref(), Some("42"));
    }

    #[test]
    fn missing_status_defaults_to_pending() {
        assert_eq!(extract_transaction_status(&json!({})), TransactionStatus::Pending);
        assert_eq!(
            extract_transaction_status(&json!({"state": "completed"})),
            TransactionStatus::Completed
        );
    }

    #[test]
    fn non_object_payloads_yield_nothing() {
        assert_eq!(extract_access_token(&json!("token")), None);
        assert_eq!(extract_access_token(&json!({"jwt": "x.y.z"})).as_deref(), Some("x.y.z"));
        assert_eq!(extract_refreshed_token(&json!({"jwt": "x.y.z"})), None);
    }
}
