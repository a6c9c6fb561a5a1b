use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub tc: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub tel: String,
    pub tc: String,
}

/// Body shared by the login/register confirm and forgot-password verify endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfirmRequest {
    #[serde(rename = "session-id")]
    pub session_id: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetInitiateRequest {
    pub tc: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    #[serde(rename = "session-id")]
    pub session_id: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeVerifyResponse {
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    pub tc: String,
    pub password: String,
}

/// `/auth/me` payload. Every field is optional because deployments differ.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    #[serde(default, alias = "id", alias = "UUID")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tel: Option<String>,
    #[serde(default)]
    pub tc: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenValidationResponse {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StructuredAddress {
    #[serde(default, alias = "address")]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default, alias = "postal")]
    pub postal_code: Option<String>,
}

/// The client service stores addresses either as `street|city|district|postal` or as an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AddressField {
    Text(String),
    Structured(StructuredAddress),
}

impl AddressField {
    pub fn to_structured(&self) -> StructuredAddress {
        match self {
            AddressField::Structured(address) => address.clone(),
            AddressField::Text(raw) => {
                let mut parts = raw.split('|').map(|part| part.trim().to_owned());
                let mut next = || parts.next().filter(|part| !part.is_empty());
                StructuredAddress {
                    street: next(),
                    city: next(),
                    district: next(),
                    postal_code: next(),
                }
            }
        }
    }

    /// Single-line rendering: `street, city, district postal`.
    pub fn display(&self) -> String {
        let address = self.to_structured();
        let mut line = address.street.unwrap_or_default();
        if let Some(city) = address.city {
            line.push_str(", ");
            line.push_str(&city);
        }
        if let Some(district) = address.district {
            line.push_str(", ");
            line.push_str(&district);
        }
        if let Some(postal) = address.postal_code {
            line.push(' ');
            line.push_str(&postal);
        }
        line.trim().to_owned()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    #[serde(default, alias = "ID")]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName", alias = "surname")]
    pub last_name: Option<String>,
    #[serde(default, alias = "email_address", alias = "mail")]
    pub email: Option<String>,
    #[serde(default, alias = "phone", alias = "tel")]
    pub gsm: Option<String>,
    #[serde(default, alias = "tc", alias = "tcNo")]
    pub tc_no: Option<String>,
    #[serde(default, alias = "adress")]
    pub address: Option<AddressField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressPayload {
    pub street: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClientRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub tc_no: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub gsm: String,
    pub address: AddressPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateClientRequest {
    pub gsm: String,
    pub address: AddressPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_record_tolerates_field_variants() {
        let record: ClientRecord = serde_json::from_str(
            r#"{"ID":"c-1","firstName":"Ada","surname":"Yilmaz","mail":"ada@example.com","tel":"5551112233","tcNo":"12345678901","address":"Main St|Ankara|Cankaya|06000"}"#,
        )
        .unwrap();

        assert_eq!(record.id.as_deref(), Some("c-1"));
        assert_eq!(record.last_name.as_deref(), Some("Yilmaz"));
        assert_eq!(record.gsm.as_deref(), Some("5551112233"));
        let address = record.address.unwrap();
        assert_eq!(address.display(), "Main St, Ankara, Cankaya 06000");
    }

    #[test]
    fn structured_address_renders_partial_fields() {
        let address: AddressField =
            serde_json::from_str(r#"{"street":"Kizilay Cd.","city":"Ankara"}"#).unwrap();
        assert_eq!(address.display(), "Kizilay Cd., Ankara");
    }

    #[test]
    fn otp_request_uses_dashed_session_key() {
        let body = serde_json::to_value(OtpConfirmRequest {
            session_id: "s-1".to_owned(),
            code: "1234".to_owned(),
        })
        .unwrap();
        assert_eq!(body["session-id"], "s-1");
    }
}
