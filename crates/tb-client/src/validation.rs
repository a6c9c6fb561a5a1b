//! Client-side field checks run before any request is sent.

use thiserror::Error;

use crate::error::ApiError;

pub const IBAN_LENGTH: usize = 26;
pub const RECEIVER_NAME_MIN: usize = 3;
pub const RECEIVER_NAME_MAX: usize = 100;

const TURKISH_LETTERS: &str = "çğıöşüÇĞİÖŞÜ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.message)
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Strips spaces and upper-cases, e.g. `tr33 0006 ...` -> `TR330006...`.
pub fn normalize_iban(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// TR + 24 digits with a valid ISO 7064 MOD 97-10 check.
pub fn validate_iban(raw: &str) -> Result<String, ValidationError> {
    let iban = normalize_iban(raw);
    if iban.is_empty() {
        return Err(ValidationError::new("iban", "IBAN is required."));
    }
    let well_formed = iban.len() == IBAN_LENGTH
        && iban.starts_with("TR")
        && iban[2..].bytes().all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(ValidationError::new(
            "iban",
            "IBAN must be TR followed by 24 digits (26 characters).",
        ));
    }
    if mod97(&iban) != Some(1) {
        return Err(ValidationError::new("iban", "IBAN check digits are invalid."));
    }
    Ok(iban)
}

pub fn is_valid_iban(raw: &str) -> bool {
    validate_iban(raw).is_ok()
}

/// Remainder of the rearranged, letter-expanded IBAN modulo 97.
fn mod97(iban: &str) -> Option<u32> {
    let rearranged = iban.get(4..)?.chars().chain(iban.get(..4)?.chars());
    let mut remainder: u32 = 0;
    for c in rearranged {
        let value = c.to_digit(36)?;
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    Some(remainder)
}

/// Groups of four for confirmation screens.
pub fn format_iban(raw: &str) -> String {
    normalize_iban(raw)
        .chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_receiver_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    let length = name.chars().count();
    if length == 0 {
        return Err(ValidationError::new("receiverName", "Receiver name is required."));
    }
    if length < RECEIVER_NAME_MIN {
        return Err(ValidationError::new(
            "receiverName",
            "Receiver name must be at least 3 characters.",
        ));
    }
    if length > RECEIVER_NAME_MAX {
        return Err(ValidationError::new(
            "receiverName",
            "Receiver name must be at most 100 characters.",
        ));
    }
    let letters_only = name
        .chars()
        .all(|c| c.is_ascii_alphabetic() || c == ' ' || TURKISH_LETTERS.contains(c));
    if !letters_only {
        return Err(ValidationError::new(
            "receiverName",
            "Receiver name may contain letters and spaces only.",
        ));
    }
    Ok(name.to_owned())
}

pub fn validate_person_name(field: &'static str, label: &str, raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::new(field, format!("{label} cannot be empty.")));
    }
    if name.chars().count() < 2 {
        return Err(ValidationError::new(field, format!("{label} must be at least 2 characters.")));
    }
    Ok(name.to_owned())
}

/// Turkish national id: 11 digits once separators are stripped.
pub fn validate_tc(raw: &str) -> Result<String, ValidationError> {
    let tc = digits_only(raw);
    if tc.is_empty() {
        return Err(ValidationError::new("tc", "ID number cannot be empty."));
    }
    if tc.len() != 11 {
        return Err(ValidationError::new("tc", "ID number must be 11 digits."));
    }
    Ok(tc)
}

pub fn validate_password(field: &'static str, raw: &str, min: usize) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::new(field, "Password cannot be empty."));
    }
    if raw.chars().count() < min {
        return Err(ValidationError::new(
            field,
            format!("Password must be at least {min} characters."),
        ));
    }
    Ok(())
}

/// `local@domain.tld` shape, nothing stricter.
pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(ValidationError::new("email", "Email address cannot be empty."));
    }
    let shaped = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && domain
                    .char_indices()
                    .any(|(index, c)| c == '.' && index > 0 && index + 1 < domain.len())
        }
        None => false,
    };
    if !shaped {
        return Err(ValidationError::new("email", "Please enter a valid email address."));
    }
    Ok(email.to_owned())
}

pub fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let phone = digits_only(raw);
    if phone.is_empty() {
        return Err(ValidationError::new("phone", "Phone number cannot be empty."));
    }
    if phone.len() != 10 {
        return Err(ValidationError::new("phone", "Phone number must be 10 digits."));
    }
    Ok(phone)
}

pub fn validate_otp(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.chars().count() != 4 {
        return Err(ValidationError::new("code", "Please enter the 4-digit code."));
    }
    Ok(code.to_owned())
}
