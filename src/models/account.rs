use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A user's acceptance of a legal term. Written once at account creation,
/// never updated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum AgreementType {
    #[serde(rename = "Terms of Use")]
    #[sqlx(rename = "Terms of Use")]
    TermsOfUse,
    #[serde(rename = "Privacy Policy")]
    #[sqlx(rename = "Privacy Policy")]
    PrivacyPolicy,
    #[serde(rename = "Open Dataset")]
    #[sqlx(rename = "Open Dataset")]
    OpenDataset,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agreement {
    pub agreement_type: AgreementType,
    pub accept_date: NaiveDate,
}

/// Subscription tier attached to an account. Absence means "free".
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub membership_type: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email_address: Option<String>,
    pub federated_platform: Option<String>,
    pub agreements: Vec<Agreement>,
    pub membership: Option<Membership>,
}

/// Validated account data handed to the repository. Both signup agreements
/// are written alongside the account row, dated `accept_date`.
#[derive(Debug)]
pub struct NewAccount {
    pub email_address: Option<String>,
    pub password_hash: Option<String>,
    pub federated_platform: Option<String>,
    pub accept_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateAccountRequest {
    pub terms_of_use: bool,
    pub privacy_policy: bool,
    pub login: LoginRequest,
}

/// Login section of a signup request. Email and password arrive
/// base64-encoded; federated accounts may omit both.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub federated_platform: Option<String>,
    #[serde(default)]
    pub federated_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginRequest {
    /// Decode the base64 email field. Some clients append a trailing
    /// newline to the encoded value, so trim before decoding.
    pub fn decoded_email(&self) -> Result<Option<String>, String> {
        decode_b64_field(self.email.as_deref(), "email")
    }

    pub fn decoded_password(&self) -> Result<Option<String>, String> {
        decode_b64_field(self.password.as_deref(), "password")
    }
}

fn decode_b64_field(value: Option<&str>, field: &str) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim_end())
                .map_err(|_| format!("{field} is not valid base64"))?;
            let decoded =
                String::from_utf8(bytes).map_err(|_| format!("{field} is not valid UTF-8"))?;
            Ok(Some(decoded))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}
