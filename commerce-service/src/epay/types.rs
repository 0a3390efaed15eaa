//! Wire types for the epay OAuth and invoice endpoints.

use secrecy::Secret;
use serde::{de, Deserialize, Deserializer, Serialize};

/// OAuth access token as issued by the gateway.
///
/// Secrets are wrapped so the token never shows up in `Debug` output.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub scope: String,
    /// Lifetime in seconds. The gateway sends it as a string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_in: String,
    #[serde(default)]
    pub token_type: String,
    pub access_token: Secret<String>,
    #[serde(default = "empty_secret")]
    pub refresh_token: Secret<String>,
}

impl Token {
    /// Lifetime in whole seconds; anything unparsable counts as already expired.
    pub fn expires_in_secs(&self) -> u64 {
        self.expires_in.trim().parse().unwrap_or(0)
    }
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number for expires_in, got {}",
            other
        ))),
    }
}

/// Charge a token is scoped to when requested for a specific payment.
#[derive(Debug, Clone)]
pub struct InvoiceContext {
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub invoice_id: String,
}

/// Card payload encrypted into the invoice `cryptogram` field. Never persisted.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cryptogram<'a> {
    pub hpan: &'a str,
    pub exp_date: &'a str,
    pub cvc: &'a str,
    pub terminal_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    /// Amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub cryptogram: String,
    pub invoice_id: String,
    pub description: String,
    pub email: String,
    pub card_save: bool,
    pub post_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
