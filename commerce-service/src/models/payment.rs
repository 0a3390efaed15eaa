use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Successful,
    Unsuccessful,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Unsuccessful => "unsuccessful",
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "successful" => Ok(Self::Successful),
            "unsuccessful" => Ok(Self::Unsuccessful),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment attempt. Starts `unsuccessful` and flips only once the gateway accepts the invoice.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub invoice_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Invoice identifier sent to the gateway, derived from the payment id.
    pub fn invoice_id_for(payment_id: i64) -> String {
        format!("{:012}", payment_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub status: PaymentStatus,
}
