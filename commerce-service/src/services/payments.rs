//! Payment orchestration: persist the attempt, charge the card through the
//! gateway, then record the outcome.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::epay::{
    CardDataEncryptor, CreateInvoiceRequest, Cryptogram, EncryptionError, GatewayError,
    InvoiceContext, InvoiceResponse, PaymentGatewayClient,
};
use crate::models::{NewPayment, Payment, PaymentStatus, User};
use crate::services::database::Database;
use crate::services::metrics::PAYMENTS_TOTAL;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Invalid payment amount {0}: must be positive with at most two decimal places")]
    InvalidAmount(Decimal),

    #[error("Failed to encrypt card data: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Payment {payment_id} failed at the gateway: {source}")]
    GatewayFailure {
        payment_id: i64,
        #[source]
        source: GatewayError,
    },

    #[error("Database error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::UserNotFound(_) | PaymentError::OrderNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            PaymentError::InvalidAmount(_) => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            PaymentError::Encryption(_) => AppError::InternalError(anyhow::anyhow!(err.to_string())),
            PaymentError::GatewayFailure { .. } => AppError::BadGateway(err.to_string()),
            PaymentError::Persistence(e) => AppError::from(e),
        }
    }
}

/// Card details supplied by the payer. Never persisted or logged.
pub struct CardDetails {
    pub hpan: Secret<String>,
    pub exp_date: Secret<String>,
    pub cvc: Secret<String>,
}

pub struct PaymentRequest {
    pub user_id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub card: CardDetails,
}

/// Invoice fields that come from configuration rather than the request.
#[derive(Clone, Debug)]
pub struct InvoiceSettings {
    pub currency: String,
    pub post_link: String,
}

#[derive(Clone)]
pub struct PaymentOrchestrator {
    db: Database,
    gateway: PaymentGatewayClient,
    encryptor: CardDataEncryptor,
    settings: InvoiceSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        db: Database,
        gateway: PaymentGatewayClient,
        encryptor: CardDataEncryptor,
        settings: InvoiceSettings,
    ) -> Self {
        Self {
            db,
            gateway,
            encryptor,
            settings,
        }
    }

    /// Records a payment attempt and charges it through the gateway.
    ///
    /// The payment row is written as unsuccessful before the gateway is called
    /// and stays that way unless the invoice is accepted.
    #[instrument(skip(self, request), fields(user_id = request.user_id, order_id = request.order_id, amount = %request.amount))]
    pub async fn create_payment(&self, request: PaymentRequest) -> Result<Payment, PaymentError> {
        let user = self
            .db
            .get_user(request.user_id)
            .await?
            .ok_or(PaymentError::UserNotFound(request.user_id))?;

        self.db
            .get_order(request.order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(request.order_id))?;

        let minor_units = match to_minor_units(request.amount) {
            Ok(units) => units,
            Err(e) => {
                PAYMENTS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(e);
            }
        };

        let payment = self
            .db
            .create_payment(&NewPayment {
                user_id: request.user_id,
                order_id: request.order_id,
                amount: request.amount,
                status: PaymentStatus::Unsuccessful,
            })
            .await?;

        let invoice_id = Payment::invoice_id_for(payment.id);
        let payment = self.db.set_payment_invoice(payment.id, &invoice_id).await?;

        info!(payment_id = payment.id, invoice_id = %invoice_id, "Payment recorded, submitting invoice");

        let submitted = self
            .submit_invoice(&user, &payment, &invoice_id, minor_units, &request.card)
            .await;

        match submitted {
            Ok(_) => {
                let payment = self
                    .db
                    .update_payment_status(payment.id, PaymentStatus::Successful)
                    .await?;
                PAYMENTS_TOTAL.with_label_values(&["successful"]).inc();
                info!(payment_id = payment.id, "Payment successful");
                Ok(payment)
            }
            Err(e) => {
                PAYMENTS_TOTAL.with_label_values(&["unsuccessful"]).inc();
                warn!(payment_id = payment.id, error = %e, "Payment unsuccessful");
                Err(e)
            }
        }
    }

    async fn submit_invoice(
        &self,
        user: &User,
        payment: &Payment,
        invoice_id: &str,
        minor_units: i64,
        card: &CardDetails,
    ) -> Result<InvoiceResponse, PaymentError> {
        let payment_id = payment.id;
        let gateway_failure =
            move |source: GatewayError| PaymentError::GatewayFailure { payment_id, source };

        let context = InvoiceContext {
            amount: minor_units,
            currency: self.settings.currency.clone(),
            invoice_id: invoice_id.to_string(),
        };
        let token = self
            .gateway
            .request_token(Some(&context))
            .await
            .map_err(gateway_failure)?;

        let cryptogram = self.encryptor.encrypt_cryptogram(&Cryptogram {
            hpan: card.hpan.expose_secret(),
            exp_date: card.exp_date.expose_secret(),
            cvc: card.cvc.expose_secret(),
            terminal_id: self.gateway.terminal_id(),
        })?;

        let invoice = CreateInvoiceRequest {
            amount: minor_units,
            currency: self.settings.currency.clone(),
            name: user.name.clone(),
            cryptogram,
            invoice_id: invoice_id.to_string(),
            description: format!("Payment for order #{}", payment.order_id),
            email: user.email.clone(),
            card_save: false,
            post_link: self.settings.post_link.clone(),
        };

        self.gateway
            .create_invoice(&token.access_token, &invoice)
            .await
            .map_err(gateway_failure)
    }
}

/// Largest amount the `NUMERIC(12, 2)` column holds.
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Converts a decimal amount to minor units (cents). Rejects non-positive
/// amounts, amounts with more than two decimal places and amounts the
/// payments table cannot store.
fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    if amount <= Decimal::ZERO || amount > MAX_AMOUNT || amount.normalize().scale() > 2 {
        return Err(PaymentError::InvalidAmount(amount));
    }

    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or(PaymentError::InvalidAmount(amount))
}
