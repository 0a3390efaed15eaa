use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::CreatePaymentRequest;
use crate::models::Payment;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Charge a card for an order through the gateway.
pub async fn create_payment(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    tracing::info!(
        user_id = payload.user_id,
        order_id = payload.order_id,
        amount = %payload.amount,
        "Creating payment"
    );

    let payment = state.payments.create_payment(payload.into()).await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<i64>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .db
        .get_payment(payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id)))?;

    Ok(Json(payment))
}
