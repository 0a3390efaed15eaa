use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::CreateOrderRequest;
use crate::models::{Order, OrderWithItems, Payment};
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Settle a new order. Stock is reserved and the total computed atomically.
pub async fn create_order(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    tracing::info!(
        user_id = payload.user_id,
        item_count = payload.items.len(),
        "Creating order"
    );

    let order = state
        .settlement
        .create_order(payload.user_id, &payload.lines())
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderWithItems>, AppError> {
    let order = state
        .db
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

    let items = state.db.list_order_items(order_id).await?;

    Ok(Json(OrderWithItems { order, items }))
}

pub async fn list_order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Json<Vec<Payment>>, AppError> {
    state
        .db
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order {} not found", order_id)))?;

    let payments = state.db.list_order_payments(order_id).await?;

    Ok(Json(payments))
}
