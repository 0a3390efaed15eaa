use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::CreateProductRequest;
use crate::models::Product;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_product(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    tracing::info!(
        name = %payload.name,
        price = %payload.price,
        stock_quantity = payload.stock_quantity,
        "Creating product"
    );

    let product = state.db.create_product(&payload.into()).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .db
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product {} not found", product_id)))?;

    Ok(Json(product))
}
