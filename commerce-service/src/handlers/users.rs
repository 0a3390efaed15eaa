use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::CreateUserRequest;
use crate::models::User;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    tracing::info!(email = %payload.email, "Creating user");

    let user = state.db.create_user(&payload.into()).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, AppError> {
    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User {} not found", user_id)))?;

    Ok(Json(user))
}
