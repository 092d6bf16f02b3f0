use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::{AppJson, AppState},
    middleware::auth::AdminUser,
    models::{DailyLimitRequest, UserResponse},
};

/// A daily limit must be a positive integer that fits the stored column.
fn parse_daily_limit(raw: Option<&Value>) -> Result<u32> {
    let raw = raw.ok_or_else(|| AppError::Validation("New daily limit is required".to_string()))?;

    raw.as_u64()
        .filter(|limit| *limit > 0 && *limit <= i32::MAX as u64)
        .map(|limit| limit as u32)
        .ok_or_else(|| {
            AppError::Validation("Daily limit must be a positive integer".to_string())
        })
}

#[utoipa::path(
    get,
    path = "/api/users",
    tag = "admin",
    responses(
        (status = 200, description = "Every user, without passwords"),
        (status = 403, description = "Admins only")
    ),
    security(("bearer" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Value>> {
    let users: Vec<UserResponse> = state
        .users
        .list_users()
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(json!({ "users": users })))
}

#[utoipa::path(
    put,
    path = "/api/users/daily-limit",
    tag = "admin",
    request_body = DailyLimitRequest,
    responses(
        (status = 200, description = "Limit applied to every user"),
        (status = 400, description = "Missing or invalid limit"),
        (status = 403, description = "Admins only")
    ),
    security(("bearer" = []))
)]
pub async fn set_daily_limit_for_all(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppJson(request): AppJson<DailyLimitRequest>,
) -> Result<Json<Value>> {
    let limit = parse_daily_limit(request.daily_limit.as_ref())?;
    let updated = state.users.set_daily_limit_for_all(limit, Utc::now()).await?;

    tracing::info!(limit, updated, by = %admin.user_id, "Daily limit set for all users");
    Ok(Json(json!({
        "message": format!("Daily limit for all users set to {}", limit),
        "updatedUsers": updated
    })))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}/daily-limit",
    tag = "admin",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = DailyLimitRequest,
    responses(
        (status = 200, description = "Limit updated"),
        (status = 400, description = "Missing or invalid limit"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn set_daily_limit(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
    AppJson(request): AppJson<DailyLimitRequest>,
) -> Result<Json<Value>> {
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::Validation("Invalid User ID format".to_string()))?;
    let limit = parse_daily_limit(request.daily_limit.as_ref())?;

    let user = state
        .users
        .set_daily_limit(user_id, limit, Utc::now())
        .await?
        .ok_or_else(AppError::user_not_found)?;

    tracing::info!(user_id = %user.id, limit, by = %admin.user_id, "Daily limit updated");
    Ok(Json(json!({
        "message": "Daily limit updated",
        "user": UserResponse::from(user)
    })))
}
