use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Local;
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::{AppError, Result},
    handlers::{non_blank, AppJson, AppState},
    middleware::auth::AuthenticatedUser,
    models::{QuotaStatusResponse, UpdateUserRequest, UserChanges, UserResponse},
};

fn parse_user_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid User ID format".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "The user, without password", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let user_id = parse_user_id(&user_id)?;
    let user = state
        .users
        .find_user(user_id)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    Ok(Json(json!({ "user": UserResponse::from(user) })))
}

#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
    AppJson(request): AppJson<UpdateUserRequest>,
) -> Result<Json<UserResponse>> {
    let user_id = parse_user_id(&user_id)?;
    caller.ensure_self_or_admin(user_id)?;

    if request.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
        return Err(AppError::Validation("Username cannot be empty".to_string()));
    }
    let email = non_blank(request.email);
    if email.as_deref().is_some_and(|e| !e.contains('@')) {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }

    let password_hash = match request.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(state.passwords.hash_password_blocking(password).await?),
        None => None,
    };

    let changes = UserChanges {
        username: non_blank(request.username),
        email,
        password_hash,
        preferences: request.preferences,
    };

    let user = state
        .users
        .update_user(user_id, changes)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    tracing::info!(user_id = %user.id, by = %caller.user_id, "User updated");
    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let user_id = parse_user_id(&user_id)?;
    caller.ensure_self_or_admin(user_id)?;

    let deleted = state
        .users
        .delete_user(user_id)
        .await?
        .ok_or_else(AppError::user_not_found)?;

    tracing::info!(user_id = %deleted.id, by = %caller.user_id, "User deleted");
    Ok(Json(json!({
        "message": "User deleted",
        "deletedUser": UserResponse::from(deleted)
    })))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/quota",
    tag = "users",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Today's creation allowance", body = QuotaStatusResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_quota(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> Result<Json<QuotaStatusResponse>> {
    let user_id = parse_user_id(&user_id)?;
    caller.ensure_self_or_admin(user_id)?;

    let status = state.quota.status(user_id, Local::now()).await?;

    Ok(Json(QuotaStatusResponse {
        daily_limit: status.daily_limit,
        used: status.used,
        remaining: status.remaining(),
        window_start: status.window.start,
        window_end: status.window.end(),
    }))
}
