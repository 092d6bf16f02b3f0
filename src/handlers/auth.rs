use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::{
    auth::PasswordService,
    errors::{AppError, Result},
    handlers::{non_blank, AppJson, AppState},
    models::{LoginRequest, LoginResponse, NewUser, RegisterRequest, Role},
    services::DEFAULT_DAILY_LIMIT,
};

#[utoipa::path(
    post,
    path = "/api/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered"),
        (status = 400, description = "Missing or malformed fields"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let (Some(username), Some(email), Some(password)) = (
        non_blank(request.username),
        non_blank(request.email),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation("All fields are required".to_string()));
    };

    if !email.contains('@') {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }

    if state.users.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let password_hash = state.passwords.hash_password_blocking(password).await?;

    // The store's unique constraint still turns a concurrent duplicate into a conflict.
    let user = state
        .users
        .create_user(NewUser {
            username,
            email,
            password_hash,
            role: Role::User,
            daily_limit: DEFAULT_DAILY_LIMIT,
        })
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully"
        })),
    ))
}

#[utoipa::path(
    post,
    path = "/api/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed token and role", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (Some(email), Some(password)) = (
        non_blank(request.email),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation("All fields are required".to_string()));
    };

    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .users
        .find_user_by_email(&email)
        .await?
        .ok_or_else(invalid)?;

    if !PasswordService::verify_password_blocking(password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let token = state.jwt.issue_token(&user)?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        role: user.role,
    }))
}
