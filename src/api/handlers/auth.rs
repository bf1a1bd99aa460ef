//! Authentication, session and profile handlers.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::user::{Identity, User};

/// Credential endpoints (rate limited).
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/password-reset/request", post(request_password_reset))
        .route("/password-reset/verify", post(verify_password_reset))
}

/// Logout needs only the refresh token being revoked.
pub fn logout_router() -> Router<SharedState> {
    Router::new().route("/logout", post(logout))
}

/// Routes that require a session.
pub fn protected_router() -> Router<SharedState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

redacted_debug!(LoginRequest {
    show email,
    redact password,
});

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub token_type: String,
    pub user: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetVerifyRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

redacted_debug!(PasswordResetVerifyRequest {
    show email,
    redact code,
    redact new_password,
});

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_super_admin: user.is_super_admin,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/login",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (identity, tokens) = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await?;

    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        token_type: "Bearer".to_string(),
        user: identity,
    }))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/refresh",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshTokenResponse),
        (status = 401, description = "Refresh token invalid, expired or revoked", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn refresh_token(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<RefreshTokenResponse>> {
    let token = state.auth.refresh(&payload.refresh_token).await?;
    Ok(Json(RefreshTokenResponse {
        access_token: token.access_token,
        expires_in: token.expires_in,
        token_type: "Bearer".to_string(),
    }))
}

/// End the session behind a refresh token
#[utoipa::path(
    post,
    path = "/logout",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "Malformed refresh token", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn logout(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<StatusCode> {
    state.auth.invalidate(&payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Email a one-time reset code
#[utoipa::path(
    post,
    path = "/password-reset/request",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Accepted whether or not the email is registered", body = MessageResponse),
    )
)]
pub async fn request_password_reset(
    State(state): State<SharedState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    state.password_reset.request_reset(&payload.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the email is registered, a reset code has been sent".to_string(),
        }),
    ))
}

/// Set a new password using a reset code
#[utoipa::path(
    post,
    path = "/password-reset/verify",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = PasswordResetVerifyRequest,
    responses(
        (status = 200, description = "Password replaced; all sessions ended", body = MessageResponse),
        (status = 400, description = "Invalid code or weak password", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn verify_password_reset(
    State(state): State<SharedState>,
    Json(payload): Json<PasswordResetVerifyRequest>,
) -> Result<Json<MessageResponse>> {
    state
        .password_reset
        .verify_reset(&payload.email, &payload.code, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset".to_string(),
    }))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/profile",
    context_path = "/api/v1/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "No session", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileResponse>> {
    let user = state.auth.get_profile(&identity).await?;
    Ok(Json(user.into()))
}

/// Update the current user's name
#[utoipa::path(
    put,
    path = "/profile",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 400, description = "Invalid name", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>> {
    let user = state
        .auth
        .update_profile(
            &identity,
            payload.first_name.as_deref(),
            payload.last_name.as_deref(),
        )
        .await?;
    Ok(Json(user.into()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        login,
        refresh_token,
        logout,
        request_password_reset,
        verify_password_reset,
        get_profile,
        update_profile,
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        RefreshTokenRequest,
        RefreshTokenResponse,
        PasswordResetRequest,
        PasswordResetVerifyRequest,
        MessageResponse,
        ProfileResponse,
        UpdateProfileRequest,
        Identity,
    ))
)]
pub struct AuthApiDoc;
