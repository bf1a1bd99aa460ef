//! User administration handlers (super admin only).

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::user::{Identity, User};
use crate::services::user_service::CreateUser;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id/super-admin", put(set_super_admin))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_super_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_super_admin: user.is_super_admin,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub items: Vec<UserResponse>,
    pub total: usize,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: Option<String>,
    #[serde(default)]
    pub is_super_admin: bool,
}

redacted_debug!(CreateUserRequest {
    show email,
    show first_name,
    show last_name,
    redact_option password,
    show is_super_admin,
});

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    /// Present only when the password was generated; shown once.
    pub generated_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetSuperAdminRequest {
    pub is_super_admin: bool,
}

/// List users
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 403, description = "Super admin required", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<SharedState>) -> Result<Json<UserListResponse>> {
    let items: Vec<UserResponse> = state
        .users
        .list()
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();
    let total = items.len();
    Ok(Json(UserListResponse { items, total }))
}

/// Create a user
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreateUserResponse),
        (status = 400, description = "Invalid email or weak password", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<SharedState>,
    Extension(actor): Extension<Identity>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>)> {
    let created = state
        .users
        .create(
            &actor,
            CreateUser {
                email: payload.email,
                first_name: payload.first_name,
                last_name: payload.last_name,
                password: payload.password,
                is_super_admin: payload.is_super_admin,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user: created.user.into(),
            generated_password: created.generated_password,
        }),
    ))
}

/// Promote or demote a super admin
#[utoipa::path(
    put,
    path = "/{id}/super-admin",
    context_path = "/api/v1/users",
    tag = "users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetSuperAdminRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Would remove the last super admin", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_super_admin(
    State(state): State<SharedState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetSuperAdminRequest>,
) -> Result<Json<UserResponse>> {
    let user = state
        .users
        .set_super_admin(&actor, id, payload.is_super_admin)
        .await?;
    Ok(Json(user.into()))
}

#[derive(OpenApi)]
#[openapi(
    paths(list_users, create_user, set_super_admin),
    components(schemas(
        UserResponse,
        UserListResponse,
        CreateUserRequest,
        CreateUserResponse,
        SetSuperAdminRequest,
    ))
)]
pub struct UsersApiDoc;
