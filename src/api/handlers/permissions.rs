//! Permission administration handlers (super admin only).

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::permission::{group_by_page, parse_grant_map, Action, GrantSet, PageKey};
use crate::models::user::Identity;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_all_permissions))
        .route("/summary", get(permission_summary))
        .route(
            "/users/:id",
            get(get_user_permissions).put(replace_user_permissions),
        )
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionGrantResponse {
    pub user_id: Uuid,
    pub page_key: PageKey,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionListResponse {
    pub items: Vec<PermissionGrantResponse>,
    pub total: usize,
}

/// A user's grants keyed by page key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPermissionsResponse {
    pub user_id: Uuid,
    pub permissions: BTreeMap<String, Vec<Action>>,
}

/// Full replacement of a user's grants: `{"clients": ["view", "edit"]}`.
/// Pages left out end up with no grants.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReplacePermissionsRequest {
    pub permissions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPermissionSummary {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub is_super_admin: bool,
    /// Highest action held per page, for display only.
    pub pages: BTreeMap<String, Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionSummaryResponse {
    pub items: Vec<UserPermissionSummary>,
}

fn to_response(user_id: Uuid, grants: &GrantSet) -> UserPermissionsResponse {
    UserPermissionsResponse {
        user_id,
        permissions: group_by_page(grants)
            .into_iter()
            .map(|(page, actions)| (page.as_str().to_string(), actions.into_iter().collect()))
            .collect(),
    }
}

/// List every stored grant
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/permissions",
    tag = "permissions",
    responses(
        (status = 200, description = "All grants", body = PermissionListResponse),
        (status = 403, description = "Super admin required", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_all_permissions(
    State(state): State<SharedState>,
) -> Result<Json<PermissionListResponse>> {
    let items: Vec<PermissionGrantResponse> = state
        .stores
        .permissions
        .list_all()
        .await?
        .into_iter()
        .map(|g| PermissionGrantResponse {
            user_id: g.user_id,
            page_key: g.page_key,
            action: g.action,
            created_at: g.created_at,
        })
        .collect();
    let total = items.len();
    Ok(Json(PermissionListResponse { items, total }))
}

/// Highest action per page for every user
#[utoipa::path(
    get,
    path = "/summary",
    context_path = "/api/v1/permissions",
    tag = "permissions",
    responses(
        (status = 200, description = "Per-user summary", body = PermissionSummaryResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn permission_summary(
    State(state): State<SharedState>,
) -> Result<Json<PermissionSummaryResponse>> {
    let users = state.users.list().await?;
    let mut items = Vec::with_capacity(users.len());

    for user in users {
        let grants = state.stores.permissions.list_for_user(user.id).await?;
        let pages = group_by_page(&grants)
            .into_iter()
            .filter_map(|(page, actions)| {
                Action::highest(&actions).map(|a| (page.as_str().to_string(), a))
            })
            .collect();
        items.push(UserPermissionSummary {
            user_id: user.id,
            name: user.full_name(),
            email: user.email,
            is_super_admin: user.is_super_admin,
            pages,
        });
    }

    Ok(Json(PermissionSummaryResponse { items }))
}

/// Grants held by one user
#[utoipa::path(
    get,
    path = "/users/{id}",
    context_path = "/api/v1/permissions",
    tag = "permissions",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User grants", body = UserPermissionsResponse),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user_permissions(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserPermissionsResponse>> {
    state.users.get(id).await?;
    let grants = state.stores.permissions.list_for_user(id).await?;
    Ok(Json(to_response(id, &grants)))
}

/// Replace a user's grants atomically
#[utoipa::path(
    put,
    path = "/users/{id}",
    context_path = "/api/v1/permissions",
    tag = "permissions",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = ReplacePermissionsRequest,
    responses(
        (status = 200, description = "Grants after replacement", body = UserPermissionsResponse),
        (status = 400, description = "Unknown page key or action", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "User not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn replace_user_permissions(
    State(state): State<SharedState>,
    Extension(actor): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplacePermissionsRequest>,
) -> Result<Json<UserPermissionsResponse>> {
    let grants = parse_grant_map(&payload.permissions)?;
    state.users.get(id).await?;

    state.stores.permissions.replace_for_user(id, &grants).await?;
    tracing::info!(
        user_id = %id,
        changed_by = %actor.id,
        grants = grants.len(),
        "Permissions replaced"
    );

    Ok(Json(to_response(id, &grants)))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_all_permissions,
        permission_summary,
        get_user_permissions,
        replace_user_permissions,
    ),
    components(schemas(
        PermissionGrantResponse,
        PermissionListResponse,
        UserPermissionsResponse,
        ReplacePermissionsRequest,
        UserPermissionSummary,
        PermissionSummaryResponse,
        PageKey,
        Action,
    ))
)]
pub struct PermissionsApiDoc;
