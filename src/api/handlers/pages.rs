//! Page catalogue, per-page permissions and comment handlers.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::SharedState;
use crate::error::Result;
use crate::models::comment::{Comment, HistoryAction};
use crate::models::permission::{Action, PageKey};
use crate::models::user::Identity;
use crate::services::comment_service::{CommentView, HistoryEntryView};

/// `/pages` routes.
pub fn pages_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_pages))
        .route("/:page/permissions", get(page_permissions))
        .route("/:page/comments", get(list_comments).post(create_comment))
}

/// `/comments` routes.
pub fn comments_router() -> Router<SharedState> {
    Router::new()
        .route("/:id", put(update_comment).delete(delete_comment))
        .route("/:id/history", get(comment_history))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub key: PageKey,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageListResponse {
    pub items: Vec<PageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PagePermissionsResponse {
    pub page_key: PageKey,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentListResponse {
    pub items: Vec<CommentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentHistoryResponse {
    pub comment_id: Uuid,
    pub items: Vec<HistoryEntryView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentContentRequest {
    pub content: String,
}

/// List the pages that grants apply to
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/pages",
    tag = "pages",
    responses((status = 200, description = "Page catalogue", body = PageListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_pages() -> Json<PageListResponse> {
    Json(PageListResponse {
        items: PageKey::ALL
            .into_iter()
            .map(|key| PageInfo {
                key,
                name: key.display_name().to_string(),
            })
            .collect(),
    })
}

/// Actions the caller may perform on a page
#[utoipa::path(
    get,
    path = "/{page}/permissions",
    context_path = "/api/v1/pages",
    tag = "pages",
    params(("page" = String, Path, description = "Page key")),
    responses(
        (status = 200, description = "Granted actions", body = PagePermissionsResponse),
        (status = 400, description = "Unknown page key", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn page_permissions(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(page): Path<String>,
) -> Result<Json<PagePermissionsResponse>> {
    let page: PageKey = page.parse()?;
    let actions = state.resolver.authorize_bulk(&identity, page).await?;
    Ok(Json(PagePermissionsResponse {
        page_key: page,
        actions: actions.into_iter().collect(),
    }))
}

/// Active comments on a page
#[utoipa::path(
    get,
    path = "/{page}/comments",
    context_path = "/api/v1/pages",
    tag = "comments",
    params(("page" = String, Path, description = "Page key")),
    responses(
        (status = 200, description = "Comments, newest first", body = CommentListResponse),
        (status = 403, description = "No view grant on the page", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_comments(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(page): Path<String>,
) -> Result<Json<CommentListResponse>> {
    let page: PageKey = page.parse()?;
    let items = state.comments.list(&identity, page).await?;
    Ok(Json(CommentListResponse { items }))
}

/// Add a comment to a page
#[utoipa::path(
    post,
    path = "/{page}/comments",
    context_path = "/api/v1/pages",
    tag = "comments",
    params(("page" = String, Path, description = "Page key")),
    request_body = CommentContentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty content or unknown page", body = crate::api::openapi::ErrorResponse),
        (status = 403, description = "No create grant on the page", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(page): Path<String>,
    Json(payload): Json<CommentContentRequest>,
) -> Result<(StatusCode, Json<Comment>)> {
    let page: PageKey = page.parse()?;
    let comment = state
        .comments
        .create(&identity, page, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Replace a comment's content
#[utoipa::path(
    put,
    path = "/{id}",
    context_path = "/api/v1/comments",
    tag = "comments",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = CommentContentRequest,
    responses(
        (status = 200, description = "Updated comment", body = Comment),
        (status = 403, description = "No edit grant on the page", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_comment(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentContentRequest>,
) -> Result<Json<Comment>> {
    let comment = state
        .comments
        .update(&identity, id, &payload.content)
        .await?;
    Ok(Json(comment))
}

/// Delete a comment (history is kept)
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/comments",
    tag = "comments",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "No delete grant on the page", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_comment(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.comments.delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change history of a comment
#[utoipa::path(
    get,
    path = "/{id}/history",
    context_path = "/api/v1/comments",
    tag = "comments",
    params(("id" = Uuid, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "History, newest first", body = CommentHistoryResponse),
        (status = 403, description = "Not allowed to read history", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Comment not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn comment_history(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommentHistoryResponse>> {
    let items = state.comments.history(&identity, id).await?;
    Ok(Json(CommentHistoryResponse {
        comment_id: id,
        items,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_pages,
        page_permissions,
        list_comments,
        create_comment,
        update_comment,
        delete_comment,
        comment_history,
    ),
    components(schemas(
        PageInfo,
        PageListResponse,
        PagePermissionsResponse,
        CommentListResponse,
        CommentHistoryResponse,
        CommentContentRequest,
        CommentView,
        HistoryEntryView,
        Comment,
        HistoryAction,
    ))
)]
pub struct PagesApiDoc;
