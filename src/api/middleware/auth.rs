//! Bearer-token authentication and the super-admin gate.
//!
//! Both middlewares resolve the access token to a fresh [`Identity`] and
//! insert it as a request extension for handlers to extract.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::models::user::Identity;
use crate::services::auth_service::AuthService;

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(request: &Request) -> Result<&str> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthenticated("Missing authorization header".into()))?;
    header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("Invalid authorization header format".into()))
}

/// Resolve the session behind `token`. Callers pass an owned token so no
/// borrow of the request lives across the await.
async fn resolve(auth_service: &AuthService, token: Result<String>) -> Result<Identity> {
    auth_service.current_identity(&token?).await
}

/// Require a valid session.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(&request).map(str::to_owned);
    match resolve(&auth_service, token).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Require a valid session belonging to a super admin.
pub async fn admin_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(&request).map(str::to_owned);
    let identity = match resolve(&auth_service, token).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    if !identity.is_super_admin {
        tracing::info!(user_id = %identity.id, path = %request.uri().path(), "Super admin required");
        return AppError::Forbidden("Super admin privileges required".into()).into_response();
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}
