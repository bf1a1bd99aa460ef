//! Route definitions for the API.

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers;
use super::middleware::auth::{admin_middleware, auth_middleware};
use super::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use super::middleware::tracing::correlation_id_middleware;
use super::SharedState;
use crate::services::metrics_service::metrics_middleware;

/// Requests per minute allowed on each credential endpoint, per client.
const AUTH_RATE_LIMIT_PER_MINUTE: u32 = 30;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    let openapi = super::openapi::build_openapi();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", openapi))
        .nest("/api/v1", api_v1_routes(&state))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: &SharedState) -> Router<SharedState> {
    let auth_service = state.auth.clone();
    let auth_rate_limiter = Arc::new(RateLimiter::new(AUTH_RATE_LIMIT_PER_MINUTE, 60));

    let session = || middleware::from_fn_with_state(auth_service.clone(), auth_middleware);
    let super_admin = || middleware::from_fn_with_state(auth_service.clone(), admin_middleware);

    Router::new()
        // Credential endpoints are public but rate limited
        .nest(
            "/auth",
            handlers::auth::public_router().layer(middleware::from_fn_with_state(
                auth_rate_limiter,
                rate_limit_middleware,
            )),
        )
        .nest("/auth", handlers::auth::logout_router())
        .nest("/auth", handlers::auth::protected_router().layer(session()))
        // Administration
        .nest("/users", handlers::users::router().layer(super_admin()))
        .nest(
            "/permissions",
            handlers::permissions::router().layer(super_admin()),
        )
        // Pages and comments
        .nest("/pages", handlers::pages::pages_router().layer(session()))
        .nest(
            "/comments",
            handlers::pages::comments_router().layer(session()),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
}
