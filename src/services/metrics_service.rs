//! Prometheus metrics collection and HTTP request instrumentation.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};

use crate::error::{AppError, Result};
use crate::models::permission::{Action, PageKey};
use crate::models::comment::HistoryAction;

/// Initialize the Prometheus metrics recorder and return the handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Internal(format!("failed to install Prometheus recorder: {}", e)))
}

/// Axum middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let normalized = normalize_path(request.uri().path());

    let start = Instant::now();
    counter!("pk_http_requests_total", "method" => method.clone(), "path" => normalized.clone())
        .increment(1);
    gauge!("pk_http_requests_in_flight", "method" => method.clone(), "path" => normalized.clone())
        .increment(1.0);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    histogram!("pk_http_request_duration_seconds", "method" => method.clone(), "path" => normalized.clone(), "status" => status.clone()).record(duration);
    counter!("pk_http_responses_total", "method" => method.clone(), "path" => normalized.clone(), "status" => status).increment(1);
    gauge!("pk_http_requests_in_flight", "method" => method, "path" => normalized).decrement(1.0);

    response
}

/// Replace UUID and numeric path segments with `:id` to bound label cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if uuid::Uuid::parse_str(seg).is_ok() || (!seg.is_empty() && seg.parse::<i64>().is_ok()) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Record one authorization decision.
pub fn record_authorization(page: PageKey, action: Action, allowed: bool, super_admin: bool) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!(
        "pk_authorization_decisions_total",
        "page" => page.as_str(),
        "action" => action.as_str(),
        "decision" => decision,
        "super_admin" => if super_admin { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a comment mutation.
pub fn record_comment_mutation(page: PageKey, action: HistoryAction) {
    counter!("pk_comment_mutations_total", "page" => page.as_str(), "action" => action.as_str())
        .increment(1);
}

/// Record a login attempt.
pub fn record_login(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("pk_login_attempts_total", "status" => status).increment(1);
}

/// Update user count gauge.
pub fn set_user_gauge(total_users: i64) {
    gauge!("pk_users_total").set(total_users as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/comments/550e8400-e29b-41d4-a716-446655440000/history";
        assert_eq!(normalize_path(path), "/api/v1/comments/:id/history");
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/api/v1/users/123"), "/api/v1/users/:id");
    }

    #[test]
    fn test_normalize_path_keeps_page_keys() {
        let path = "/api/v1/pages/offer-pricing/comments";
        assert_eq!(normalize_path(path), path);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_authorization(PageKey::Finance, Action::View, true, false);
        record_comment_mutation(PageKey::Finance, HistoryAction::Created);
        record_login(false);
    }
}
