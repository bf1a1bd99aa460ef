//! Fixed-window rate limiting for the credential endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::RwLock;

/// Counts requests per key within a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    /// key -> (requests in window, window start)
    windows: RwLock<HashMap<String, (u32, Instant)>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    /// `Ok(remaining)` when the request is admitted, `Err(retry_after_secs)`
    /// when the key has used up its window.
    pub async fn check(&self, key: &str) -> Result<u32, u64> {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        // Opportunistic sweep so idle keys do not accumulate.
        if windows.len() > 10_000 {
            windows.retain(|_, (_, start)| now.duration_since(*start) < self.window);
        }

        let (count, start) = windows.entry(key.to_string()).or_insert((0, now));
        if now.duration_since(*start) >= self.window {
            *count = 0;
            *start = now;
        }
        if *count >= self.max_requests {
            let elapsed = now.duration_since(*start).as_secs();
            return Err(self.window.as_secs().saturating_sub(elapsed).max(1));
        }
        *count += 1;
        Ok(self.max_requests - *count)
    }
}

/// Reject with 429 once the caller's window is exhausted. Callers are keyed
/// by TCP peer address; forwarding headers are not trusted.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.check(&key).await {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
            response
        }
        Err(retry_after) => {
            tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "code": "RATE_LIMITED",
                    "message": "Too many requests. Please try again later.",
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(retry_after));
            response
        }
    }
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "ip:unknown".to_string())
}
