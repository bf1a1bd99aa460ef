//! Typed HTTP client for the Page Keeper API.
//!
//! The client keeps the access/refresh token pair of one session. A call that
//! is rejected with 401 triggers exactly one token refresh and one replay of
//! the original request; a second rejection ends the session and surfaces as
//! [`AppError::Unauthenticated`]. Transport failures surface as
//! [`AppError::Transient`] and are never retried.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::handlers::auth::{LoginResponse, ProfileResponse, RefreshTokenResponse};
use crate::api::handlers::pages::{
    CommentHistoryResponse, CommentListResponse, PageInfo, PageListResponse,
    PagePermissionsResponse,
};
use crate::api::handlers::permissions::UserPermissionsResponse;
use crate::api::handlers::users::{CreateUserRequest, CreateUserResponse, UserListResponse, UserResponse};
use crate::error::{AppError, Result};
use crate::models::comment::Comment;
use crate::models::permission::{Action, PageKey};
use crate::services::comment_service::{CommentView, HistoryEntryView};

const API_PREFIX: &str = "/api/v1";

/// Access/refresh pair held by the client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

redacted_debug!(SessionTokens {
    redact access_token,
    redact refresh_token,
});

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// API client for one user session.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Mutex<Option<SessionTokens>>,
}

impl ApiClient {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:8080`).
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: Mutex::new(None),
        })
    }

    pub async fn set_tokens(&self, tokens: SessionTokens) {
        *self.tokens.lock().await = Some(tokens);
    }

    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.lock().await.clone()
    }

    pub async fn clear_tokens(&self) {
        *self.tokens.lock().await = None;
    }

    // --- auth ---

    /// Log in and keep the returned token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .send(Method::POST, "/auth/login", Some(&body), None)
            .await?;
        let login: LoginResponse = decode(response).await?;
        self.set_tokens(SessionTokens {
            access_token: login.access_token.clone(),
            refresh_token: login.refresh_token.clone(),
        })
        .await;
        Ok(login)
    }

    /// End the session on the server and forget the tokens.
    pub async fn logout(&self) -> Result<()> {
        let Some(tokens) = self.tokens().await else {
            return Ok(());
        };
        let body = json!({ "refresh_token": tokens.refresh_token });
        let result = self
            .send(Method::POST, "/auth/logout", Some(&body), None)
            .await;
        self.clear_tokens().await;
        expect_empty(result?).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let body = json!({ "email": email });
        let response = self
            .send(Method::POST, "/auth/password-reset/request", Some(&body), None)
            .await?;
        expect_empty(response).await
    }

    pub async fn verify_password_reset(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        let body = json!({ "email": email, "code": code, "new_password": new_password });
        let response = self
            .send(Method::POST, "/auth/password-reset/verify", Some(&body), None)
            .await?;
        expect_empty(response).await
    }

    pub async fn profile(&self) -> Result<ProfileResponse> {
        decode(self.call(Method::GET, "/auth/profile", None).await?).await
    }

    pub async fn update_profile(
        &self,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<ProfileResponse> {
        let body = json!({ "first_name": first_name, "last_name": last_name });
        decode(self.call(Method::PUT, "/auth/profile", Some(body)).await?).await
    }

    // --- pages and comments ---

    pub async fn list_pages(&self) -> Result<Vec<PageInfo>> {
        let pages: PageListResponse = decode(self.call(Method::GET, "/pages", None).await?).await?;
        Ok(pages.items)
    }

    /// Actions the current user holds on `page`.
    pub async fn page_permissions(&self, page: PageKey) -> Result<Vec<Action>> {
        let path = format!("/pages/{}/permissions", page);
        let resolved: PagePermissionsResponse = decode(self.call(Method::GET, &path, None).await?).await?;
        Ok(resolved.actions)
    }

    pub async fn list_comments(&self, page: PageKey) -> Result<Vec<CommentView>> {
        let path = format!("/pages/{}/comments", page);
        let list: CommentListResponse = decode(self.call(Method::GET, &path, None).await?).await?;
        Ok(list.items)
    }

    pub async fn create_comment(&self, page: PageKey, content: &str) -> Result<Comment> {
        let path = format!("/pages/{}/comments", page);
        let body = json!({ "content": content });
        decode(self.call(Method::POST, &path, Some(body)).await?).await
    }

    pub async fn update_comment(&self, id: Uuid, content: &str) -> Result<Comment> {
        let path = format!("/comments/{}", id);
        let body = json!({ "content": content });
        decode(self.call(Method::PUT, &path, Some(body)).await?).await
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<()> {
        let path = format!("/comments/{}", id);
        expect_empty(self.call(Method::DELETE, &path, None).await?).await
    }

    pub async fn comment_history(&self, id: Uuid) -> Result<Vec<HistoryEntryView>> {
        let path = format!("/comments/{}/history", id);
        let history: CommentHistoryResponse = decode(self.call(Method::GET, &path, None).await?).await?;
        Ok(history.items)
    }

    // --- administration ---

    pub async fn list_users(&self) -> Result<Vec<UserResponse>> {
        let users: UserListResponse = decode(self.call(Method::GET, "/users", None).await?).await?;
        Ok(users.items)
    }

    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<CreateUserResponse> {
        let body = serde_json::to_value(request)?;
        decode(self.call(Method::POST, "/users", Some(body)).await?).await
    }

    pub async fn user_permissions(&self, user_id: Uuid) -> Result<UserPermissionsResponse> {
        let path = format!("/permissions/users/{}", user_id);
        decode(self.call(Method::GET, &path, None).await?).await
    }

    pub async fn replace_user_permissions(
        &self,
        user_id: Uuid,
        permissions: &BTreeMap<PageKey, Vec<Action>>,
    ) -> Result<UserPermissionsResponse> {
        let path = format!("/permissions/users/{}", user_id);
        let permissions: BTreeMap<&str, Vec<&str>> = permissions
            .iter()
            .map(|(page, actions)| (page.as_str(), actions.iter().map(Action::as_str).collect()))
            .collect();
        let body = json!({ "permissions": permissions });
        decode(self.call(Method::PUT, &path, Some(body)).await?).await
    }

    // --- transport ---

    /// Authenticated call with a single refresh-and-replay on 401.
    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Response> {
        let token = self.access_token().await?;
        let response = self
            .send(method.clone(), path, body.as_ref(), Some(&token))
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(path, "Access token rejected, refreshing session");
        let token = self.refresh_access_token().await?;
        let replayed = self.send(method, path, body.as_ref(), Some(&token)).await?;
        if replayed.status() == StatusCode::UNAUTHORIZED {
            self.clear_tokens().await;
            return Err(AppError::Unauthenticated(
                "Session rejected after token refresh".into(),
            ));
        }
        Ok(replayed)
    }

    async fn access_token(&self) -> Result<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or_else(|| AppError::Unauthenticated("Not logged in".into()))
    }

    /// Exchange the refresh token for a new access token. A rejected refresh
    /// ends the session.
    async fn refresh_access_token(&self) -> Result<String> {
        let refresh_token = self
            .tokens()
            .await
            .map(|t| t.refresh_token)
            .ok_or_else(|| AppError::Unauthenticated("Not logged in".into()))?;

        let body = json!({ "refresh_token": refresh_token });
        let response = self
            .send(Method::POST, "/auth/refresh", Some(&body), None)
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.clear_tokens().await;
            return Err(AppError::Unauthenticated("Session expired".into()));
        }

        let refreshed: RefreshTokenResponse = decode(response).await?;
        if let Some(tokens) = self.tokens.lock().await.as_mut() {
            tokens.access_token = refreshed.access_token.clone();
        }
        Ok(refreshed.access_token)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        bearer: Option<&str>,
    ) -> Result<Response> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let mut request = self.http.request(method, &url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Request failed");
            AppError::Transient(format!("Request to {} failed: {}", path, e))
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::Internal(format!("Invalid response body: {}", e)))
}

async fn expect_empty(response: Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ErrorBody>().await.ok();
    Err(error_from_status(status, body))
}

/// Map a non-success response back onto the error taxonomy.
fn error_from_status(status: StatusCode, body: Option<ErrorBody>) -> AppError {
    let (code, message) = match body {
        Some(ErrorBody { code, message }) => (
            code.unwrap_or_default(),
            message.unwrap_or_else(|| status.to_string()),
        ),
        None => (String::new(), status.to_string()),
    };

    match status {
        StatusCode::UNAUTHORIZED => AppError::Unauthenticated(message),
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::BAD_REQUEST if code == "INVALID_PAGE_KEY" => AppError::InvalidPageKey(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(message),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => AppError::Transient(message),
        _ => AppError::Internal(format!("{}: {}", status, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: &str, message: &str) -> Option<ErrorBody> {
        Some(ErrorBody {
            code: Some(code.into()),
            message: Some(message.into()),
        })
    }

    #[test]
    fn test_error_mapping_follows_status() {
        assert!(matches!(
            error_from_status(StatusCode::FORBIDDEN, body("FORBIDDEN", "no")),
            AppError::Forbidden(m) if m == "no"
        ));
        assert!(matches!(
            error_from_status(StatusCode::CONFLICT, None),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::SERVICE_UNAVAILABLE, None),
            AppError::Transient(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::IM_A_TEAPOT, None),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn test_bad_request_distinguishes_page_key() {
        assert!(matches!(
            error_from_status(StatusCode::BAD_REQUEST, body("INVALID_PAGE_KEY", "Unknown page key 'x'")),
            AppError::InvalidPageKey(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::BAD_REQUEST, body("VALIDATION_ERROR", "bad")),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_tokens_debug_is_redacted() {
        let tokens = SessionTokens {
            access_token: "aaa.bbb.ccc".into(),
            refresh_token: "ddd.eee.fff".into(),
        };
        let output = format!("{:?}", tokens);
        assert!(!output.contains("aaa.bbb.ccc"));
        assert!(!output.contains("ddd.eee.fff"));
    }

    #[tokio::test]
    async fn test_call_without_session_is_unauthenticated() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.list_pages().await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        client
            .set_tokens(SessionTokens {
                access_token: "a".into(),
                refresh_token: "r".into(),
            })
            .await;
        let err = client.list_pages().await.unwrap_err();
        assert!(matches!(err, AppError::Transient(_)));
    }
}
