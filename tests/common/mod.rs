//! Common test utilities for backend integration and handler tests
//!
//! - A full router over the in-memory stores
//! - A mailer that records outbound messages
//! - User, grant and login helpers

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pagekeeper_backend::api::{routes::create_router, AppState, SharedState};
use pagekeeper_backend::config::Config;
use pagekeeper_backend::error::Result;
use pagekeeper_backend::models::permission::{Action, PageKey};
use pagekeeper_backend::models::user::{Identity, NewUser, User};
use pagekeeper_backend::services::auth_service::AuthService;
use pagekeeper_backend::services::mailer::{Mailer, OutboundEmail};
use pagekeeper_backend::store::{PermissionStore, Stores, UserStore};

/// Password given to every seeded user.
pub const PASSWORD: &str = "Correct-Horse-9!";

/// Mailer that keeps every message for inspection.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Most recent message addressed to `to`.
    pub fn last_to(&self, to: &str) -> Option<OutboundEmail> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }

    /// The six-digit code from the latest reset message to `to`.
    pub fn reset_code_for(&self, to: &str) -> Option<String> {
        let message = self.last_to(to)?;
        message
            .body
            .split(|c: char| !c.is_ascii_digit())
            .find(|token| token.len() == 6)
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::new("postgres://unused", "integration-test-secret");
    config.bcrypt_cost = 4;
    config.data_dir = std::env::temp_dir().to_string_lossy().into_owned();
    config
}

/// A complete application over the in-memory stores.
pub struct TestApp {
    pub state: SharedState,
    pub stores: Stores,
    pub mailer: Arc<RecordingMailer>,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = test_config();
        configure(&mut config);

        let stores = Stores::in_memory();
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(AppState::new(config, stores.clone(), mailer.clone()));
        Self {
            router: create_router(state.clone()),
            state,
            stores,
            mailer,
        }
    }

    /// Insert a user with [`PASSWORD`] directly through the store.
    pub async fn seed_user(&self, email: &str, is_super_admin: bool) -> User {
        self.stores
            .users
            .create(NewUser {
                email: email.to_string(),
                first_name: "Test".into(),
                last_name: email.split('@').next().unwrap_or("user").into(),
                password_hash: AuthService::hash_password(PASSWORD, 4).unwrap(),
                is_super_admin,
            })
            .await
            .unwrap()
    }

    pub async fn identity(&self, email: &str, is_super_admin: bool) -> Identity {
        self.seed_user(email, is_super_admin).await.identity()
    }

    pub async fn grant(&self, user: &User, page: PageKey, actions: &[Action]) {
        for action in actions {
            self.stores
                .permissions
                .grant(user.id, page, *action)
                .await
                .unwrap();
        }
    }

    /// Log in through the service and return the access token.
    pub async fn access_token(&self, email: &str) -> String {
        let (_, tokens) = self.state.auth.authenticate(email, PASSWORD).await.unwrap();
        tokens.access_token
    }

    /// Send a request through the router and decode the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
