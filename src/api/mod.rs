//! API module - HTTP handlers and middleware.

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::services::authz_service::AuthorizationResolver;
use crate::services::comment_service::{CommentPolicy, CommentService};
use crate::services::mailer::Mailer;
use crate::services::password_reset_service::PasswordResetService;
use crate::services::user_service::UserService;
use crate::store::Stores;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Stores,
    pub auth: Arc<AuthService>,
    pub resolver: AuthorizationResolver,
    pub comments: CommentService,
    pub users: Arc<UserService>,
    pub password_reset: Arc<PasswordResetService>,
    pub metrics_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, mailer: Arc<dyn Mailer>) -> Self {
        let config = Arc::new(config);
        let resolver = AuthorizationResolver::new(stores.permissions.clone());
        Self {
            auth: Arc::new(AuthService::new(
                stores.users.clone(),
                stores.sessions.clone(),
                config.clone(),
            )),
            comments: CommentService::new(
                stores.comments.clone(),
                stores.users.clone(),
                resolver.clone(),
                CommentPolicy::from(config.as_ref()),
            ),
            users: Arc::new(UserService::new(
                stores.users.clone(),
                mailer.clone(),
                config.clone(),
            )),
            password_reset: Arc::new(PasswordResetService::new(
                stores.users.clone(),
                stores.sessions.clone(),
                mailer,
                config.clone(),
            )),
            resolver,
            stores,
            config,
            metrics_handle: None,
        }
    }

    /// Attach the Prometheus handle rendered by `/metrics`.
    pub fn set_metrics_handle(&mut self, handle: PrometheusHandle) {
        self.metrics_handle = Some(Arc::new(handle));
    }
}

pub type SharedState = Arc<AppState>;
