//! Business logic services.

pub mod auth_service;
pub mod authz_service;
pub mod comment_service;
pub mod mailer;
pub mod metrics_service;
pub mod password_policy;
pub mod password_reset_service;
pub mod user_service;
