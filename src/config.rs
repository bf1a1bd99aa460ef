//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use crate::models::comment::HistoryVisibility;
use crate::services::password_policy::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token expiry in minutes
    pub jwt_access_token_expiry_minutes: i64,

    /// JWT refresh token expiry in days
    pub jwt_refresh_token_expiry_days: i64,

    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,

    /// Minimum length for user-chosen and generated passwords
    pub password_min_length: usize,

    /// Lifetime of a password reset code in minutes
    pub reset_code_ttl_minutes: i64,

    /// Failed verification attempts allowed per reset code
    pub reset_code_max_attempts: i32,

    /// Who may read a comment's history
    pub comment_history_visibility: HistoryVisibility,

    /// Whether comment authors may edit/delete their own comments without a page grant
    pub comment_author_override: bool,

    /// Email of the super admin provisioned on first boot
    pub admin_email: String,

    /// Password of the provisioned super admin (generated when unset)
    pub admin_password: Option<String>,

    /// Directory for files written at startup (generated admin password)
    pub data_dir: String,

    /// OTLP collector endpoint (optional)
    pub otel_endpoint: Option<String>,

    /// Service name reported to the tracing backend
    pub otel_service_name: String,

    /// Comma-separated list of allowed CORS origins (development only)
    pub cors_origins: Option<String>,
}

redacted_debug!(Config {
    redact database_url,
    show bind_address,
    redact jwt_secret,
    show jwt_access_token_expiry_minutes,
    show jwt_refresh_token_expiry_days,
    show bcrypt_cost,
    show password_min_length,
    show reset_code_ttl_minutes,
    show reset_code_max_attempts,
    show comment_history_visibility,
    show comment_author_override,
    show admin_email,
    redact_option admin_password,
    show data_dir,
    show otel_endpoint,
    show otel_service_name,
    show cors_origins,
});

impl Config {
    /// Configuration with every optional setting at its default.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            bind_address: "0.0.0.0:8080".into(),
            jwt_secret: jwt_secret.into(),
            jwt_access_token_expiry_minutes: 30,
            jwt_refresh_token_expiry_days: 7,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            password_min_length: 12,
            reset_code_ttl_minutes: 10,
            reset_code_max_attempts: 5,
            comment_history_visibility: HistoryVisibility::SuperAdmin,
            comment_author_override: false,
            admin_email: "admin@localhost".into(),
            admin_password: None,
            data_dir: "/var/lib/pagekeeper".into(),
            otel_endpoint: None,
            otel_service_name: "pagekeeper".into(),
            cors_origins: None,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?;
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET not set".into()))?;
        let defaults = Self::new(database_url, jwt_secret);

        let comment_history_visibility = match env::var("COMMENT_HISTORY_VISIBILITY") {
            Ok(v) => HistoryVisibility::from_str(&v)
                .map_err(|_| AppError::Config(format!("Invalid COMMENT_HISTORY_VISIBILITY: {}", v)))?,
            Err(_) => defaults.comment_history_visibility,
        };

        let password_min_length = check_password_min_length(parse_or(
            "PASSWORD_MIN_LENGTH",
            defaults.password_min_length,
        ))?;

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            jwt_access_token_expiry_minutes: parse_or(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                defaults.jwt_access_token_expiry_minutes,
            ),
            jwt_refresh_token_expiry_days: parse_or(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                defaults.jwt_refresh_token_expiry_days,
            ),
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost),
            password_min_length,
            reset_code_ttl_minutes: parse_or("RESET_CODE_TTL_MINUTES", defaults.reset_code_ttl_minutes),
            reset_code_max_attempts: parse_or(
                "RESET_CODE_MAX_ATTEMPTS",
                defaults.reset_code_max_attempts,
            ),
            comment_history_visibility,
            comment_author_override: parse_or(
                "COMMENT_AUTHOR_OVERRIDE",
                defaults.comment_author_override,
            ),
            admin_email: env::var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty()),
            data_dir: env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            otel_service_name: env::var("OTEL_SERVICE_NAME").unwrap_or(defaults.otel_service_name),
            cors_origins: env::var("CORS_ORIGINS").ok(),
            ..defaults
        })
    }
}

/// Generated passwords and user-chosen ones must both be able to satisfy the
/// configured minimum.
fn check_password_min_length(length: usize) -> Result<usize> {
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
        return Err(AppError::Config(format!(
            "PASSWORD_MIN_LENGTH must be between {} and {}, got {}",
            MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH, length
        )));
    }
    Ok(length)
}

/// Read an env var and parse it, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
