//! Two-step password reset with emailed one-time codes.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::user::normalize_email;
use crate::services::auth_service::AuthService;
use crate::services::mailer::{reset_code_email, Mailer};
use crate::services::password_policy::validate_password;
use crate::store::{SessionStore, UserStore};

const INVALID_CODE: &str = "Invalid or expired reset code";

pub struct PasswordResetService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl PasswordResetService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        mailer: Arc<dyn Mailer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            users,
            sessions,
            mailer,
            config,
        }
    }

    /// Issue a code to `email` if it belongs to an active user. The result is
    /// the same whether or not the address is known.
    pub async fn request_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(user) = self
            .users
            .find_by_email(&email)
            .await?
            .filter(|u| u.is_active)
        else {
            tracing::debug!(email = %email, "Reset requested for unknown or inactive account");
            return Ok(());
        };

        let code = generate_code();
        let expires_at = Utc::now() + Duration::minutes(self.config.reset_code_ttl_minutes);
        self.sessions
            .put_reset_code(user.id, &hash_code(&code), expires_at)
            .await?;

        let message = reset_code_email(&user.email, &code, self.config.reset_code_ttl_minutes);
        if let Err(e) = self.mailer.send(message).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to deliver reset code");
        } else {
            tracing::info!(user_id = %user.id, "Password reset code issued");
        }
        Ok(())
    }

    /// Check the code and, on success, replace the password, consume the code
    /// and end every session of the user.
    pub async fn verify_reset(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        validate_password(new_password, self.config.password_min_length)?;

        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(invalid_code)?;

        let now = Utc::now();
        let pending = self
            .sessions
            .find_reset_code(user.id)
            .await?
            .filter(|c| c.is_pending(now))
            .ok_or_else(invalid_code)?;

        if pending.attempts >= self.config.reset_code_max_attempts {
            tracing::warn!(user_id = %user.id, "Reset code locked after too many attempts");
            return Err(AppError::Validation(
                "Too many attempts; request a new reset code".into(),
            ));
        }

        if hash_code(code.trim()) != pending.code_hash {
            let attempts = self.sessions.record_failed_reset_attempt(pending.id).await?;
            tracing::info!(user_id = %user.id, attempts, "Reset code mismatch");
            return Err(invalid_code());
        }

        let password_hash = AuthService::hash_password(new_password, self.config.bcrypt_cost)?;
        if !self
            .sessions
            .redeem_reset_code(pending.id, user.id, &password_hash, now)
            .await?
        {
            return Err(invalid_code());
        }

        tracing::info!(user_id = %user.id, "Password reset completed");
        Ok(())
    }
}

fn invalid_code() -> AppError {
    AppError::Validation(INVALID_CODE.into())
}

/// Six decimal digits, zero-padded.
fn generate_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}

fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}
