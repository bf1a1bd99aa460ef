//! Session and identity provider.
//!
//! Access tokens are short-lived HS256 JWTs. Refresh tokens are HS256 JWTs
//! carrying the id of a server-side refresh session, so logout and password
//! resets can revoke them. The identity behind a token is reloaded from the
//! user store on every resolution.

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::user::{normalize_email, Identity, User};
use crate::services::metrics_service;
use crate::store::{SessionStore, UserStore};

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";
const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_TOKEN: &str = "Invalid or expired token";

/// Longest first or last name accepted on profile update.
pub const MAX_NAME_LENGTH: usize = 150;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub email: String,
    pub is_super_admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub token_type: String,
    /// Refresh session id (refresh tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
}

/// Token pair response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Fresh access token issued by a refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    config: Arc<Config>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>, config: Arc<Config>) -> Self {
        let secret = config.jwt_secret.clone();
        Self {
            users,
            sessions,
            config,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Authenticate with email and password. Unknown email, wrong password and
    /// inactive account are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<(Identity, TokenPair)> {
        let email = normalize_email(email);
        let user = match self.users.find_by_email(&email).await? {
            Some(user) if user.is_active => user,
            _ => {
                metrics_service::record_login(false);
                tracing::info!(email = %email, "Login rejected");
                return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
            }
        };

        if !Self::verify_password(password, &user.password_hash)? {
            metrics_service::record_login(false);
            tracing::info!(user_id = %user.id, "Login rejected");
            return Err(AppError::Unauthenticated(INVALID_CREDENTIALS.into()));
        }

        let tokens = self.generate_tokens(&user).await?;
        metrics_service::record_login(true);
        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok((user.identity(), tokens))
    }

    /// Open a refresh session and sign an access/refresh pair for it.
    pub async fn generate_tokens(&self, user: &User) -> Result<TokenPair> {
        let now = Utc::now();
        let refresh_exp = now + Duration::days(self.config.jwt_refresh_token_expiry_days);
        let session = self
            .sessions
            .create_refresh_session(user.id, refresh_exp)
            .await?;

        let refresh_claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            is_super_admin: user.is_super_admin,
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            token_type: REFRESH.to_string(),
            sid: Some(session.id),
        };
        let refresh_token = self.sign(&refresh_claims)?;
        let access = self.access_token(user)?;

        Ok(TokenPair {
            access_token: access.access_token,
            refresh_token,
            expires_in: access.expires_in,
        })
    }

    fn access_token(&self, user: &User) -> Result<AccessToken> {
        let now = Utc::now();
        let access_exp = now + Duration::minutes(self.config.jwt_access_token_expiry_minutes);
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            is_super_admin: user.is_super_admin,
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            token_type: ACCESS.to_string(),
            sid: None,
        };
        Ok(AccessToken {
            access_token: self.sign(&claims)?,
            expires_in: (self.config.jwt_access_token_expiry_minutes.max(0) * 60) as u64,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Issue a new access token from a live refresh session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        let claims = self.decode_token(refresh_token, REFRESH)?;
        let sid = claims
            .sid
            .ok_or_else(|| AppError::Unauthenticated(INVALID_TOKEN.into()))?;

        let session = self
            .sessions
            .find_refresh_session(sid)
            .await?
            .filter(|s| s.user_id == claims.sub && s.is_usable(Utc::now()))
            .ok_or_else(|| AppError::Unauthenticated("Session has ended".into()))?;

        let user = self.active_user(session.user_id).await?;
        self.access_token(&user)
    }

    /// Resolve an access token to the caller's current identity.
    pub async fn current_identity(&self, access_token: &str) -> Result<Identity> {
        let claims = self.decode_token(access_token, ACCESS)?;
        Ok(self.active_user(claims.sub).await?.identity())
    }

    /// Revoke the refresh session behind `refresh_token`.
    pub async fn invalidate(&self, refresh_token: &str) -> Result<()> {
        let claims = self.decode_token(refresh_token, REFRESH)?;
        if let Some(sid) = claims.sid {
            self.sessions.revoke_refresh_session(sid, Utc::now()).await?;
            tracing::info!(user_id = %claims.sub, session_id = %sid, "Session invalidated");
        }
        Ok(())
    }

    pub async fn get_profile(&self, identity: &Identity) -> Result<User> {
        self.users
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn update_profile(
        &self,
        identity: &Identity,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User> {
        let first_name = first_name.map(|n| validate_name("first_name", n)).transpose()?;
        let last_name = last_name.map(|n| validate_name("last_name", n)).transpose()?;

        self.users
            .update_profile(identity.id, first_name, last_name)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn active_user(&self, id: Uuid) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthenticated("User not found or inactive".into()))
    }

    fn decode_token(&self, token: &str, expected_type: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::Unauthenticated(INVALID_TOKEN.into())
            })?;
        if data.claims.token_type != expected_type {
            return Err(AppError::Unauthenticated("Invalid token type".into()));
        }
        Ok(data.claims)
    }

    /// Hash a password
    pub fn hash_password(password: &str, cost: u32) -> Result<String> {
        hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }
}

fn validate_name<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "{} exceeds {} characters",
            field, MAX_NAME_LENGTH
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::NewUser;
    use crate::store::memory::MemoryStore;

    const PASSWORD: &str = "Correct-Horse-9";

    async fn setup() -> (AuthService, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::default());
        let mut config = Config::new("postgres://unused", "test-secret");
        config.bcrypt_cost = 4;
        let service = AuthService::new(store.clone(), store.clone(), Arc::new(config));
        let user = store
            .create(NewUser {
                email: "lee@example.com".into(),
                first_name: "Lee".into(),
                last_name: "Park".into(),
                password_hash: AuthService::hash_password(PASSWORD, 4).unwrap(),
                is_super_admin: false,
            })
            .await
            .unwrap();
        (service, store, user)
    }

    #[test]
    fn test_password_hashing() {
        let hash = AuthService::hash_password("test_password_123", 4).unwrap();
        assert!(AuthService::verify_password("test_password_123", &hash).unwrap());
        assert!(!AuthService::verify_password("wrong_password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_normalizes_email() {
        let (service, _, user) = setup().await;
        let (identity, tokens) = service.authenticate(" LEE@example.com ", PASSWORD).await.unwrap();
        assert_eq!(identity.id, user.id);
        assert_eq!(tokens.expires_in, 30 * 60);
    }

    #[tokio::test]
    async fn test_authenticate_failures_share_a_message() {
        let (service, _, _) = setup().await;
        let wrong_password = service.authenticate("lee@example.com", "nope").await.unwrap_err();
        let unknown_email = service.authenticate("ghost@example.com", PASSWORD).await.unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert!(matches!(wrong_password, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_token_types_are_not_interchangeable() {
        let (service, _, _) = setup().await;
        let (_, tokens) = service.authenticate("lee@example.com", PASSWORD).await.unwrap();
        assert!(service.current_identity(&tokens.refresh_token).await.is_err());
        assert!(service.refresh(&tokens.access_token).await.is_err());
        assert!(service.current_identity(&tokens.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_fails_after_invalidate() {
        let (service, _, _) = setup().await;
        let (_, tokens) = service.authenticate("lee@example.com", PASSWORD).await.unwrap();

        let fresh = service.refresh(&tokens.refresh_token).await.unwrap();
        assert!(service.current_identity(&fresh.access_token).await.is_ok());

        service.invalidate(&tokens.refresh_token).await.unwrap();
        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_identity_reflects_promotion() {
        let (service, store, user) = setup().await;
        let (_, tokens) = service.authenticate("lee@example.com", PASSWORD).await.unwrap();
        store.set_super_admin(user.id, true).await.unwrap();
        let identity = service.current_identity(&tokens.access_token).await.unwrap();
        assert!(identity.is_super_admin);
    }

    #[tokio::test]
    async fn test_update_profile_validates_names() {
        let (service, _, user) = setup().await;
        let identity = user.identity();
        let err = service
            .update_profile(&identity, Some("   "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let updated = service
            .update_profile(&identity, None, Some(" Kim "))
            .await
            .unwrap();
        assert_eq!(updated.first_name, "Lee");
        assert_eq!(updated.last_name, "Kim");
    }
}
