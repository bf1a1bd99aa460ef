//! User administration and first-boot provisioning.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::user::{is_valid_email, normalize_email, Identity, NewUser, User};
use crate::services::auth_service::AuthService;
use crate::services::mailer::{welcome_email, Mailer};
use crate::services::metrics_service;
use crate::services::password_policy::{generate_password, validate_password};
use crate::store::UserStore;

/// Input for creating a user.
#[derive(Clone)]
pub struct CreateUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Generated when absent.
    pub password: Option<String>,
    pub is_super_admin: bool,
}

redacted_debug!(CreateUser {
    show email,
    show first_name,
    show last_name,
    redact_option password,
    show is_super_admin,
});

/// Outcome of a user creation. `generated_password` is set only when the
/// password was synthesized, and is handed back exactly once.
#[derive(Debug)]
pub struct CreatedUser {
    pub user: User,
    pub generated_password: Option<String>,
}

pub struct UserService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<Config>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, config: Arc<Config>) -> Self {
        Self {
            users,
            mailer,
            config,
        }
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let users = self.users.list().await?;
        metrics_service::set_user_gauge(users.len() as i64);
        Ok(users)
    }

    /// Fetch a user or fail with `NotFound`.
    pub async fn get(&self, id: uuid::Uuid) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Create a user. A generated password is mailed to the new user and
    /// returned to the caller.
    pub async fn create(&self, actor: &Identity, input: CreateUser) -> Result<CreatedUser> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AppError::Validation(format!("Invalid email address '{}'", email)));
        }

        let (password, generated) = match input.password {
            Some(password) => {
                validate_password(&password, self.config.password_min_length)?;
                (password, false)
            }
            None => (generate_password(self.config.password_min_length), true),
        };

        let user = self
            .users
            .create(NewUser {
                email,
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
                password_hash: AuthService::hash_password(&password, self.config.bcrypt_cost)?,
                is_super_admin: input.is_super_admin,
            })
            .await?;

        tracing::info!(
            user_id = %user.id,
            created_by = %actor.id,
            is_super_admin = user.is_super_admin,
            generated_password = generated,
            "User created"
        );

        if !generated {
            return Ok(CreatedUser {
                user,
                generated_password: None,
            });
        }

        if let Err(e) = self.mailer.send(welcome_email(&user.email, &password)).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to mail generated credential");
        }
        Ok(CreatedUser {
            user,
            generated_password: Some(password),
        })
    }

    /// Promote or demote a user. The last super admin cannot be demoted.
    pub async fn set_super_admin(&self, actor: &Identity, user_id: uuid::Uuid, is_super_admin: bool) -> Result<User> {
        let target = self.get(user_id).await?;
        if target.is_super_admin && !is_super_admin && self.users.count_super_admins().await? <= 1 {
            return Err(AppError::Conflict("Cannot demote the last super admin".into()));
        }

        let user = self
            .users
            .set_super_admin(user_id, is_super_admin)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        tracing::info!(
            user_id = %user_id,
            changed_by = %actor.id,
            is_super_admin,
            "Super admin flag changed"
        );
        Ok(user)
    }

    /// Make sure at least one super admin exists. Returns the generated
    /// password when one had to be synthesized.
    pub async fn provision_super_admin(&self) -> Result<Option<String>> {
        if self.users.count_super_admins().await? > 0 {
            return Ok(None);
        }

        let email = normalize_email(&self.config.admin_email);
        if let Some(existing) = self.users.find_by_email(&email).await? {
            self.users.set_super_admin(existing.id, true).await?;
            tracing::info!(user_id = %existing.id, "Existing user promoted to super admin");
            return Ok(None);
        }

        let (password, generated) = match &self.config.admin_password {
            Some(p) => (p.clone(), false),
            None => (generate_password(self.config.password_min_length.max(20)), true),
        };

        let user = self
            .users
            .create(NewUser {
                email,
                first_name: "Super".into(),
                last_name: "Admin".into(),
                password_hash: AuthService::hash_password(&password, self.config.bcrypt_cost)?,
                is_super_admin: true,
            })
            .await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Initial super admin created");

        if !generated {
            return Ok(None);
        }

        let password_file = Path::new(&self.config.data_dir).join("admin.password");
        match std::fs::write(&password_file, format!("{}\n", password)) {
            Ok(()) => tracing::info!(
                "Generated super admin password written to {}",
                password_file.display()
            ),
            Err(e) => {
                tracing::error!("Failed to write admin password file: {}", e);
                tracing::info!("Generated super admin password: {}", password);
            }
        }
        Ok(Some(password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mailer::LogMailer;
    use crate::store::memory::MemoryStore;

    fn service(store: Arc<MemoryStore>, data_dir: &str) -> UserService {
        let mut config = Config::new("postgres://unused", "secret");
        config.bcrypt_cost = 4;
        config.data_dir = data_dir.to_string();
        UserService::new(store, Arc::new(LogMailer), Arc::new(config))
    }

    fn admin() -> Identity {
        Identity {
            id: uuid::Uuid::new_v4(),
            email: "root@example.com".into(),
            first_name: "Root".into(),
            last_name: "User".into(),
            is_super_admin: true,
        }
    }

    fn input(email: &str, password: Option<&str>) -> CreateUser {
        CreateUser {
            email: email.into(),
            first_name: "Ana".into(),
            last_name: "Silva".into(),
            password: password.map(str::to_string),
            is_super_admin: false,
        }
    }

    #[tokio::test]
    async fn test_create_generates_password_when_missing() {
        let svc = service(Arc::new(MemoryStore::default()), "/tmp");
        let created = svc.create(&admin(), input("Ana@Example.com", None)).await.unwrap();
        let password = created.generated_password.unwrap();
        assert!(validate_password(&password, 12).is_ok());
        assert_eq!(created.user.email, "ana@example.com");
        assert!(AuthService::verify_password(&password, &created.user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_weak_password_and_bad_email() {
        let svc = service(Arc::new(MemoryStore::default()), "/tmp");
        let weak = svc.create(&admin(), input("a@example.com", Some("short"))).await;
        assert!(matches!(weak, Err(AppError::Validation(_))));
        let bad = svc.create(&admin(), input("not-an-email", None)).await;
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict() {
        let svc = service(Arc::new(MemoryStore::default()), "/tmp");
        svc.create(&admin(), input("a@example.com", None)).await.unwrap();
        let err = svc.create(&admin(), input("A@EXAMPLE.COM", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_last_super_admin_cannot_be_demoted() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone(), "/nonexistent-pagekeeper-dir");
        svc.provision_super_admin().await.unwrap();
        let root = svc.list().await.unwrap().remove(0);
        let err = svc.set_super_admin(&admin(), root.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone(), "/nonexistent-pagekeeper-dir");
        let first = svc.provision_super_admin().await.unwrap();
        assert!(first.is_some());
        assert!(svc.provision_super_admin().await.unwrap().is_none());
        assert_eq!(store.count_super_admins().await.unwrap(), 1);
    }
}
