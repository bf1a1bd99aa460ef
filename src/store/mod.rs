//! Persistence backends.
//!
//! Each concern sits behind its own trait so services never see which
//! backend is in use. [`PgStore`](postgres::PgStore) is the backend of record;
//! [`MemoryStore`](memory::MemoryStore) backs tests and local development.
//! Both apply multi-row mutations (grant replacement, comment mutation plus
//! its history row, reset-code redemption) as one atomic unit.

pub mod memory;
pub mod postgres;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::comment::{Comment, CommentHistory};
use crate::models::permission::{Action, GrantSet, PageKey, PermissionGrant};
use crate::models::session::{PasswordResetCode, RefreshSession};
use crate::models::user::{NewUser, User};

/// User accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `Conflict` when the email is taken.
    async fn create(&self, user: NewUser) -> Result<User>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Look up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// All users, oldest first.
    async fn list(&self) -> Result<Vec<User>>;

    /// Update whichever name fields are given. `None` when the user is unknown.
    async fn update_profile(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Option<User>>;

    async fn set_super_admin(&self, id: Uuid, is_super_admin: bool) -> Result<Option<User>>;

    async fn count_super_admins(&self) -> Result<i64>;

    /// Cheap round trip to the backend.
    async fn ping(&self) -> Result<()>;
}

/// Page grants as `(user, page, action)` tuples.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Idempotent insert.
    async fn grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<()>;

    async fn revoke_all(&self, user_id: Uuid) -> Result<()>;

    /// Swap the user's whole grant set. Readers see the old set or the new
    /// set, never a mix, and concurrent replacements apply one after the
    /// other. The Postgres backend reports an unknown user as `NotFound`.
    async fn replace_for_user(&self, user_id: Uuid, grants: &GrantSet) -> Result<()>;

    async fn has_grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<bool>;

    /// Empty for unknown users.
    async fn list_for_user(&self, user_id: Uuid) -> Result<GrantSet>;

    async fn list_for_user_page(&self, user_id: Uuid, page: PageKey) -> Result<BTreeSet<Action>>;

    async fn list_all(&self) -> Result<Vec<PermissionGrant>>;
}

/// Fields needed to insert a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub page_key: PageKey,
    pub content: String,
    pub author_id: Uuid,
}

/// Current comment state plus its append-only history.
///
/// Every mutating call writes exactly one history row in the same atomic unit
/// as the content change. `update` and `delete` return `None` when the comment
/// does not exist or is already deleted.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Insert a comment together with its `created` history row.
    async fn insert(&self, comment: NewComment, at: DateTime<Utc>) -> Result<Comment>;

    /// Active comment by id.
    async fn find(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Comment by id, including deleted ones.
    async fn find_any(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Active comments on a page, newest first.
    async fn list_for_page(&self, page: PageKey) -> Result<Vec<Comment>>;

    async fn update(
        &self,
        id: Uuid,
        content: &str,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>>;

    async fn delete(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> Result<Option<Comment>>;

    /// History entries, newest first.
    async fn history(&self, comment_id: Uuid) -> Result<Vec<CommentHistory>>;
}

/// Refresh sessions and password reset codes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_refresh_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshSession>;

    async fn find_refresh_session(&self, id: Uuid) -> Result<Option<RefreshSession>>;

    async fn revoke_refresh_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Store a new code, discarding any code still pending for the user.
    async fn put_reset_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetCode>;

    /// The user's unused code, if any. Expiry is left to the caller.
    async fn find_reset_code(&self, user_id: Uuid) -> Result<Option<PasswordResetCode>>;

    /// Count a failed verification. Returns the new attempt count.
    async fn record_failed_reset_attempt(&self, code_id: Uuid) -> Result<i32>;

    /// Consume the code, set the new password hash and revoke every refresh
    /// session of the user in one unit. `false` when the code was already used.
    async fn redeem_reset_code(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// The full set of stores handed to services.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub comments: Arc<dyn CommentStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(postgres::PgStore::new(pool));
        Self {
            users: store.clone(),
            permissions: store.clone(),
            comments: store.clone(),
            sessions: store,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            users: store.clone(),
            permissions: store.clone(),
            comments: store.clone(),
            sessions: store,
        }
    }
}
