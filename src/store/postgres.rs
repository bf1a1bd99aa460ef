//! Postgres backend.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CommentStore, NewComment, PermissionStore, SessionStore, UserStore};
use crate::error::{AppError, Result};
use crate::models::comment::{Comment, CommentHistory, HistoryAction};
use crate::models::permission::{Action, GrantSet, PageKey, PermissionGrant};
use crate::models::session::{PasswordResetCode, RefreshSession};
use crate::models::user::{NewUser, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, is_super_admin, \
                            is_active, created_at, updated_at";
const COMMENT_COLUMNS: &str =
    "id, page_key, content, author_id, created_at, updated_at, deleted_at";

/// Store backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            "INSERT INTO users (id, email, first_name, last_name, password_hash, is_super_admin) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.is_super_admin)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(format!("Email '{}' is already registered", user.email))
                } else {
                    AppError::Database(e)
                }
            })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, id");
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(first_name)
            .bind(last_name)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn set_super_admin(&self, id: Uuid, is_super_admin: bool) -> Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET is_super_admin = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(is_super_admin)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn count_super_admins(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_super_admin")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, page_key, action)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, page_key, action) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(page)
        .bind(action)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn replace_for_user(&self, user_id: Uuid, grants: &GrantSet) -> Result<()> {
        let mut tx = self.db.begin().await?;

        // Concurrent replacements for one user serialize on this row lock.
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (page, action) in grants {
            sqlx::query(
                r#"
                INSERT INTO user_permissions (user_id, page_key, action)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(user_id)
            .bind(page)
            .bind(action)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn has_grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_permissions
                WHERE user_id = $1 AND page_key = $2 AND action = $3
            )
            "#,
        )
        .bind(user_id)
        .bind(page)
        .bind(action)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<GrantSet> {
        let rows: Vec<(PageKey, Action)> = sqlx::query_as(
            "SELECT page_key, action FROM user_permissions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn list_for_user_page(&self, user_id: Uuid, page: PageKey) -> Result<BTreeSet<Action>> {
        let rows: Vec<Action> = sqlx::query_scalar(
            "SELECT action FROM user_permissions WHERE user_id = $1 AND page_key = $2",
        )
        .bind(user_id)
        .bind(page)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn list_all(&self) -> Result<Vec<PermissionGrant>> {
        let grants = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT user_id, page_key, action, created_at
            FROM user_permissions
            ORDER BY user_id, page_key, action
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(grants)
    }
}

#[async_trait]
impl CommentStore for PgStore {
    async fn insert(&self, comment: NewComment, at: DateTime<Utc>) -> Result<Comment> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            "INSERT INTO comments (id, page_key, content, author_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {COMMENT_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Comment>(&sql)
            .bind(Uuid::new_v4())
            .bind(comment.page_key)
            .bind(&comment.content)
            .bind(comment.author_id)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        insert_history(&mut tx, created.id, None, HistoryAction::Created, created.author_id, at)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND deleted_at IS NULL");
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(comment)
    }

    async fn find_any(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(comment)
    }

    async fn list_for_page(&self, page: PageKey) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE page_key = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(page)
            .fetch_all(&self.db)
            .await?;
        Ok(comments)
    }

    async fn update(
        &self,
        id: Uuid,
        content: &str,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>> {
        let mut tx = self.db.begin().await?;

        let Some(previous) = lock_active_content(&mut tx, id).await? else {
            return Ok(None);
        };

        insert_history(&mut tx, id, Some(&previous), HistoryAction::Updated, editor, at).await?;

        let sql = format!(
            "UPDATE comments SET content = $2, updated_at = $3 WHERE id = $1 \
             RETURNING {COMMENT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(content)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> Result<Option<Comment>> {
        let mut tx = self.db.begin().await?;

        let Some(previous) = lock_active_content(&mut tx, id).await? else {
            return Ok(None);
        };

        insert_history(&mut tx, id, Some(&previous), HistoryAction::Deleted, actor, at).await?;

        let sql = format!(
            "UPDATE comments SET deleted_at = $2 WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        );
        let deleted = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(deleted))
    }

    async fn history(&self, comment_id: Uuid) -> Result<Vec<CommentHistory>> {
        let entries = sqlx::query_as::<_, CommentHistory>(
            r#"
            SELECT id, comment_id, previous_content, action, modified_by, modified_at
            FROM comment_history
            WHERE comment_id = $1
            ORDER BY modified_at DESC, seq DESC
            "#,
        )
        .bind(comment_id)
        .fetch_all(&self.db)
        .await?;
        Ok(entries)
    }
}

/// Row-lock an active comment and return its current content.
async fn lock_active_content(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<String>> {
    let content: Option<String> = sqlx::query_scalar(
        "SELECT content FROM comments WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(content)
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    comment_id: Uuid,
    previous_content: Option<&str>,
    action: HistoryAction,
    modified_by: Uuid,
    modified_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO comment_history (id, comment_id, previous_content, action, modified_by, modified_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(comment_id)
    .bind(previous_content)
    .bind(action)
    .bind(modified_by)
    .bind(modified_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

const SESSION_COLUMNS: &str = "id, user_id, created_at, expires_at, revoked_at";
const RESET_CODE_COLUMNS: &str =
    "id, user_id, code_hash, created_at, expires_at, attempts, used_at";

#[async_trait]
impl SessionStore for PgStore {
    async fn create_refresh_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshSession> {
        let sql = format!(
            "INSERT INTO refresh_sessions (id, user_id, expires_at) VALUES ($1, $2, $3) \
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, RefreshSession>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(expires_at)
            .fetch_one(&self.db)
            .await?;
        Ok(session)
    }

    async fn find_refresh_session(&self, id: Uuid) -> Result<Option<RefreshSession>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM refresh_sessions WHERE id = $1");
        let session = sqlx::query_as::<_, RefreshSession>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(session)
    }

    async fn revoke_refresh_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn put_reset_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetCode> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM password_reset_codes WHERE user_id = $1 AND used_at IS NULL")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO password_reset_codes (id, user_id, code_hash, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING {RESET_CODE_COLUMNS}"
        );
        let code = sqlx::query_as::<_, PasswordResetCode>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(code_hash)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(code)
    }

    async fn find_reset_code(&self, user_id: Uuid) -> Result<Option<PasswordResetCode>> {
        let sql = format!(
            "SELECT {RESET_CODE_COLUMNS} FROM password_reset_codes \
             WHERE user_id = $1 AND used_at IS NULL"
        );
        let code = sqlx::query_as::<_, PasswordResetCode>(&sql)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(code)
    }

    async fn record_failed_reset_attempt(&self, code_id: Uuid) -> Result<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE password_reset_codes SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(code_id)
        .fetch_optional(&self.db)
        .await?;
        attempts.ok_or_else(|| AppError::NotFound("Reset code not found".into()))
    }

    async fn redeem_reset_code(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        let consumed = sqlx::query(
            "UPDATE password_reset_codes SET used_at = $3 \
             WHERE id = $1 AND user_id = $2 AND used_at IS NULL",
        )
        .bind(code_id)
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if consumed.rows_affected() == 0 {
            return Ok(false);
        }

        let updated = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE refresh_sessions SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
