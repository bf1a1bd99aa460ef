//! In-memory backend.
//!
//! Each concern lives behind its own `RwLock`. A comment and its history share
//! one lock so a mutation and its history row land together. Reset-code
//! redemption takes the session lock before the user lock; nothing takes them
//! in the opposite order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CommentStore, NewComment, PermissionStore, SessionStore, UserStore};
use crate::error::{AppError, Result};
use crate::models::comment::{Comment, CommentHistory, HistoryAction};
use crate::models::permission::{Action, GrantSet, PageKey, PermissionGrant};
use crate::models::session::{PasswordResetCode, RefreshSession};
use crate::models::user::{NewUser, User};

#[derive(Default)]
struct CommentState {
    comments: HashMap<Uuid, Comment>,
    /// Per comment, oldest first.
    history: HashMap<Uuid, Vec<CommentHistory>>,
}

#[derive(Default)]
struct SessionState {
    refresh: HashMap<Uuid, RefreshSession>,
    reset_codes: HashMap<Uuid, PasswordResetCode>,
}

/// Process-local store implementing every store trait.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    grants: RwLock<HashMap<Uuid, BTreeMap<(PageKey, Action), DateTime<Utc>>>>,
    comments: RwLock<CommentState>,
    sessions: RwLock<SessionState>,
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                user.email
            )));
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            is_super_admin: user.is_super_admin,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(first) = first_name {
            user.first_name = first.to_string();
        }
        if let Some(last) = last_name {
            user.last_name = last.to_string();
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_super_admin(&self, id: Uuid, is_super_admin: bool) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.is_super_admin = is_super_admin;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn count_super_admins(&self) -> Result<i64> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| u.is_super_admin).count() as i64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<()> {
        let mut grants = self.grants.write().await;
        grants
            .entry(user_id)
            .or_default()
            .entry((page, action))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<()> {
        self.grants.write().await.remove(&user_id);
        Ok(())
    }

    async fn replace_for_user(&self, user_id: Uuid, new_grants: &GrantSet) -> Result<()> {
        let now = Utc::now();
        let replacement: BTreeMap<(PageKey, Action), DateTime<Utc>> =
            new_grants.iter().map(|g| (*g, now)).collect();

        let mut grants = self.grants.write().await;
        if replacement.is_empty() {
            grants.remove(&user_id);
        } else {
            grants.insert(user_id, replacement);
        }
        Ok(())
    }

    async fn has_grant(&self, user_id: Uuid, page: PageKey, action: Action) -> Result<bool> {
        let grants = self.grants.read().await;
        Ok(grants
            .get(&user_id)
            .is_some_and(|set| set.contains_key(&(page, action))))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<GrantSet> {
        let grants = self.grants.read().await;
        Ok(grants
            .get(&user_id)
            .map(|set| set.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn list_for_user_page(&self, user_id: Uuid, page: PageKey) -> Result<BTreeSet<Action>> {
        let grants = self.grants.read().await;
        Ok(grants
            .get(&user_id)
            .map(|set| {
                set.keys()
                    .filter(|(p, _)| *p == page)
                    .map(|(_, a)| *a)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_all(&self) -> Result<Vec<PermissionGrant>> {
        let grants = self.grants.read().await;
        let mut all: Vec<PermissionGrant> = grants
            .iter()
            .flat_map(|(user_id, set)| {
                set.iter().map(move |((page_key, action), created_at)| PermissionGrant {
                    user_id: *user_id,
                    page_key: *page_key,
                    action: *action,
                    created_at: *created_at,
                })
            })
            .collect();
        all.sort_by_key(|g| (g.user_id, g.page_key, g.action));
        Ok(all)
    }
}

impl CommentState {
    fn append_history(
        &mut self,
        comment_id: Uuid,
        previous_content: Option<String>,
        action: HistoryAction,
        modified_by: Uuid,
        modified_at: DateTime<Utc>,
    ) {
        self.history
            .entry(comment_id)
            .or_default()
            .push(CommentHistory {
                id: Uuid::new_v4(),
                comment_id,
                previous_content,
                action,
                modified_by,
                modified_at,
            });
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert(&self, comment: NewComment, at: DateTime<Utc>) -> Result<Comment> {
        let created = Comment {
            id: Uuid::new_v4(),
            page_key: comment.page_key,
            content: comment.content,
            author_id: comment.author_id,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        };

        let mut state = self.comments.write().await;
        state.append_history(created.id, None, HistoryAction::Created, created.author_id, at);
        state.comments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Comment>> {
        let state = self.comments.read().await;
        Ok(state.comments.get(&id).filter(|c| !c.is_deleted()).cloned())
    }

    async fn find_any(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.read().await.comments.get(&id).cloned())
    }

    async fn list_for_page(&self, page: PageKey) -> Result<Vec<Comment>> {
        let state = self.comments.read().await;
        let mut comments: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| c.page_key == page && !c.is_deleted())
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn update(
        &self,
        id: Uuid,
        content: &str,
        editor: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Comment>> {
        let mut state = self.comments.write().await;
        let previous = match state.comments.get(&id) {
            Some(c) if !c.is_deleted() => c.content.clone(),
            _ => return Ok(None),
        };

        state.append_history(id, Some(previous), HistoryAction::Updated, editor, at);
        let comment = state
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal("comment vanished under write lock".into()))?;
        comment.content = content.to_string();
        comment.updated_at = at;
        Ok(Some(comment.clone()))
    }

    async fn delete(&self, id: Uuid, actor: Uuid, at: DateTime<Utc>) -> Result<Option<Comment>> {
        let mut state = self.comments.write().await;
        let previous = match state.comments.get(&id) {
            Some(c) if !c.is_deleted() => c.content.clone(),
            _ => return Ok(None),
        };

        state.append_history(id, Some(previous), HistoryAction::Deleted, actor, at);
        let comment = state
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal("comment vanished under write lock".into()))?;
        comment.deleted_at = Some(at);
        Ok(Some(comment.clone()))
    }

    async fn history(&self, comment_id: Uuid) -> Result<Vec<CommentHistory>> {
        let state = self.comments.read().await;
        Ok(state
            .history
            .get(&comment_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_refresh_session(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshSession> {
        let session = RefreshSession {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            expires_at,
            revoked_at: None,
        };
        self.sessions
            .write()
            .await
            .refresh
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_refresh_session(&self, id: Uuid) -> Result<Option<RefreshSession>> {
        Ok(self.sessions.read().await.refresh.get(&id).cloned())
    }

    async fn revoke_refresh_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.refresh.get_mut(&id) {
            session.revoked_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        for session in sessions.refresh.values_mut().filter(|s| s.user_id == user_id) {
            session.revoked_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn put_reset_code(
        &self,
        user_id: Uuid,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<PasswordResetCode> {
        let code = PasswordResetCode {
            id: Uuid::new_v4(),
            user_id,
            code_hash: code_hash.to_string(),
            created_at: Utc::now(),
            expires_at,
            attempts: 0,
            used_at: None,
        };
        let mut sessions = self.sessions.write().await;
        sessions
            .reset_codes
            .retain(|_, c| c.user_id != user_id || c.used_at.is_some());
        sessions.reset_codes.insert(code.id, code.clone());
        Ok(code)
    }

    async fn find_reset_code(&self, user_id: Uuid) -> Result<Option<PasswordResetCode>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .reset_codes
            .values()
            .find(|c| c.user_id == user_id && c.used_at.is_none())
            .cloned())
    }

    async fn record_failed_reset_attempt(&self, code_id: Uuid) -> Result<i32> {
        let mut sessions = self.sessions.write().await;
        let code = sessions
            .reset_codes
            .get_mut(&code_id)
            .ok_or_else(|| AppError::NotFound("Reset code not found".into()))?;
        code.attempts += 1;
        Ok(code.attempts)
    }

    async fn redeem_reset_code(
        &self,
        code_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let mut users = self.users.write().await;

        match sessions.reset_codes.get(&code_id) {
            Some(code) if code.user_id == user_id && code.used_at.is_none() => {}
            _ => return Ok(false),
        }
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };

        user.password_hash = password_hash.to_string();
        user.updated_at = at;
        if let Some(code) = sessions.reset_codes.get_mut(&code_id) {
            code.used_at = Some(at);
        }
        for session in sessions
            .refresh
            .values_mut()
            .filter(|s| s.user_id == user_id)
        {
            session.revoked_at.get_or_insert(at);
        }
        Ok(true)
    }
}
