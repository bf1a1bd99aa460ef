//! Comment and history engine.
//!
//! Every mutation goes through the resolver first and then through the
//! comment store, which writes the history row in the same atomic unit as
//! the content change.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::comment::{Comment, CommentHistory, HistoryAction, HistoryVisibility};
use crate::models::permission::{Action, PageKey};
use crate::models::user::{Identity, User};
use crate::services::authz_service::{AuthorizationResolver, Decision};
use crate::services::metrics_service;
use crate::store::{CommentStore, NewComment, UserStore};

/// Upper bound on comment length, in characters.
pub const MAX_COMMENT_LENGTH: usize = 10_000;

/// Authority rules for comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentPolicy {
    pub history_visibility: HistoryVisibility,
    /// Authors may edit/delete their own comments without a page grant.
    pub author_override: bool,
}

impl Default for CommentPolicy {
    fn default() -> Self {
        Self {
            history_visibility: HistoryVisibility::SuperAdmin,
            author_override: false,
        }
    }
}

impl From<&Config> for CommentPolicy {
    fn from(config: &Config) -> Self {
        Self {
            history_visibility: config.comment_history_visibility,
            author_override: config.comment_author_override,
        }
    }
}

/// Active comment as listed for a page, with the caller's rights on it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    pub id: Uuid,
    pub page_key: PageKey,
    pub content: String,
    pub author_id: Uuid,
    pub author_email: Option<String>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// History entry annotated with who made the change.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryView {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub previous_content: Option<String>,
    pub action: HistoryAction,
    pub modified_by: Uuid,
    pub modified_by_email: Option<String>,
    pub modified_by_name: Option<String>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentStore>,
    users: Arc<dyn UserStore>,
    resolver: AuthorizationResolver,
    policy: CommentPolicy,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        users: Arc<dyn UserStore>,
        resolver: AuthorizationResolver,
        policy: CommentPolicy,
    ) -> Self {
        Self {
            comments,
            users,
            resolver,
            policy,
        }
    }

    /// Create a comment. Requires `create` on the page.
    pub async fn create(&self, identity: &Identity, page: PageKey, content: &str) -> Result<Comment> {
        self.resolver.require(identity, page, Action::Create).await?;
        let content = validate_content(content)?;

        let comment = self
            .comments
            .insert(
                NewComment {
                    page_key: page,
                    content,
                    author_id: identity.id,
                },
                Utc::now(),
            )
            .await?;

        metrics_service::record_comment_mutation(page, HistoryAction::Created);
        tracing::info!(comment_id = %comment.id, page = %page, author = %identity.id, "Comment created");
        Ok(comment)
    }

    /// Replace a comment's content. Requires `edit` on the comment's page.
    pub async fn update(&self, identity: &Identity, comment_id: Uuid, content: &str) -> Result<Comment> {
        let existing = self.active_comment(comment_id).await?;
        self.require_on_comment(identity, &existing, Action::Edit).await?;
        let content = validate_content(content)?;

        let updated = self
            .comments
            .update(comment_id, &content, identity.id, Utc::now())
            .await?
            .ok_or_else(|| comment_not_found(comment_id))?;

        metrics_service::record_comment_mutation(updated.page_key, HistoryAction::Updated);
        tracing::info!(comment_id = %comment_id, editor = %identity.id, "Comment updated");
        Ok(updated)
    }

    /// Delete a comment. Requires `delete` on the comment's page. History is kept.
    pub async fn delete(&self, identity: &Identity, comment_id: Uuid) -> Result<()> {
        let existing = self.active_comment(comment_id).await?;
        self.require_on_comment(identity, &existing, Action::Delete).await?;

        self.comments
            .delete(comment_id, identity.id, Utc::now())
            .await?
            .ok_or_else(|| comment_not_found(comment_id))?;

        metrics_service::record_comment_mutation(existing.page_key, HistoryAction::Deleted);
        tracing::info!(comment_id = %comment_id, actor = %identity.id, "Comment deleted");
        Ok(())
    }

    /// History of a comment, newest first. Available after deletion.
    pub async fn history(&self, identity: &Identity, comment_id: Uuid) -> Result<Vec<HistoryEntryView>> {
        let comment = self
            .comments
            .find_any(comment_id)
            .await?
            .ok_or_else(|| comment_not_found(comment_id))?;

        match self.policy.history_visibility {
            HistoryVisibility::SuperAdmin if !identity.is_super_admin => {
                return Err(AppError::Forbidden(
                    "Comment history is restricted to super admins".into(),
                ));
            }
            HistoryVisibility::SuperAdmin => {}
            HistoryVisibility::PageViewers => {
                self.resolver
                    .require(identity, comment.page_key, Action::View)
                    .await?;
            }
        }

        let entries = self.comments.history(comment_id).await?;
        let mut names = NameCache::new(self.users.clone());
        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            let (email, name) = names.lookup(entry.modified_by).await?;
            views.push(history_view(entry, email, name));
        }
        Ok(views)
    }

    /// Active comments on a page, newest first. Requires `view` on the page.
    pub async fn list(&self, identity: &Identity, page: PageKey) -> Result<Vec<CommentView>> {
        self.resolver.require(identity, page, Action::View).await?;

        let actions = self.resolver.authorize_bulk(identity, page).await?;
        let comments = self.comments.list_for_page(page).await?;

        let mut names = NameCache::new(self.users.clone());
        let mut views = Vec::with_capacity(comments.len());
        for comment in comments {
            let owns = self.policy.author_override && comment.author_id == identity.id;
            let (author_email, author_name) = names.lookup(comment.author_id).await?;
            views.push(CommentView {
                id: comment.id,
                page_key: comment.page_key,
                content: comment.content,
                author_id: comment.author_id,
                author_email,
                author_name,
                created_at: comment.created_at,
                updated_at: comment.updated_at,
                can_edit: owns || actions.contains(&Action::Edit),
                can_delete: owns || actions.contains(&Action::Delete),
            });
        }
        Ok(views)
    }

    async fn active_comment(&self, comment_id: Uuid) -> Result<Comment> {
        self.comments
            .find(comment_id)
            .await?
            .ok_or_else(|| comment_not_found(comment_id))
    }

    async fn require_on_comment(&self, identity: &Identity, comment: &Comment, action: Action) -> Result<()> {
        if self.policy.author_override && comment.author_id == identity.id {
            return Ok(());
        }
        match self.resolver.authorize(identity, comment.page_key, action).await? {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AppError::Forbidden(format!(
                "'{}' permission on page '{}' is required",
                action, comment.page_key
            ))),
        }
    }
}

fn validate_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Comment content cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_COMMENT_LENGTH {
        return Err(AppError::Validation(format!(
            "Comment content exceeds {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

fn comment_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Comment {} not found", id))
}

fn history_view(entry: CommentHistory, email: Option<String>, name: Option<String>) -> HistoryEntryView {
    HistoryEntryView {
        id: entry.id,
        comment_id: entry.comment_id,
        previous_content: entry.previous_content,
        action: entry.action,
        modified_by: entry.modified_by,
        modified_by_email: email,
        modified_by_name: name,
        modified_at: entry.modified_at,
    }
}

/// Per-request memo of user display data.
struct NameCache {
    users: Arc<dyn UserStore>,
    seen: HashMap<Uuid, Option<User>>,
}

impl NameCache {
    fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            seen: HashMap::new(),
        }
    }

    async fn lookup(&mut self, id: Uuid) -> Result<(Option<String>, Option<String>)> {
        if !self.seen.contains_key(&id) {
            let user = self.users.find_by_id(id).await?;
            self.seen.insert(id, user);
        }
        Ok(match self.seen.get(&id) {
            Some(Some(user)) => (Some(user.email.clone()), Some(user.full_name())),
            _ => (None, None),
        })
    }
}
