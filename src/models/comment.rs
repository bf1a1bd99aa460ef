//! Comment and comment-history models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::permission::PageKey;

/// Comment entity. A comment with `deleted_at` set is terminal and no longer
/// part of its page's active set.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Uuid,
    pub page_key: PageKey,
    pub content: String,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Mutation recorded by a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "history_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Updated,
    Deleted,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Updated => "updated",
            HistoryAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record. `previous_content` is the content before the
/// mutation; `None` for `created`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct CommentHistory {
    pub id: Uuid,
    pub comment_id: Uuid,
    pub previous_content: Option<String>,
    pub action: HistoryAction,
    pub modified_by: Uuid,
    pub modified_at: DateTime<Utc>,
}

/// Who may read a comment's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryVisibility {
    /// Only super admins.
    SuperAdmin,
    /// Anyone holding `view` on the comment's page.
    PageViewers,
}

impl FromStr for HistoryVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "super_admin" | "super-admin" => Ok(HistoryVisibility::SuperAdmin),
            "page_viewers" | "page-viewers" => Ok(HistoryVisibility::PageViewers),
            other => Err(format!("unknown history visibility '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_visibility_parse() {
        assert_eq!(
            "super_admin".parse::<HistoryVisibility>().unwrap(),
            HistoryVisibility::SuperAdmin
        );
        assert_eq!(
            "Page_Viewers".parse::<HistoryVisibility>().unwrap(),
            HistoryVisibility::PageViewers
        );
        assert!("everyone".parse::<HistoryVisibility>().is_err());
    }

    #[test]
    fn test_deleted_at_not_serialized() {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            page_key: PageKey::Clients,
            content: "Call back Monday".into(),
            author_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: Some(now),
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["page_key"], "clients");
        assert!(comment.is_deleted());
    }

    #[test]
    fn test_history_action_wire_form() {
        assert_eq!(serde_json::to_value(HistoryAction::Updated).unwrap(), "updated");
    }
}
