//! Authorization resolver.
//!
//! A decision is a pure set-membership check against the permission store:
//! super admins are allowed everything, everyone else is allowed exactly the
//! `(page, action)` pairs they hold. Actions do not imply one another.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::permission::{Action, PageKey};
use crate::models::user::Identity;
use crate::services::metrics_service;
use crate::store::PermissionStore;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

#[derive(Clone)]
pub struct AuthorizationResolver {
    permissions: Arc<dyn PermissionStore>,
}

impl AuthorizationResolver {
    pub fn new(permissions: Arc<dyn PermissionStore>) -> Self {
        Self { permissions }
    }

    /// Decide whether `identity` may perform `action` on `page`. A missing
    /// grant is a `Deny`, never an error.
    pub async fn authorize(
        &self,
        identity: &Identity,
        page: PageKey,
        action: Action,
    ) -> Result<Decision> {
        let decision = if identity.is_super_admin
            || self.permissions.has_grant(identity.id, page, action).await?
        {
            Decision::Allow
        } else {
            Decision::Deny
        };

        metrics_service::record_authorization(
            page,
            action,
            decision.is_allowed(),
            identity.is_super_admin,
        );
        tracing::debug!(
            user_id = %identity.id,
            page = %page,
            action = %action,
            decision = ?decision,
            "Authorization decision"
        );

        Ok(decision)
    }

    /// Like [`authorize`](Self::authorize) but turns a `Deny` into `Forbidden`.
    pub async fn require(&self, identity: &Identity, page: PageKey, action: Action) -> Result<()> {
        match self.authorize(identity, page, action).await? {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(AppError::Forbidden(format!(
                "'{}' permission on page '{}' is required",
                action, page
            ))),
        }
    }

    /// Every action `identity` may perform on `page`.
    pub async fn authorize_bulk(&self, identity: &Identity, page: PageKey) -> Result<BTreeSet<Action>> {
        if identity.is_super_admin {
            return Ok(Action::ALL.into_iter().collect());
        }
        self.permissions.list_for_user_page(identity.id, page).await
    }
}
