//! Page keys, actions and permission grants.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// The fixed set of pages governed by grants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "page_key", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PageKey {
    ProductsList,
    MarketingList,
    OrderList,
    MediaPlans,
    OfferPricing,
    Clients,
    Suppliers,
    CustomerSupport,
    SalesReports,
    Finance,
}

impl PageKey {
    pub const ALL: [PageKey; 10] = [
        PageKey::ProductsList,
        PageKey::MarketingList,
        PageKey::OrderList,
        PageKey::MediaPlans,
        PageKey::OfferPricing,
        PageKey::Clients,
        PageKey::Suppliers,
        PageKey::CustomerSupport,
        PageKey::SalesReports,
        PageKey::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageKey::ProductsList => "products-list",
            PageKey::MarketingList => "marketing-list",
            PageKey::OrderList => "order-list",
            PageKey::MediaPlans => "media-plans",
            PageKey::OfferPricing => "offer-pricing",
            PageKey::Clients => "clients",
            PageKey::Suppliers => "suppliers",
            PageKey::CustomerSupport => "customer-support",
            PageKey::SalesReports => "sales-reports",
            PageKey::Finance => "finance",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PageKey::ProductsList => "Products List",
            PageKey::MarketingList => "Marketing List",
            PageKey::OrderList => "Order List",
            PageKey::MediaPlans => "Media Plans",
            PageKey::OfferPricing => "Offer Pricing SKUs",
            PageKey::Clients => "Clients",
            PageKey::Suppliers => "Suppliers",
            PageKey::CustomerSupport => "Customer Support",
            PageKey::SalesReports => "Sales Reports",
            PageKey::Finance => "Finance & Accounting",
        }
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageKey::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::InvalidPageKey(s.to_string()))
    }
}

/// An action on a page. Actions are independent flags: holding one never
/// implies holding another.
///
/// The derived ordering (view < edit < create < delete) only picks the
/// "highest" action for summary display.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "page_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Edit,
    Create,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Edit, Action::Create, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Edit => "edit",
            Action::Create => "create",
            Action::Delete => "delete",
        }
    }

    /// Summary label for a set of actions held on one page.
    pub fn highest<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Option<Action> {
        actions.into_iter().copied().max()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == lowered)
            .ok_or_else(|| AppError::Validation(format!("Unknown action '{}'", s)))
    }
}

/// A user's complete grant set, as `(page, action)` pairs.
pub type GrantSet = BTreeSet<(PageKey, Action)>;

/// Stored `(user, page, action)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, ToSchema)]
pub struct PermissionGrant {
    pub user_id: Uuid,
    pub page_key: PageKey,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

/// Parse a loosely shaped `{page: [action, ...]}` map into a typed grant set,
/// rejecting unknown page keys and actions.
pub fn parse_grant_map(map: &BTreeMap<String, Vec<String>>) -> Result<GrantSet, AppError> {
    let mut grants = GrantSet::new();
    for (page, actions) in map {
        let page: PageKey = page.parse()?;
        for action in actions {
            grants.insert((page, action.parse()?));
        }
    }
    Ok(grants)
}

/// Group a grant set by page, in page order.
pub fn group_by_page(grants: &GrantSet) -> BTreeMap<PageKey, BTreeSet<Action>> {
    let mut grouped: BTreeMap<PageKey, BTreeSet<Action>> = BTreeMap::new();
    for (page, action) in grants {
        grouped.entry(*page).or_default().insert(*action);
    }
    grouped
}
