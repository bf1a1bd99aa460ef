//! Comment engine and history properties, exercised through the service.

use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use pagekeeper_backend::error::AppError;
use pagekeeper_backend::models::comment::{HistoryAction, HistoryVisibility};
use pagekeeper_backend::models::permission::{Action, PageKey};
use pagekeeper_backend::models::user::{Identity, NewUser};
use pagekeeper_backend::services::authz_service::AuthorizationResolver;
use pagekeeper_backend::services::comment_service::{CommentPolicy, CommentService};
use pagekeeper_backend::store::memory::MemoryStore;
use pagekeeper_backend::store::{CommentStore, PermissionStore, UserStore};

struct Fixture {
    store: Arc<MemoryStore>,
    service: CommentService,
}

impl Fixture {
    fn new(policy: CommentPolicy) -> Self {
        let store = Arc::new(MemoryStore::default());
        let resolver = AuthorizationResolver::new(store.clone());
        let service = CommentService::new(store.clone(), store.clone(), resolver, policy);
        Self { store, service }
    }

    async fn user(&self, email: &str, is_super_admin: bool) -> Identity {
        UserStore::create(
            self.store.as_ref(),
            NewUser {
                email: email.into(),
                first_name: "First".into(),
                last_name: "Last".into(),
                password_hash: "unused".into(),
                is_super_admin,
            },
        )
        .await
        .unwrap()
        .identity()
    }

    async fn grant(&self, who: &Identity, page: PageKey, actions: &[Action]) {
        for action in actions {
            self.store.grant(who.id, page, *action).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_draft_round_trip_history_is_newest_first() {
    let fx = Fixture::new(CommentPolicy::default());
    let admin = fx.user("root@example.com", true).await;

    let comment = fx
        .service
        .create(&admin, PageKey::MediaPlans, "Draft A")
        .await
        .unwrap();
    fx.service
        .update(&admin, comment.id, "Draft B")
        .await
        .unwrap();

    let history = fx.service.history(&admin, comment.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, HistoryAction::Updated);
    assert_eq!(history[0].previous_content.as_deref(), Some("Draft A"));
    assert_eq!(history[0].modified_by_email.as_deref(), Some("root@example.com"));
    assert_eq!(history[1].action, HistoryAction::Created);
    assert_eq!(history[1].previous_content, None);
}

#[tokio::test]
async fn test_deleted_comment_leaves_list_but_keeps_history() {
    let fx = Fixture::new(CommentPolicy::default());
    let admin = fx.user("root@example.com", true).await;
    let editor = fx.user("editor@example.com", false).await;
    fx.grant(&editor, PageKey::Clients, &[Action::View, Action::Create, Action::Delete])
        .await;

    let comment = fx
        .service
        .create(&editor, PageKey::Clients, "temporary")
        .await
        .unwrap();
    fx.service.delete(&editor, comment.id).await.unwrap();

    assert!(fx
        .service
        .list(&editor, PageKey::Clients)
        .await
        .unwrap()
        .is_empty());

    let history = fx.service.history(&admin, comment.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, HistoryAction::Deleted);
    assert_eq!(history[0].previous_content.as_deref(), Some("temporary"));

    // A tombstoned comment can be neither edited nor deleted again
    let update = fx.service.update(&editor, comment.id, "again").await;
    assert!(matches!(update, Err(AppError::NotFound(_))));
    let delete = fx.service.delete(&editor, comment.id).await;
    assert!(matches!(delete, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_view_only_user_is_forbidden_for_every_mutation() {
    let fx = Fixture::new(CommentPolicy::default());
    let admin = fx.user("root@example.com", true).await;
    let viewer = fx.user("viewer@example.com", false).await;
    fx.grant(&viewer, PageKey::Finance, &[Action::View]).await;

    let existing = fx
        .service
        .create(&admin, PageKey::Finance, "posted by admin")
        .await
        .unwrap();

    let create = fx.service.create(&viewer, PageKey::Finance, "nope").await;
    assert!(matches!(create, Err(AppError::Forbidden(_))));
    let update = fx.service.update(&viewer, existing.id, "nope").await;
    assert!(matches!(update, Err(AppError::Forbidden(_))));
    let delete = fx.service.delete(&viewer, existing.id).await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));

    // Authorization is decided before the content is looked at
    let blank_create = fx.service.create(&viewer, PageKey::Finance, "   ").await;
    assert!(matches!(blank_create, Err(AppError::Forbidden(_))));
    let blank_update = fx.service.update(&viewer, existing.id, "").await;
    assert!(matches!(blank_update, Err(AppError::Forbidden(_))));

    // Failed mutations leave no trace
    let history = fx.store.history(existing.id).await.unwrap();
    assert_eq!(history.len(), 1);
    let listed = fx.service.list(&viewer, PageKey::Finance).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content, "posted by admin");
    assert!(!listed[0].can_edit && !listed[0].can_delete);
}

#[tokio::test]
async fn test_listing_requires_view() {
    let fx = Fixture::new(CommentPolicy::default());
    let creator = fx.user("creator@example.com", false).await;
    fx.grant(&creator, PageKey::Suppliers, &[Action::Create]).await;

    fx.service
        .create(&creator, PageKey::Suppliers, "create without view")
        .await
        .unwrap();
    let listed = fx.service.list(&creator, PageKey::Suppliers).await;
    assert!(matches!(listed, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn test_empty_content_is_rejected() {
    let fx = Fixture::new(CommentPolicy::default());
    let admin = fx.user("root@example.com", true).await;
    let result = fx.service.create(&admin, PageKey::Clients, "   \n\t").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_history_visibility_policy() {
    let restricted = Fixture::new(CommentPolicy::default());
    let open = Fixture::new(CommentPolicy {
        history_visibility: HistoryVisibility::PageViewers,
        author_override: false,
    });

    for (fx, viewer_allowed) in [(&restricted, false), (&open, true)] {
        let admin = fx.user("root@example.com", true).await;
        let viewer = fx.user("viewer@example.com", false).await;
        let outsider = fx.user("outsider@example.com", false).await;
        fx.grant(&viewer, PageKey::SalesReports, &[Action::View]).await;

        let comment = fx
            .service
            .create(&admin, PageKey::SalesReports, "quarterly")
            .await
            .unwrap();

        assert_eq!(
            fx.service.history(&viewer, comment.id).await.is_ok(),
            viewer_allowed
        );
        assert!(matches!(
            fx.service.history(&outsider, comment.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(fx.service.history(&admin, comment.id).await.is_ok());
    }
}

#[tokio::test]
async fn test_author_override_lets_authors_edit_without_grant() {
    let fx = Fixture::new(CommentPolicy {
        history_visibility: HistoryVisibility::SuperAdmin,
        author_override: true,
    });
    let author = fx.user("author@example.com", false).await;
    let other = fx.user("other@example.com", false).await;
    fx.grant(&author, PageKey::CustomerSupport, &[Action::View, Action::Create])
        .await;
    fx.grant(&other, PageKey::CustomerSupport, &[Action::View]).await;

    let comment = fx
        .service
        .create(&author, PageKey::CustomerSupport, "mine")
        .await
        .unwrap();

    fx.service
        .update(&author, comment.id, "still mine")
        .await
        .unwrap();
    let denied = fx.service.update(&other, comment.id, "theirs").await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let listed = fx
        .service
        .list(&author, PageKey::CustomerSupport)
        .await
        .unwrap();
    assert!(listed[0].can_edit && listed[0].can_delete);

    fx.service.delete(&author, comment.id).await.unwrap();
}

#[tokio::test]
async fn test_unknown_comment_is_not_found() {
    let fx = Fixture::new(CommentPolicy::default());
    let admin = fx.user("root@example.com", true).await;
    let missing = Uuid::new_v4();
    assert!(matches!(
        fx.service.history(&admin, missing).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        fx.service.update(&admin, missing, "x").await,
        Err(AppError::NotFound(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Each mutation appends exactly one row whose `previous_content` is the
    /// content just before it, and earlier rows never change.
    #[test]
    fn prop_history_is_append_only(
        edits in prop::collection::vec("[a-zA-Z0-9 ]{1,40}", 0..12),
        delete_at_end in any::<bool>(),
    ) {
        let outcome: std::result::Result<(), TestCaseError> = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let fx = Fixture::new(CommentPolicy::default());
                let admin = fx.user("root@example.com", true).await;
                let comment = fx
                    .service
                    .create(&admin, PageKey::ProductsList, "v0")
                    .await
                    .unwrap();

                let created_rows = fx.store.history(comment.id).await.unwrap();
                let mut current = "v0".to_string();
                let mut mutations: Vec<(HistoryAction, String)> = Vec::new();

                for edit in &edits {
                    if edit.trim().is_empty() {
                        continue;
                    }
                    let updated = fx.service.update(&admin, comment.id, edit).await.unwrap();
                    mutations.push((HistoryAction::Updated, current.clone()));
                    current = updated.content;
                }
                if delete_at_end {
                    fx.service.delete(&admin, comment.id).await.unwrap();
                    mutations.push((HistoryAction::Deleted, current.clone()));
                }

                let history = fx.store.history(comment.id).await.unwrap();
                prop_assert_eq!(history.len(), 1 + mutations.len());

                // Newest first, so the `created` row is last and unchanged.
                let oldest_first: Vec<_> = history.iter().rev().cloned().collect();
                prop_assert_eq!(&oldest_first[..1], &created_rows[..]);
                for (row, (action, expected_previous)) in oldest_first[1..].iter().zip(mutations.iter()) {
                    prop_assert_eq!(row.action, *action);
                    prop_assert_eq!(row.previous_content.as_deref(), Some(expected_previous.as_str()));
                }
                Ok(())
            });
        outcome?;
    }
}
