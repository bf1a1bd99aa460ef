//! Permission store and resolver properties.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use pagekeeper_backend::models::permission::{Action, GrantSet, PageKey};
use pagekeeper_backend::models::user::Identity;
use pagekeeper_backend::services::authz_service::{AuthorizationResolver, Decision};
use pagekeeper_backend::store::memory::MemoryStore;
use pagekeeper_backend::store::PermissionStore;

#[derive(Debug, Clone)]
enum Op {
    Grant(PageKey, Action),
    RevokeAll,
    Replace(GrantSet),
}

fn page() -> impl Strategy<Value = PageKey> {
    prop::sample::select(PageKey::ALL.to_vec())
}

fn action() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

fn grant_set() -> impl Strategy<Value = GrantSet> {
    prop::collection::btree_set((page(), action()), 0..12)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (page(), action()).prop_map(|(p, a)| Op::Grant(p, a)),
        1 => Just(Op::RevokeAll),
        2 => grant_set().prop_map(Op::Replace),
    ]
}

fn identity(id: Uuid, is_super_admin: bool) -> Identity {
    Identity {
        id,
        email: "prop@example.com".into(),
        first_name: "Prop".into(),
        last_name: "Test".into(),
        is_super_admin,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Apply `ops` to a fresh store and return every resolver decision for a
/// regular user, next to the expected set.
fn run_ops(ops: &[Op]) -> (GrantSet, GrantSet) {
    runtime().block_on(async {
        let store = Arc::new(MemoryStore::default());
        let resolver = AuthorizationResolver::new(store.clone());
        let user_id = Uuid::new_v4();
        let mut model = GrantSet::new();

        for op in ops {
            match op {
                Op::Grant(p, a) => {
                    store.grant(user_id, *p, *a).await.unwrap();
                    model.insert((*p, *a));
                }
                Op::RevokeAll => {
                    store.revoke_all(user_id).await.unwrap();
                    model.clear();
                }
                Op::Replace(set) => {
                    store.replace_for_user(user_id, set).await.unwrap();
                    model = set.clone();
                }
            }
        }

        let who = identity(user_id, false);
        let mut allowed = GrantSet::new();
        for p in PageKey::ALL {
            for a in Action::ALL {
                if resolver.authorize(&who, p, a).await.unwrap() == Decision::Allow {
                    allowed.insert((p, a));
                }
            }
        }
        (allowed, model)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_resolver_allows_exactly_the_held_grants(ops in prop::collection::vec(op(), 0..30)) {
        let (allowed, expected) = run_ops(&ops);
        prop_assert_eq!(allowed, expected);
    }

    #[test]
    fn prop_granting_twice_equals_granting_once(grants in prop::collection::vec((page(), action()), 0..20)) {
        let (once, twice) = runtime().block_on(async {
            let store = MemoryStore::default();
            let a = Uuid::new_v4();
            let b = Uuid::new_v4();
            for (p, act) in &grants {
                store.grant(a, *p, *act).await.unwrap();
                store.grant(b, *p, *act).await.unwrap();
                store.grant(b, *p, *act).await.unwrap();
            }
            (
                store.list_for_user(a).await.unwrap(),
                store.list_for_user(b).await.unwrap(),
            )
        });
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_super_admin_is_always_allowed(p in page(), a in action()) {
        let decision = runtime().block_on(async {
            let store = Arc::new(MemoryStore::default());
            let resolver = AuthorizationResolver::new(store);
            resolver.authorize(&identity(Uuid::new_v4(), true), p, a).await.unwrap()
        });
        prop_assert_eq!(decision, Decision::Allow);
    }
}

#[tokio::test]
async fn test_actions_do_not_imply_each_other() {
    let store = Arc::new(MemoryStore::default());
    let resolver = AuthorizationResolver::new(store.clone());
    let user_id = Uuid::new_v4();
    store
        .grant(user_id, PageKey::Clients, Action::Delete)
        .await
        .unwrap();

    let who = identity(user_id, false);
    for (action, expected) in [
        (Action::View, Decision::Deny),
        (Action::Edit, Decision::Deny),
        (Action::Create, Decision::Deny),
        (Action::Delete, Decision::Allow),
    ] {
        let decision = resolver
            .authorize(&who, PageKey::Clients, action)
            .await
            .unwrap();
        assert_eq!(decision, expected, "{action}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_a_partial_replacement() {
    let store = Arc::new(MemoryStore::default());
    let user_id = Uuid::new_v4();

    let old: GrantSet = [
        (PageKey::Clients, Action::View),
        (PageKey::Clients, Action::Edit),
        (PageKey::Finance, Action::View),
    ]
    .into_iter()
    .collect();
    let new: GrantSet = [
        (PageKey::OrderList, Action::View),
        (PageKey::OrderList, Action::Create),
        (PageKey::Suppliers, Action::Delete),
        (PageKey::MediaPlans, Action::Edit),
        (PageKey::SalesReports, Action::View),
    ]
    .into_iter()
    .collect();
    store.replace_for_user(user_id, &old).await.unwrap();

    let writer = {
        let store = store.clone();
        let (old, new) = (old.clone(), new.clone());
        tokio::spawn(async move {
            for i in 0..500 {
                let next = if i % 2 == 0 { &new } else { &old };
                store.replace_for_user(user_id, next).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for _ in 0..500 {
                    let seen = store.list_for_user(user_id).await.unwrap();
                    assert!(seen == old || seen == new, "partial grant set observed: {seen:?}");
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn test_replace_with_empty_set_revokes_everything() {
    let store = MemoryStore::default();
    let user_id = Uuid::new_v4();
    store
        .grant(user_id, PageKey::Clients, Action::View)
        .await
        .unwrap();

    store.replace_for_user(user_id, &GrantSet::new()).await.unwrap();
    assert!(store.list_for_user(user_id).await.unwrap().is_empty());
    assert_eq!(
        store
            .list_for_user_page(user_id, PageKey::Clients)
            .await
            .unwrap(),
        BTreeSet::new()
    );
}
