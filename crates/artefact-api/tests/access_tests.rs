//! AccessControl decision order and permission caching.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use artefact_api::access::{AccessError, AccessPolicy};
use artefact_api::auth::{CallerIdentity, UserIdentity};
use artefact_api::config::ServiceConfig;

use common::{catalog_backend, Harness, DOMAIN};

fn user(id: &str) -> CallerIdentity {
    CallerIdentity::user(UserIdentity::new(id))
}

#[tokio::test(start_paused = true)]
async fn denial_is_cached_until_the_ttl_expires() {
    let h = Harness::new(vec![catalog_backend()]);
    let access = &h.state.access;
    let alice = user("alice");

    let err = access.authorize(&alice, "firmware", DOMAIN).await.unwrap_err();
    assert!(matches!(err, AccessError::Denied { cached: false, .. }));
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 1);

    // The oracle changes its mind, but the denial is reused within the TTL.
    let id = h.state.resolver.resolve_id("firmware", DOMAIN).await.unwrap();
    h.oracle.grant("alice", id.get());
    tokio::time::advance(Duration::from_secs(60)).await;
    let err = access.authorize(&alice, "firmware", DOMAIN).await.unwrap_err();
    assert!(matches!(err, AccessError::Denied { cached: true, .. }));
    assert!(err.to_string().contains(&format!("#{id}")));
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(access.authorize(&alice, "firmware", DOMAIN).await.unwrap(), id);
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn grants_are_cached_per_user() {
    let h = Harness::new(vec![catalog_backend()]);
    let access = &h.state.access;
    let id = h.state.resolver.resolve_id("firmware", DOMAIN).await.unwrap();
    h.oracle.grant("alice", id.get());

    access.authorize(&user("alice"), "firmware", DOMAIN).await.unwrap();
    h.oracle.revoke("alice", id.get());
    access.authorize(&user("alice"), "firmware", DOMAIN).await.unwrap();
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 1);

    // Bob's answer is his own.
    let err = access.authorize(&user("bob"), "firmware", DOMAIN).await.unwrap_err();
    assert!(err.is_denial());
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn anonymous_callers_are_rejected_before_any_remote_call() {
    let h = Harness::new(vec![catalog_backend()]);

    let err = h
        .state
        .access
        .authorize(&CallerIdentity::anonymous(), "firmware", DOMAIN)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Unauthenticated { .. }));
    assert!(err.is_denial());
    assert_eq!(h.oracle.calls(), 0);
    assert!(h.store.is_empty());
    assert_eq!(h.backend(0).latest_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_domain_is_rejected_first() {
    let h = Harness::new(vec![catalog_backend()]);
    let err = h
        .state
        .access
        .authorize(&user("alice"), "firmware", "")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::MissingDomain { .. }));
    assert!(!err.is_denial());
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test]
async fn service_without_user_needs_a_grant() {
    let h = Harness::new(vec![catalog_backend()]);
    let err = h
        .state
        .access
        .authorize(&CallerIdentity::service("77"), "firmware", DOMAIN)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Unauthenticated { .. }));
    assert_eq!(h.oracle.service_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blanket_service_grant_allows_everything_and_is_cached() {
    let h = Harness::new(vec![catalog_backend()]);
    h.oracle.grant_service("77");
    let service = CallerIdentity::service("77");

    h.state.access.authorize(&service, "firmware", DOMAIN).await.unwrap();
    h.state.access.authorize(&service, "bootloader", DOMAIN).await.unwrap();
    assert_eq!(h.oracle.service_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn privileged_service_needs_no_user() {
    let h = Harness::new(vec![catalog_backend()]);
    let id = h
        .state
        .access
        .authorize(&CallerIdentity::service("833"), "firmware", DOMAIN)
        .await
        .unwrap();
    assert_eq!(id, h.state.resolver.resolve_id("firmware", DOMAIN).await.unwrap());
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn trusted_service_needs_a_user() {
    let h = Harness::new(vec![catalog_backend()]);
    let access = &h.state.access;

    access
        .authorize(&user("alice").with_service("3539"), "firmware", DOMAIN)
        .await
        .unwrap();
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 0);

    let err = access
        .authorize(&CallerIdentity::service("3539"), "firmware", DOMAIN)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Unauthenticated { .. }));
}

#[tokio::test]
async fn root_users_bypass_the_oracle_unless_disabled() {
    let root = CallerIdentity::user(UserIdentity::new("admin").root());

    let h = Harness::new(vec![catalog_backend()]);
    h.state.access.authorize(&root, "firmware", DOMAIN).await.unwrap();
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 0);

    let config = ServiceConfig {
        access: AccessPolicy {
            always_allow_root: false,
            ..AccessPolicy::default()
        },
        ..ServiceConfig::default()
    };
    let h = Harness::with_config(vec![catalog_backend()], config);
    let err = h.state.access.authorize(&root, "firmware", DOMAIN).await.unwrap_err();
    assert!(matches!(err, AccessError::Denied { .. }));
    assert_eq!(h.oracle.object_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oracle_failures_are_not_cached() {
    let h = Harness::new(vec![catalog_backend()]);
    let id = h.state.resolver.resolve_id("firmware", DOMAIN).await.unwrap();
    h.oracle.grant("alice", id.get());
    h.oracle.set_unavailable(true);

    let err = h
        .state
        .access
        .authorize(&user("alice"), "firmware", DOMAIN)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Oracle(_)));
    assert!(!err.is_denial());

    h.oracle.set_unavailable(false);
    h.state
        .access
        .authorize(&user("alice"), "firmware", DOMAIN)
        .await
        .unwrap();
}
