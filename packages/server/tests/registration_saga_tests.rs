//! Registration saga, login and session tests over in-memory doubles.

mod common;

use auth_core::common::{AuthError, ErrorKind};
use auth_core::domains::auth::actions::{
    complete_registration, initiate_registration, introspect, login, logout,
    reconcile_registrations, CompleteRegistration, Login, ReconcileReport,
};
use auth_core::domains::auth::models::hash_password;
use auth_core::domains::auth::AuthEvent;
use auth_core::kernel::test_dependencies::{
    MockAuthStore, MockIdentityRegistry, RegistryCall, SpyEventPublisher, TestDependencies,
};
use chrono::{Duration, Utc};
use common::profile;
use uuid::Uuid;

fn complete(token: &str, password: &str) -> CompleteRegistration {
    CompleteRegistration {
        token: token.to_string(),
        password: password.to_string(),
        user_agent: Some("tests".to_string()),
        ip_address: Some("10.0.0.1".to_string()),
    }
}

// ============================================================================
// Initiate
// ============================================================================

#[tokio::test]
async fn initiate_issues_token_and_publishes_request() {
    let test = TestDependencies::new();
    let deps = test.server_deps();

    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let pending = deps.tokens.validate_pending(&initiated.pending_token).unwrap();
    assert_eq!(pending.profile.citizen_id, "123");
    assert_eq!(pending.profile.email, "a@x.com");
    assert_eq!(pending.expires_at.timestamp(), initiated.expires_at.timestamp());

    let events = test.events.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        AuthEvent::RegistrationRequested(event) => {
            assert_eq!(event.token, initiated.pending_token);
            assert!(event
                .verification_url
                .starts_with("http://localhost:3000/set-password?token="));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Nothing is written locally
    assert_eq!(test.store.credential_count(), 0);
    assert!(test.store.intents().is_empty());
}

#[tokio::test]
async fn initiate_rejects_invalid_profile() {
    let test = TestDependencies::new();
    let mut bad = profile("12a");
    bad.email = "not-an-email".into();

    let err = initiate_registration(bad, &test.server_deps())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(test.events.events().is_empty());
}

#[tokio::test]
async fn initiate_for_registered_citizen_is_a_conflict() {
    let test = TestDependencies::new().with_store(MockAuthStore::new().with_credential(
        "123",
        &hash_password("longpass1").unwrap(),
        true,
    ));

    let err = initiate_registration(profile("123"), &test.server_deps())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));
}

#[tokio::test]
async fn initiate_survives_publish_failure() {
    let test = TestDependencies::new().with_events(SpyEventPublisher::new().failing());

    let initiated = initiate_registration(profile("123"), &test.server_deps()).await;
    assert!(initiated.is_ok());
}

// ============================================================================
// Complete
// ============================================================================

#[tokio::test]
async fn set_password_registers_commits_and_opens_session() {
    let test = TestDependencies::new();
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let result = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap();

    assert_eq!(result.folder_id, "F1");
    assert_eq!(result.profile.citizen_id, "123");

    let credential = test.store.credential("123").expect("credential created");
    assert!(credential.is_active && credential.email_verified);
    assert_ne!(credential.password_hash, "longpass1");

    let claims = deps.tokens.validate_session(&result.session_token).unwrap();
    assert_eq!(claims.citizen_id, "123");
    assert_eq!(claims.folder_id, "F1");
    assert_eq!(claims.session_id, result.session_id);

    let session = test.store.session(result.session_id).expect("session row");
    assert_eq!(session.ip_address.as_deref(), Some("10.0.0.1"));

    assert_eq!(
        test.identity.calls(),
        vec![
            RegistryCall::ValidateAvailability("123".into()),
            RegistryCall::RegisterIdentity("123".into()),
        ]
    );

    let intents = test.store.intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, "committed");
    assert_eq!(intents[0].folder_id.as_deref(), Some("F1"));

    let completed = test
        .events
        .events()
        .into_iter()
        .find_map(|e| match e {
            AuthEvent::RegistrationCompleted(c) => Some(c),
            _ => None,
        })
        .expect("completion event");
    assert_eq!(completed.folder_id, "F1");
    assert_eq!(completed.profile.email, "a@x.com");
}

#[tokio::test]
async fn expired_token_is_rejected_before_any_external_call() {
    let test = TestDependencies::new();
    let deps = test.server_deps();
    let token = deps
        .tokens
        .issue_pending(
            &profile("123"),
            Uuid::new_v4(),
            Utc::now() - Duration::minutes(1),
        )
        .unwrap();

    let err = complete_registration(complete(&token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::InvalidToken));
    assert_eq!(err.status_code().as_u16(), 400);
    assert!(test.identity.calls().is_empty());
    assert!(test.store.credential("123").is_none());
}

#[tokio::test]
async fn weak_password_is_rejected_first() {
    let test = TestDependencies::new();
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "short"), &deps)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(test.identity.calls().is_empty());
}

#[tokio::test]
async fn unavailable_identity_is_a_conflict_without_registration() {
    let test = TestDependencies::new().with_identity(MockIdentityRegistry::new().unavailable());
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Conflict(_)));
    assert_eq!(test.identity.registration_calls(), 0);
    assert!(test.store.credential("123").is_none());
}

#[tokio::test]
async fn failing_registry_never_yields_a_credential() {
    let test =
        TestDependencies::new().with_identity(MockIdentityRegistry::new().failing_registration());
    let deps = test.server_deps();

    for id in ["101", "102", "103"] {
        let initiated = initiate_registration(profile(id), &deps).await.unwrap();
        let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    assert_eq!(test.store.credential_count(), 0);
    assert!(test.store.intents().iter().all(|i| i.status == "failed"));
    assert!(!test
        .events
        .events()
        .iter()
        .any(|e| matches!(e, AuthEvent::RegistrationCompleted(_))));
}

#[tokio::test]
async fn unreachable_registry_on_availability_is_upstream() {
    let test =
        TestDependencies::new().with_identity(MockIdentityRegistry::new().failing_availability());
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Upstream(_)));
    assert!(test.store.intents().is_empty());
}

#[tokio::test]
async fn local_commit_failure_orphans_the_intent() {
    let test =
        TestDependencies::new().with_store(MockAuthStore::new().failing_credential_writes());
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(test.identity.registration_calls(), 1);
    let intents = test.store.intents();
    assert_eq!(intents[0].status, "orphaned");
    assert_eq!(intents[0].folder_id.as_deref(), Some("F1"));
}

#[tokio::test]
async fn slow_availability_check_times_out_before_any_write() {
    let test = TestDependencies::new()
        .with_identity(MockIdentityRegistry::new().slow(std::time::Duration::from_secs(2)))
        .with_identity_timeout(std::time::Duration::from_millis(50));
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Timeout(_)), "got {:?}", err);
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(test.identity.registration_calls(), 0);
    assert!(test.store.intents().is_empty());
    assert_eq!(test.store.credential_count(), 0);
}

#[tokio::test]
async fn slow_registration_times_out_and_fails_the_intent() {
    let test = TestDependencies::new()
        .with_identity(
            MockIdentityRegistry::new().slow_registration(std::time::Duration::from_secs(2)),
        )
        .with_identity_timeout(std::time::Duration::from_millis(50));
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(test.identity.registration_calls(), 1);
    assert!(test.store.credential("123").is_none());
    let intents = test.store.intents();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, "failed");
    assert!(intents[0].error.as_deref().unwrap().contains("timed out"));
    assert!(test.store.sessions().is_empty());
}

#[tokio::test]
async fn completion_survives_publish_failure() {
    let test = TestDependencies::new();
    let initiated = initiate_registration(profile("123"), &test.server_deps())
        .await
        .unwrap();

    let failing = TestDependencies {
        events: std::sync::Arc::new(SpyEventPublisher::new().failing()),
        ..test
    };
    let result =
        complete_registration(complete(&initiated.pending_token, "longpass1"), &failing.server_deps())
            .await;

    assert!(result.is_ok());
    assert!(failing.store.credential("123").is_some());
}

#[tokio::test]
async fn replayed_token_after_commit_is_a_conflict() {
    let test = TestDependencies::new();
    let deps = test.server_deps();
    let initiated = initiate_registration(profile("123"), &deps).await.unwrap();

    complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap();
    let err = complete_registration(complete(&initiated.pending_token, "longpass1"), &deps)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Conflict(_)));
    assert_eq!(test.store.credential_count(), 1);

    // The replay reached the registry a second time; its intent must not
    // pass for a commit once reconciliation runs.
    assert_eq!(test.identity.registration_calls(), 2);
    let statuses = || {
        test.store
            .intents()
            .into_iter()
            .map(|i| i.status)
            .collect::<Vec<_>>()
    };
    assert_eq!(statuses(), vec!["committed", "orphaned"]);

    let report = reconcile_registrations(test.store.as_ref(), Duration::zero())
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(statuses(), vec!["committed", "orphaned"]);
}

// ============================================================================
// Login / logout / introspect
// ============================================================================

fn registered_deps(email_verified: bool) -> TestDependencies {
    TestDependencies::new().with_store(MockAuthStore::new().with_credential(
        "123",
        &hash_password("longpass1").unwrap(),
        email_verified,
    ))
}

fn login_input(citizen_id: &str, password: &str) -> Login {
    Login {
        citizen_id: citizen_id.into(),
        password: password.into(),
        user_agent: None,
        ip_address: None,
    }
}

#[tokio::test]
async fn login_opens_session_and_logout_revokes_it() {
    let test = registered_deps(true);
    let deps = test.server_deps();

    let result = login(login_input("123", "longpass1"), &deps).await.unwrap();
    assert_eq!(test.store.last_login_touches(), 1);

    let claims = introspect(&result.session_token, &deps).await.unwrap();
    assert_eq!(claims.citizen_id, "123");

    logout(&result.session_token, &deps).await.unwrap();
    // Idempotent
    logout(&result.session_token, &deps).await.unwrap();

    let err = introspect(&result.session_token, &deps).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionInvalid));
}

#[tokio::test]
async fn wrong_password_and_unknown_id_look_the_same() {
    let deps = registered_deps(true).server_deps();

    let wrong = login(login_input("123", "nope-nope"), &deps).await.unwrap_err();
    let unknown = login(login_input("999", "longpass1"), &deps).await.unwrap_err();

    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert!(matches!(unknown, AuthError::InvalidCredentials));
}

#[tokio::test]
async fn unverified_email_cannot_log_in() {
    let deps = registered_deps(false).server_deps();

    let err = login(login_input("123", "longpass1"), &deps).await.unwrap_err();
    assert!(matches!(err, AuthError::EmailNotVerified));
    assert_eq!(err.status_code().as_u16(), 403);
}

#[tokio::test]
async fn login_survives_last_login_bump_failure() {
    let test = TestDependencies::new().with_store(
        MockAuthStore::new()
            .with_credential("123", &hash_password("longpass1").unwrap(), true)
            .failing_touches(),
    );

    assert!(login(login_input("123", "longpass1"), &test.server_deps())
        .await
        .is_ok());
}

#[tokio::test]
async fn expired_session_row_fails_introspection() {
    let test = registered_deps(true);
    let deps = test.server_deps();
    let result = login(login_input("123", "longpass1"), &deps).await.unwrap();

    test.store
        .set_session_expiry(result.session_id, Utc::now() - Duration::seconds(1));

    let err = introspect(&result.session_token, &deps).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionInvalid));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn stale_registered_intents_are_reconciled() {
    let store = MockAuthStore::new()
        .with_credential("200", &hash_password("longpass1").unwrap(), true)
        .with_registered_intent("200", Duration::minutes(30))
        .with_registered_intent("201", Duration::minutes(30))
        .with_registered_intent("202", Duration::minutes(1));

    let report = reconcile_registrations(&store, Duration::minutes(15))
        .await
        .unwrap();

    assert_eq!(
        report,
        ReconcileReport {
            committed: 1,
            orphaned: 1
        }
    );

    let status_of = |id: &str| {
        store
            .intents()
            .into_iter()
            .find(|i| i.citizen_id == id)
            .map(|i| i.status)
            .unwrap()
    };
    assert_eq!(status_of("200"), "committed");
    assert_eq!(status_of("201"), "orphaned");
    assert_eq!(status_of("202"), "registered");

    // A second pass has nothing left to do
    let again = reconcile_registrations(&store, Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(again, ReconcileReport::default());
}
