//! Integration tests for AuthManager
//!
//! Drives the manager through complete login, refresh and logout flows with
//! the scriptable mock adapter, including the interleavings a host can
//! produce (duplicate callbacks, cancellation mid-exchange, logout
//! mid-refresh).

use std::sync::{mpsc, Arc, Once};
use std::time::Duration;

use chrono::Utc;

use socialauth_core::testing::{MockProviderAdapter, RecordingObserver};
use socialauth_core::{AuthManager, ProviderAdapter, StateChange};
use socialauth_domain::{
    AuthError, CallbackPayload, ManagerSettings, ProviderConfig, SessionPhase, Token,
};
use tokio::sync::Notify;
use tracing::Level;

// ============================================================================
// Helpers
// ============================================================================

static INIT: Once = Once::new();

fn init_test_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().try_init().ok();
    });
}

fn create_test_manager() -> (Arc<AuthManager>, Arc<MockProviderAdapter>) {
    create_manager_with(MockProviderAdapter::new("vk").with_correlations(["c1", "c2", "c3"]))
}

fn create_manager_with(
    adapter: MockProviderAdapter,
) -> (Arc<AuthManager>, Arc<MockProviderAdapter>) {
    init_test_tracing();
    let manager = Arc::new(AuthManager::new());
    let adapter = Arc::new(adapter);
    manager.register_provider(adapter.clone()).unwrap();
    (manager, adapter)
}

fn callback(code: &str, state: &str) -> CallbackPayload {
    CallbackPayload::from_pairs([("code", code), ("state", state)])
}

async fn authenticate(manager: &AuthManager) -> Token {
    let request = manager.login("vk").unwrap();
    manager.handle_callback("vk", &callback("abc", request.correlation())).await.unwrap()
}

async fn wait_for_phase(manager: &AuthManager, id: &str, phase: SessionPhase) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while manager.phase(id) != Some(phase) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{id} never reached {phase}"));
}

fn non_refreshable_token() -> Token {
    Token::builder("vk", "offline-access").expires_in(0).build().unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_registration_errors() {
    let (manager, _) = create_test_manager();

    let duplicate = manager.register_provider(Arc::new(MockProviderAdapter::new("vk")));
    assert_eq!(duplicate, Err(AuthError::DuplicateProvider("vk".to_string())));

    let mismatched =
        manager.register_provider_as("vkontakte", Arc::new(MockProviderAdapter::new("vk")));
    assert!(matches!(mismatched, Err(AuthError::Configuration(_))));

    manager.register_provider_as("google", Arc::new(MockProviderAdapter::new("google"))).unwrap();
    let ids: Vec<String> = manager.providers().iter().map(ToString::to_string).collect();
    assert_eq!(ids, ["google", "vk"]);
}

#[tokio::test]
async fn test_unknown_provider() {
    let (manager, _) = create_test_manager();

    assert!(matches!(manager.login("ok"), Err(AuthError::UnknownProvider(_))));
    assert!(matches!(
        manager.handle_callback("ok", &callback("abc", "c1")).await,
        Err(AuthError::UnknownProvider(_))
    ));
    assert!(matches!(manager.logout("ok").await, Err(AuthError::UnknownProvider(_))));
    assert!(manager.phase("ok").is_none());
    assert!(manager.current_token("ok").is_none());
}

/// Validates that a callback for a provider removed mid-login is rejected
#[tokio::test]
async fn test_callback_after_unregister() {
    let (manager, _) = create_test_manager();
    let request = manager.login("vk").unwrap();

    manager.unregister_provider("vk").unwrap();

    let result = manager.handle_callback("vk", &callback("abc", request.correlation())).await;
    assert!(matches!(result, Err(AuthError::UnknownProvider(_))));
}

// ============================================================================
// Login round trip
// ============================================================================

/// Test the canonical VK scenario against the mock adapter
///
/// # Test Steps
/// 1. Register "vk" configured with app123 / s3cr3t
/// 2. login → Authorizing with correlation "c1"
/// 3. Callback {code: "abc", state: "c1"} → Authenticated
/// 4. The returned token belongs to "vk" and is the current token
#[tokio::test]
async fn test_login_round_trip() {
    let (manager, adapter) = create_test_manager();
    assert_eq!(adapter.config().application_id(), "app123");
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));

    let request = manager.login("vk").unwrap();
    assert_eq!(request.correlation(), "c1");
    assert_eq!(request.provider().as_str(), "vk");
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authorizing));
    assert!(manager.current_token("vk").is_none());

    let token = manager.handle_callback("vk", &callback("abc", "c1")).await.unwrap();

    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
    assert_eq!(token.provider().as_str(), "vk");
    assert_eq!(token.access_token(), "access-abc");
    assert_eq!(manager.current_token("vk"), Some(token));
    assert!(manager.last_error("vk").is_none());
    assert_eq!(adapter.last_pkce_verifier().as_deref(), Some("verifier-1"));
}

#[tokio::test]
async fn test_callback_from_redirect_uri() {
    let (manager, _) = create_test_manager();
    manager.login("vk").unwrap();

    let token = manager
        .handle_callback_uri("vk", "https://oauth.vk.com/blank.html#code=abc&state=c1")
        .await
        .unwrap();
    assert_eq!(token.access_token(), "access-abc");

    // An unparsable redirect fails a pending login
    manager.login("vk").unwrap();
    let result = manager.handle_callback_uri("vk", "::not a uri::").await;
    assert!(matches!(result, Err(AuthError::MalformedCallback(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Failed));
}

#[test]
fn test_login_twice_is_in_progress() {
    let (manager, adapter) = create_test_manager();

    manager.login("vk").unwrap();
    let second = manager.login("vk");

    assert_eq!(second.unwrap_err(), AuthError::OperationInProgress("vk".to_string()));
    assert_eq!(adapter.begin_calls(), 1);
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authorizing));
}

#[test]
fn test_login_configuration_error() {
    let (manager, _) =
        create_manager_with(MockProviderAdapter::with_config("vk", ProviderConfig::new("", "s3cr3t")));

    assert!(matches!(manager.login("vk"), Err(AuthError::Configuration(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
}

// ============================================================================
// Callback guards
// ============================================================================

/// Validates that a mismatched correlation never authenticates
///
/// Assertions:
/// - `CorrelationMismatch` is returned and recorded as the last error
/// - the session stays `Authorizing` with the original correlation
/// - the adapter is never asked to exchange the code
/// - the genuine callback still succeeds afterwards
#[tokio::test]
async fn test_correlation_mismatch_rejected() {
    let (manager, adapter) = create_test_manager();
    manager.login("vk").unwrap();

    let spoofed = manager.handle_callback("vk", &callback("evil", "forged")).await;

    assert_eq!(spoofed.unwrap_err(), AuthError::CorrelationMismatch);
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authorizing));
    assert_eq!(manager.last_error("vk"), Some(AuthError::CorrelationMismatch));
    assert!(manager.current_token("vk").is_none());
    assert_eq!(adapter.exchange_calls(), 0);

    manager.handle_callback("vk", &callback("abc", "c1")).await.unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
}

#[tokio::test]
async fn test_callback_without_pending_login() {
    let (manager, _) = create_test_manager();

    // Idle, no session yet
    let idle = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert_eq!(idle.unwrap_err(), AuthError::NoPendingAuthorization("vk".to_string()));

    // Authenticated: duplicate delivery of the same callback
    authenticate(&manager).await;
    let duplicate = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert_eq!(duplicate.unwrap_err(), AuthError::NoPendingAuthorization("vk".to_string()));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));

    // After logout
    manager.logout("vk").await.unwrap();
    let late = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert!(matches!(late, Err(AuthError::NoPendingAuthorization(_))));
}

#[tokio::test]
async fn test_callback_missing_correlation_fails_session() {
    let (manager, _) = create_test_manager();
    manager.login("vk").unwrap();

    let payload = CallbackPayload::from_pairs([("code", "abc")]);
    let result = manager.handle_callback("vk", &payload).await;

    assert!(matches!(result, Err(AuthError::MalformedCallback(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Failed));

    // Failed is recoverable through a fresh login
    let request = manager.login("vk").unwrap();
    assert_eq!(request.correlation(), "c2");
}

#[tokio::test]
async fn test_provider_denial_fails_session() {
    let (manager, _) = create_test_manager();
    manager.login("vk").unwrap();

    let denial = CallbackPayload::from_pairs([
        ("error", "access_denied"),
        ("error_reason", "user_denied"),
        ("error_description", "User denied your request"),
        ("state", "c1"),
    ]);
    let result = manager.handle_callback("vk", &denial).await;

    let expected = AuthError::rejected("access_denied", Some("User denied your request".into()));
    assert_eq!(result.unwrap_err(), expected);
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Failed));
    assert_eq!(manager.last_error("vk"), Some(expected));
}

/// Validates that a transient exchange failure keeps the login pending
#[tokio::test]
async fn test_network_failure_allows_retry() {
    let (manager, adapter) = create_test_manager();
    adapter.push_exchange_outcome(Err(AuthError::NetworkFailure("connection reset".into())));
    manager.login("vk").unwrap();

    let first = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert!(matches!(first, Err(AuthError::NetworkFailure(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authorizing));

    let retried = manager.handle_callback("vk", &callback("abc", "c1")).await.unwrap();
    assert_eq!(retried.access_token(), "access-abc");
    assert_eq!(adapter.exchange_calls(), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

/// Test same-provider serialization while a code exchange is suspended
///
/// # Test Steps
/// 1. Start an exchange that blocks inside the adapter
/// 2. A second callback and a new login both fail with `OperationInProgress`
/// 3. Cancel the login, then let the exchange finish
/// 4. The late result is discarded and the session stays `Idle`
#[tokio::test]
async fn test_cancel_during_exchange_discards_result() {
    let gate = Arc::new(Notify::new());
    let (manager, _) = create_manager_with(
        MockProviderAdapter::new("vk").with_correlations(["c1"]).with_exchange_gate(gate.clone()),
    );
    manager.login("vk").unwrap();

    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.handle_callback("vk", &callback("abc", "c1")).await })
    };
    wait_for_phase(&manager, "vk", SessionPhase::Exchanging).await;

    let duplicate = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert_eq!(duplicate.unwrap_err(), AuthError::OperationInProgress("vk".to_string()));
    assert!(matches!(manager.login("vk"), Err(AuthError::OperationInProgress(_))));
    assert!(matches!(manager.refresh("vk").await, Err(AuthError::OperationInProgress(_))));

    manager.cancel("vk").unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));

    gate.notify_one();
    let outcome = pending.await.unwrap();
    assert_eq!(outcome.unwrap_err(), AuthError::NoPendingAuthorization("vk".to_string()));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
    assert!(manager.current_token("vk").is_none());
}

#[tokio::test]
async fn test_cancel_requires_pending_login() {
    let (manager, _) = create_test_manager();
    assert!(matches!(manager.cancel("vk"), Err(AuthError::NoPendingAuthorization(_))));

    manager.login("vk").unwrap();
    manager.cancel("vk").unwrap();

    // The cancelled correlation is dead
    let late = manager.handle_callback("vk", &callback("abc", "c1")).await;
    assert!(matches!(late, Err(AuthError::NoPendingAuthorization(_))));
}

#[tokio::test]
async fn test_providers_are_independent() {
    let gate = Arc::new(Notify::new());
    let (manager, _) = create_manager_with(
        MockProviderAdapter::new("vk").with_correlations(["c1"]).with_exchange_gate(gate.clone()),
    );
    manager.register_provider(Arc::new(MockProviderAdapter::new("google"))).unwrap();
    manager.login("vk").unwrap();

    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.handle_callback("vk", &callback("abc", "c1")).await })
    };
    wait_for_phase(&manager, "vk", SessionPhase::Exchanging).await;

    let request = manager.login("google").unwrap();
    let token =
        manager.handle_callback("google", &callback("xyz", request.correlation())).await.unwrap();
    assert_eq!(token.provider().as_str(), "google");

    gate.notify_one();
    tokio_test::assert_ok!(pending.await.unwrap());
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_replaces_token() {
    let (manager, adapter) = create_test_manager();
    let original = authenticate(&manager).await;

    let fresh = manager.refresh("vk").await.unwrap();

    assert_ne!(fresh.access_token(), original.access_token());
    assert_eq!(manager.current_token("vk"), Some(fresh));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
    assert_eq!(adapter.refresh_calls(), 1);
}

/// Validates that refreshing a token without a refresh credential changes
/// nothing
#[tokio::test]
async fn test_refresh_without_credential_unsupported() {
    let (manager, adapter) = create_test_manager();
    adapter.push_exchange_outcome(Ok(non_refreshable_token()));
    let token = authenticate(&manager).await;
    let observer = RecordingObserver::new();
    manager.subscribe(observer.clone());

    let result = manager.refresh("vk").await;

    assert_eq!(result.unwrap_err(), AuthError::RefreshUnsupported("vk".to_string()));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
    assert_eq!(manager.current_token("vk"), Some(token));
    assert_eq!(adapter.refresh_calls(), 0);
    assert!(observer.changes().is_empty());
}

#[tokio::test]
async fn test_refresh_requires_authentication() {
    let (manager, _) = create_test_manager();
    assert!(matches!(manager.refresh("vk").await, Err(AuthError::NotAuthenticated(_))));

    manager.login("vk").unwrap();
    assert!(matches!(manager.refresh("vk").await, Err(AuthError::NotAuthenticated(_))));
}

#[tokio::test]
async fn test_irrecoverable_refresh_expires_session() {
    let (manager, adapter) = create_test_manager();
    authenticate(&manager).await;
    adapter.push_refresh_outcome(Err(AuthError::TokenExpiredIrrecoverably("invalid_grant".into())));

    let result = manager.refresh("vk").await;

    assert!(matches!(result, Err(AuthError::TokenExpiredIrrecoverably(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Expired));
    assert!(manager.current_token("vk").is_none());

    // Expired re-enters Authorizing
    manager.login("vk").unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authorizing));
}

#[tokio::test]
async fn test_transient_refresh_failure_keeps_token() {
    let (manager, adapter) = create_test_manager();
    let token = authenticate(&manager).await;
    adapter.push_refresh_outcome(Err(AuthError::NetworkFailure("timeout".into())));

    let result = manager.refresh("vk").await;

    assert!(matches!(result, Err(AuthError::NetworkFailure(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Authenticated));
    assert_eq!(manager.current_token("vk"), Some(token));
    assert!(matches!(manager.last_error("vk"), Some(AuthError::NetworkFailure(_))));
}

#[tokio::test]
async fn test_logout_during_refresh_discards_result() {
    let gate = Arc::new(Notify::new());
    let (manager, adapter) = create_manager_with(
        MockProviderAdapter::new("vk").with_correlations(["c1"]).with_refresh_gate(gate.clone()),
    );
    authenticate(&manager).await;

    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.refresh("vk").await })
    };
    wait_for_phase(&manager, "vk", SessionPhase::Refreshing).await;
    assert!(manager.current_token("vk").is_some());

    manager.logout("vk").await.unwrap();
    gate.notify_one();

    assert!(matches!(pending.await.unwrap(), Err(AuthError::NoPendingAuthorization(_))));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
    assert!(manager.current_token("vk").is_none());
    assert_eq!(adapter.revoke_calls(), 1);
}

#[tokio::test]
async fn test_access_token_refreshes_inside_threshold() {
    let settings = ManagerSettings { refresh_threshold_seconds: 7200, ..ManagerSettings::default() };
    let manager = Arc::new(AuthManager::with_settings(&settings));
    let adapter = Arc::new(MockProviderAdapter::new("vk").with_correlations(["c1"]));
    manager.register_provider(adapter.clone()).unwrap();
    authenticate(&manager).await;

    // One-hour token, two-hour threshold
    let access = manager.access_token("vk").await.unwrap();

    assert_eq!(access, "access-abc-refreshed");
    assert_eq!(adapter.refresh_calls(), 1);
}

#[tokio::test]
async fn test_access_token_without_refresh() {
    let (manager, adapter) = create_test_manager();
    assert!(matches!(manager.access_token("vk").await, Err(AuthError::NotAuthenticated(_))));

    authenticate(&manager).await;
    assert_eq!(manager.access_token("vk").await.unwrap(), "access-abc");
    assert_eq!(adapter.refresh_calls(), 0);
}

/// Validates that an expired token without a refresh credential ends the
/// session instead of lingering as `Authenticated`
#[tokio::test]
async fn test_lapsed_token_expires_session() {
    let (manager, adapter) = create_test_manager();
    let observer = RecordingObserver::new();
    manager.subscribe(observer.clone());

    let lapsed = Token::builder("vk", "short-lived")
        .expires_at(Utc::now() - chrono::Duration::minutes(5))
        .build()
        .unwrap();
    adapter.push_exchange_outcome(Ok(lapsed));
    authenticate(&manager).await;

    let err = manager.access_token("vk").await.unwrap_err();
    assert_eq!(err, AuthError::TokenExpiredIrrecoverably("vk".to_string()));
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Expired));
    assert!(manager.current_token("vk").is_none());
    assert_eq!(manager.last_error("vk"), Some(err));
    assert_eq!(
        observer.transitions().last(),
        Some(&(SessionPhase::Authenticated, SessionPhase::Expired))
    );
    assert_eq!(adapter.refresh_calls(), 0);

    assert!(matches!(manager.access_token("vk").await, Err(AuthError::NotAuthenticated(_))));
    assert!(manager.login("vk").is_ok());
}

#[tokio::test]
async fn test_refresh_expiring_sweeps_due_tokens() {
    let settings = ManagerSettings { refresh_threshold_seconds: 7200, ..ManagerSettings::default() };
    let manager = AuthManager::with_settings(&settings);
    let vk = Arc::new(MockProviderAdapter::new("vk").with_correlations(["c1"]));
    let google = Arc::new(MockProviderAdapter::new("google").with_correlations(["g1"]));
    manager.register_provider(vk.clone()).unwrap();
    manager.register_provider(google.clone()).unwrap();

    // vk: refreshable one-hour token; google: non-expiring token
    authenticate(&manager).await;
    google.push_exchange_outcome(Ok(Token::builder("google", "forever").build().unwrap()));
    manager.login("google").unwrap();
    manager.handle_callback("google", &callback("xyz", "g1")).await.unwrap();

    let results = manager.refresh_expiring().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.as_str(), "vk");
    tokio_test::assert_ok!(&results[0].1);
    assert_eq!(google.refresh_calls(), 0);
}

#[tokio::test]
async fn test_auto_refresh_task() {
    let settings = ManagerSettings { refresh_threshold_seconds: 7200, ..ManagerSettings::default() };
    let manager = Arc::new(AuthManager::with_settings(&settings));
    let adapter = Arc::new(MockProviderAdapter::new("vk").with_correlations(["c1"]));
    manager.register_provider(adapter.clone()).unwrap();
    authenticate(&manager).await;
    let mut events = manager.events();

    let handle = manager.spawn_auto_refresh(Duration::from_millis(10));

    let change = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let change = events.recv().await.unwrap();
            if change.from == SessionPhase::Refreshing {
                return change;
            }
        }
    })
    .await
    .unwrap();
    handle.abort();

    assert_eq!(change.to, SessionPhase::Authenticated);
    assert!(adapter.refresh_calls() >= 1);
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_from_every_phase() {
    let (manager, adapter) = create_test_manager();

    // Idle
    manager.logout("vk").await.unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));

    // Authorizing
    manager.login("vk").unwrap();
    manager.logout("vk").await.unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));

    // Authenticated
    authenticate(&manager).await;
    manager.logout("vk").await.unwrap();
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
    assert!(manager.current_token("vk").is_none());
    assert!(manager.last_error("vk").is_none());

    // Only the authenticated session had a token to revoke
    assert_eq!(adapter.revoke_calls(), 1);
}

#[tokio::test]
async fn test_logout_survives_revoke_failure() {
    let (manager, adapter) = create_test_manager();
    adapter.set_revoke_outcome(Err(AuthError::NetworkFailure("unreachable".into())));
    authenticate(&manager).await;

    manager.logout("vk").await.unwrap();

    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
    assert!(manager.current_token("vk").is_none());
    assert_eq!(adapter.revoke_calls(), 1);
}

// ============================================================================
// Events
// ============================================================================

/// Test that observers and broadcast receivers see every transition in order
#[tokio::test]
async fn test_state_change_events() {
    let (manager, _) = create_test_manager();
    let observer = RecordingObserver::new();
    let subscription = manager.subscribe(observer.clone());
    let mut receiver = manager.events();

    authenticate(&manager).await;
    manager.logout("vk").await.unwrap();

    let expected = vec![
        (SessionPhase::Idle, SessionPhase::Authorizing),
        (SessionPhase::Authorizing, SessionPhase::Exchanging),
        (SessionPhase::Exchanging, SessionPhase::Authenticated),
        (SessionPhase::Authenticated, SessionPhase::Idle),
    ];
    assert_eq!(observer.transitions(), expected);

    let mut broadcast = Vec::new();
    while let Ok(change) = receiver.try_recv() {
        broadcast.push((change.from, change.to));
    }
    assert_eq!(broadcast, expected);

    assert!(manager.unsubscribe(subscription));
    observer.clear();
    manager.login("vk").unwrap();
    assert!(observer.changes().is_empty());
}

#[tokio::test]
async fn test_failure_events_carry_error() {
    let (manager, _) = create_test_manager();
    let observer = RecordingObserver::new();
    manager.subscribe(observer.clone());
    manager.login("vk").unwrap();

    let denial = CallbackPayload::from_pairs([("error", "access_denied"), ("state", "c1")]);
    let _ = manager.handle_callback("vk", &denial).await;

    let last: StateChange = observer.changes().pop().unwrap();
    assert_eq!(last.to, SessionPhase::Failed);
    assert!(matches!(last.error, Some(AuthError::ProviderRejected { .. })));
    assert_eq!(last.provider.as_str(), "vk");
}

/// Validates that a mismatched callback emits no event
#[tokio::test]
async fn test_mismatch_emits_nothing() {
    let (manager, _) = create_test_manager();
    manager.login("vk").unwrap();
    let observer = RecordingObserver::new();
    manager.subscribe(observer.clone());

    let _ = manager.handle_callback("vk", &callback("abc", "c9")).await;

    assert!(observer.changes().is_empty());
}

#[tokio::test]
async fn test_observer_may_query_manager() {
    let (manager, _) = create_test_manager();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let weak = Arc::downgrade(&manager);
        let seen = Arc::clone(&seen);
        manager.subscribe(Arc::new(move |change: &StateChange| {
            if let Some(manager) = weak.upgrade() {
                seen.lock().push(manager.phase(change.provider.as_str()));
            }
        }));
    }

    manager.login("vk").unwrap();

    assert_eq!(*seen.lock(), vec![Some(SessionPhase::Authorizing)]);
}

/// Test event order when a transition lands while an observer is running
///
/// # Test Steps
/// 1. An observer stalls on the `Authorizing → Exchanging` change
/// 2. `cancel` runs on another thread while it is stalled
/// 3. Both observers and broadcast receivers see `Exchanging → Idle` last,
///    matching the final phase
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_keep_transition_order_under_contention() {
    let gate = Arc::new(Notify::new());
    let (manager, _) = create_manager_with(
        MockProviderAdapter::new("vk").with_correlations(["c1"]).with_exchange_gate(gate.clone()),
    );

    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let stall = parking_lot::Mutex::new((entered_tx, release_rx));
    manager.subscribe(Arc::new(move |change: &StateChange| {
        if change.to == SessionPhase::Exchanging {
            let stall = stall.lock();
            stall.0.send(()).ok();
            stall.1.recv().ok();
        }
    }));
    let recorder = RecordingObserver::new();
    manager.subscribe(recorder.clone());
    let mut receiver = manager.events();

    manager.login("vk").unwrap();
    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.handle_callback("vk", &callback("abc", "c1")).await })
    };

    tokio::task::spawn_blocking(move || entered_rx.recv()).await.unwrap().unwrap();
    manager.cancel("vk").unwrap();
    release_tx.send(()).unwrap();
    gate.notify_one();

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.unwrap_err(), AuthError::NoPendingAuthorization("vk".to_string()));

    let expected = vec![
        (SessionPhase::Idle, SessionPhase::Authorizing),
        (SessionPhase::Authorizing, SessionPhase::Exchanging),
        (SessionPhase::Exchanging, SessionPhase::Idle),
    ];
    let mut broadcast = Vec::new();
    while let Ok(change) = receiver.try_recv() {
        broadcast.push((change.from, change.to));
    }
    assert_eq!(broadcast, expected);
    assert_eq!(recorder.transitions(), expected);
    assert_eq!(manager.phase("vk"), Some(SessionPhase::Idle));
}

#[tokio::test]
async fn test_snapshot() {
    let (manager, _) = create_test_manager();
    assert!(manager.snapshot("ok").is_none());
    assert_eq!(manager.snapshot("vk").unwrap().phase, SessionPhase::Idle);

    manager.login("vk").unwrap();
    let pending = manager.snapshot("vk").unwrap();
    assert!(pending.awaiting_callback);
    assert!(pending.token.is_none());

    let token = manager.handle_callback("vk", &callback("abc", "c1")).await.unwrap();
    let done = manager.snapshot("vk").unwrap();
    assert_eq!(done.phase, SessionPhase::Authenticated);
    assert_eq!(done.token, Some(token));
}
