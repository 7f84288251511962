//! End-to-end session flows: sign-in form, persistence across restarts,
//! background expiry.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use laurel_app::client::ClientEffects;
use laurel_app::validation::rules::{email, min_length, required};
use laurel_app::{
    ClientError, FormConfig, FormController, LaurelClient, LifecyclePhase, LoginRequest, Record,
    RuleSet, SubmitOutcome,
};
use laurel_core::effects::{AppLifecycleEffects, AppState};
use laurel_core::{ClientConfig, HttpMethod};
use laurel_effects::{
    EncryptedFileSecureStorage, LifecycleSignal, RealTimeHandler, SecureStorageKey,
};
use laurel_testkit::{ControllableClock, MockSecureStorage, MockTransport};
use serde_json::json;

fn login_ok(transport: &MockTransport) {
    transport.respond(
        HttpMethod::Post,
        "/auth/login",
        200,
        json!({
            "success": true,
            "data": {
                "token": "tok-ada",
                "user": {"userKey": "u-1", "username": "ada", "email": "ada@example.com"}
            }
        }),
    );
    transport.respond(
        HttpMethod::Get,
        "/users/profile",
        200,
        json!({
            "success": true,
            "data": {"userKey": "u-1", "username": "ada", "email": "ada@example.com", "points": 40}
        }),
    );
}

fn sign_in_form() -> FormController {
    let rules = RuleSet::new()
        .field("email", [required().with_message("Email is required"), email()])
        .field("password", [required(), min_length(8)]);
    let initial: Record = serde_json::from_value(json!({"email": "", "password": ""})).unwrap();
    FormController::new(initial, rules, FormConfig::default())
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn double_tap_on_sign_in_sends_one_request() {
    let transport = MockTransport::new();
    login_ok(&transport);
    transport.set_latency(Duration::from_millis(250));
    let storage = MockSecureStorage::new();
    let client = LaurelClient::new(
        ClientConfig::default(),
        ClientEffects {
            transport: Arc::new(transport.clone()),
            secure_storage: Arc::new(storage.clone()),
            time: Arc::new(ControllableClock::default()),
            lifecycle: None,
        },
    )
    .unwrap();

    let form = sign_in_form();
    let blank = form
        .handle_submit(|_| async { Ok::<_, ClientError>(()) })
        .await
        .unwrap();
    assert_eq!(blank, SubmitOutcome::Invalid);
    assert_eq!(form.error("email").as_deref(), Some("Email is required"));

    form.set_field_value("email", "ada@example.com");
    form.set_field_value("password", "correct horse");
    assert_eq!(form.error("email"), None);
    let request: LoginRequest = form.values_as().unwrap();

    let submit = || {
        let client = client.clone();
        let request = request.clone();
        move |_: Record| async move { client.sign_in(&request).await }
    };
    let (first, second) = tokio::join!(form.handle_submit(submit()), form.handle_submit(submit()));

    assert_eq!(first.unwrap(), SubmitOutcome::Submitted);
    assert_eq!(second.unwrap(), SubmitOutcome::AlreadySubmitting);
    assert_eq!(transport.call_count(HttpMethod::Post, "/auth/login"), 1);
    assert!(!form.is_submitting());
    assert!(client.session().is_authenticated());

    let profile = client.session().get_user_profile().await.unwrap();
    assert_eq!(profile.attributes.get("points"), Some(&json!(40)));
    let profile_request = transport
        .requests()
        .into_iter()
        .find(|r| r.path == "/users/profile")
        .unwrap();
    assert_eq!(profile_request.header("Authorization"), Some("Bearer tok-ada"));
}

#[tokio::test]
async fn session_survives_restart_in_encrypted_storage() {
    let dir = tempfile::tempdir().unwrap();
    let key = SecureStorageKey::generate();
    let transport = MockTransport::new();
    login_ok(&transport);

    let build = || {
        LaurelClient::new(
            ClientConfig::default(),
            ClientEffects {
                transport: Arc::new(transport.clone()),
                secure_storage: Arc::new(EncryptedFileSecureStorage::new(dir.path(), &key)),
                time: Arc::new(RealTimeHandler::new()),
                lifecycle: None,
            },
        )
        .unwrap()
    };

    let first = build();
    assert!(!first.restore_session().await);
    first
        .sign_in(&LoginRequest {
            email: "ada@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();
    drop(first);

    let second = build();
    assert!(second.restore_session().await);
    let state = second.session().snapshot();
    assert_eq!(state.credentials.map(|c| c.username), Some("ada".to_string()));
    assert!(!state.profile_fetched);
    assert_eq!(transport.call_count(HttpMethod::Get, "/users/profile"), 0);

    second.sign_out().await.unwrap();
    second.sign_out().await.unwrap();
    assert!(!build().restore_session().await);
}

#[tokio::test(start_paused = true)]
async fn prolonged_background_signs_out_silently() {
    let transport = MockTransport::new();
    login_ok(&transport);
    let storage = MockSecureStorage::new();
    let signal = Arc::new(LifecycleSignal::new());
    let lifecycle: Arc<dyn AppLifecycleEffects> = signal.clone();
    let client = LaurelClient::new(
        ClientConfig::default(),
        ClientEffects {
            transport: Arc::new(transport.clone()),
            secure_storage: Arc::new(storage.clone()),
            time: Arc::new(ControllableClock::default()),
            lifecycle: Some(lifecycle),
        },
    )
    .unwrap();

    client
        .sign_in(&LoginRequest {
            email: "ada@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();
    let mut updates = client.session().subscribe();

    signal.emit(AppState::Background);
    settle().await;
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    signal.emit(AppState::Active);
    settle().await;
    assert!(client.session().is_authenticated());
    assert_eq!(client.session().lifecycle_phase(), Some(LifecyclePhase::Active));

    signal.emit(AppState::Inactive);
    settle().await;
    tokio::time::advance(Duration::from_secs(5 * 60)).await;
    settle().await;

    assert!(!client.session().is_authenticated());
    assert!(storage.is_empty());
    updates.changed().await.unwrap();
    assert!(!updates.borrow().is_authenticated);
    assert!(client.credentials().load().await.is_none());
}

#[tokio::test]
async fn profile_401_ends_the_session() {
    let transport = MockTransport::new();
    login_ok(&transport);
    transport.respond(
        HttpMethod::Get,
        "/users/profile",
        401,
        json!({"success": false, "message": "Token revoked"}),
    );
    let storage = MockSecureStorage::new();
    let client = LaurelClient::new(
        ClientConfig::default(),
        ClientEffects {
            transport: Arc::new(transport.clone()),
            secure_storage: Arc::new(storage.clone()),
            time: Arc::new(ControllableClock::default()),
            lifecycle: None,
        },
    )
    .unwrap();

    client
        .sign_in(&LoginRequest {
            email: "ada@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();
    assert_eq!(client.session().get_user_profile().await, None);
    assert!(!client.session().is_authenticated());
    assert!(storage.is_empty());

    let err = client.users().profile().await.unwrap_err();
    assert_matches!(err.status_code, Some(401));
    assert_eq!(
        transport.requests().last().and_then(|r| r.header("Authorization").map(str::to_string)),
        None
    );
}
