//! Password reset flow over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{TestApp, PASSWORD};
use pagekeeper_backend::error::AppError;

const NEW_PASSWORD: &str = "Brand-New-Pass-42!";

async fn request_code(app: &TestApp, email: &str) -> String {
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/password-reset/request",
            None,
            Some(json!({ "email": email })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.mailer.reset_code_for(email).unwrap()
}

async fn verify(app: &TestApp, email: &str, code: &str, password: &str) -> (StatusCode, serde_json::Value) {
    app.request(
        Method::POST,
        "/api/v1/auth/password-reset/verify",
        None,
        Some(json!({ "email": email, "code": code, "new_password": password })),
    )
    .await
}

fn wrong(code: &str) -> String {
    if code == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

#[tokio::test]
async fn test_unknown_email_is_accepted_silently() {
    let app = TestApp::new();
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/auth/password-reset/request",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_reset_replaces_password_and_ends_sessions() {
    let app = TestApp::new();
    app.seed_user("ana@example.com", false).await;
    let (_, old_session) = app
        .state
        .auth
        .authenticate("ana@example.com", PASSWORD)
        .await
        .unwrap();

    let code = request_code(&app, "ana@example.com").await;
    let (status, _) = verify(&app, "ana@example.com", &code, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);

    assert!(matches!(
        app.state.auth.authenticate("ana@example.com", PASSWORD).await,
        Err(AppError::Unauthenticated(_))
    ));
    assert!(app
        .state
        .auth
        .authenticate("ana@example.com", NEW_PASSWORD)
        .await
        .is_ok());
    assert!(matches!(
        app.state.auth.refresh(&old_session.refresh_token).await,
        Err(AppError::Unauthenticated(_))
    ));

    // Single use
    let (status, body) = verify(&app, "ana@example.com", &code, "Another-Pass-77!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_wrong_code_and_unknown_email_look_the_same() {
    let app = TestApp::new();
    app.seed_user("ana@example.com", false).await;
    let code = request_code(&app, "ana@example.com").await;

    let (s1, wrong_code) = verify(&app, "ana@example.com", &wrong(&code), NEW_PASSWORD).await;
    let (s2, unknown) = verify(&app, "ghost@example.com", &code, NEW_PASSWORD).await;
    assert_eq!(s1, StatusCode::BAD_REQUEST);
    assert_eq!(s2, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_code["message"], unknown["message"]);
}

#[tokio::test]
async fn test_code_locks_after_max_attempts() {
    let app = TestApp::with_config(|c| c.reset_code_max_attempts = 3);
    app.seed_user("ana@example.com", false).await;
    let code = request_code(&app, "ana@example.com").await;

    for _ in 0..3 {
        let (status, _) = verify(&app, "ana@example.com", &wrong(&code), NEW_PASSWORD).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = verify(&app, "ana@example.com", &code, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Too many attempts"));

    // A fresh code starts a new budget
    let fresh = request_code(&app, "ana@example.com").await;
    let (status, _) = verify(&app, "ana@example.com", &fresh, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_new_request_invalidates_previous_code() {
    let app = TestApp::new();
    app.seed_user("ana@example.com", false).await;
    let first = request_code(&app, "ana@example.com").await;
    let second = request_code(&app, "ana@example.com").await;

    if first != second {
        let (status, _) = verify(&app, "ana@example.com", &first, NEW_PASSWORD).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, _) = verify(&app, "ana@example.com", &second, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let app = TestApp::with_config(|c| c.reset_code_ttl_minutes = 0);
    app.seed_user("ana@example.com", false).await;
    let code = request_code(&app, "ana@example.com").await;

    let (status, _) = verify(&app, "ana@example.com", &code, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_weak_new_password_is_rejected_without_consuming_code() {
    let app = TestApp::new();
    app.seed_user("ana@example.com", false).await;
    let code = request_code(&app, "ana@example.com").await;

    let (status, body) = verify(&app, "ana@example.com", &code, "weak").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = verify(&app, "ana@example.com", &code, NEW_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}
