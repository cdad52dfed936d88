// SPDX-License-Identifier: MIT

//! Integration tests driving the full axum [`Router`] through
//! `tower::ServiceExt::oneshot`, against [`InMemoryStore`] and the
//! test-support fakes instead of a mocked HTTP client.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use shp_api::{ApiConfig, AppState};
use shp_core::model::{Experiment, User, UserRole};
use shp_core::QuotaDefaults;
use shp_herd::DryRunHerd;
use shp_notify::FakeNotifyAdapter;
use shp_store::{InMemoryStore, Store};

fn test_state() -> AppState {
    let store: Arc<dyn shp_store::Store> = Arc::new(InMemoryStore::new());
    let herd: Arc<dyn shp_herd::Herd> = Arc::new(DryRunHerd::new(Vec::new()).unwrap());
    let mail: Arc<dyn shp_notify::NotifyAdapter> = Arc::new(FakeNotifyAdapter::new());
    let quota_defaults = Arc::new(QuotaDefaults {
        duration: chrono::Duration::minutes(60),
        storage_bytes: 1_000,
        experiment_root: "/tmp".into(),
    });
    let config = Arc::new(ApiConfig { jwt_secret: "test-secret".to_string(), ..ApiConfig::default() });
    AppState::new(store, herd, mail, quota_defaults, config)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn insert_user(state: &AppState, email: &str, password: &str, role: UserRole) {
    let user = User {
        password_hash: shp_api::auth::hash_password(password).unwrap(),
        role,
        disabled: false,
        email_confirmed_at: Some(Utc::now()),
        ..User::builder().email(email).build()
    };
    state.store.insert_user(&user).await.unwrap();
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

async fn login(state: &AppState, email: &str, password: &str) -> String {
    let app = shp_api::router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri("/auth/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={email}&password={password}")))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn token_rejects_unverified_account() {
    let state = test_state();
    let user = User::builder().email("pending@test.com").password_hash(shp_api::auth::hash_password("secret").unwrap()).build();
    state.store.insert_user(&user).await.unwrap();

    let app = shp_api::router(state);
    let req = Request::builder()
        .method("POST")
        .uri("/auth/token")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("username=pending@test.com&password=secret"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_issues_bearer_for_verified_account() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn get_current_requires_bearer_token() {
    let state = test_state();
    let app = shp_api::router(state);
    let req = Request::builder().uri("/user").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_verify_approve_then_authenticate() {
    let state = test_state();

    let app = shp_api::router(state.clone());
    let body = json!({
        "email": "new@test.com",
        "password": "s3cret!",
        "first_name": "New",
        "last_name": "User",
        "group": "lab1",
    });
    let req = Request::builder()
        .method("POST")
        .uri("/user/register")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Freshly registered, unverified and unapproved: cannot authenticate.
    let mut user = state.store.find_user_by_email("new@test.com").await.unwrap().unwrap();
    assert!(!user.can_authenticate());
    let verification_token = user.token_verification.clone().unwrap();

    let app = shp_api::router(state.clone());
    let req = Request::builder().uri(format!("/user/verify/{verification_token}")).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    user = state.store.find_user_by_email("new@test.com").await.unwrap().unwrap();
    assert!(user.email_confirmed_at.is_some());
    // Still disabled pending admin approval.
    assert!(!user.can_authenticate());

    insert_user(&state, "admin@test.com", "adminpass", UserRole::Admin).await;
    let admin_token = login(&state, "admin@test.com", "adminpass").await;

    let app = shp_api::router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri("/user/approve")
        .header("authorization", bearer(&admin_token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "email": "new@test.com" }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let token = login(&state, "new@test.com", "s3cret!").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn submit_then_get_and_list_mine() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;

    let experiment = Experiment::builder().name("smoke-test").build();
    let app = shp_api::router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri("/experiment")
        .header("authorization", bearer(&token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&experiment).unwrap()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap().to_string();

    let app = shp_api::router(state.clone());
    let req = Request::builder().uri("/experiment").header("authorization", bearer(&token)).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let states = body_json(resp).await;
    assert!(states.as_object().unwrap().contains_key(&id));
}

#[tokio::test]
async fn submit_rejects_duration_over_quota() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;

    let experiment = Experiment::builder().duration(chrono::Duration::hours(48)).build();
    let app = shp_api::router(state);
    let req = Request::builder()
        .method("POST")
        .uri("/experiment")
        .header("authorization", bearer(&token))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&experiment).unwrap()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn schedule_rejects_when_over_storage_quota() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;

    let mut xp = shp_core::model::WebExperiment::submit("alice@test.com", Experiment::builder().build(), Utc::now());
    xp.result_size = 10_000; // over the 1_000 byte test quota
    state.store.insert_experiment(&xp).await.unwrap();

    let app = shp_api::router(state);
    let req = Request::builder()
        .method("POST")
        .uri(format!("/experiment/{}/schedule", xp.id))
        .header("authorization", bearer(&token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert_eq!(body["storage_quota_gib"], json!("0.000"));
}

#[tokio::test]
async fn schedule_succeeds_within_quota_then_rejects_second_schedule() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;

    let xp = shp_core::model::WebExperiment::submit("alice@test.com", Experiment::builder().build(), Utc::now());
    state.store.insert_experiment(&xp).await.unwrap();

    let app = shp_api::router(state.clone());
    let req = Request::builder()
        .method("POST")
        .uri(format!("/experiment/{}/schedule", xp.id))
        .header("authorization", bearer(&token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // The record left `created` state; a second schedule request is a conflict.
    let app = shp_api::router(state);
    let req = Request::builder()
        .method("POST")
        .uri(format!("/experiment/{}/schedule", xp.id))
        .header("authorization", bearer(&token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn experiment_owned_by_another_user_is_forbidden() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    insert_user(&state, "bob@test.com", "hunter3", UserRole::User).await;
    let bob_token = login(&state, "bob@test.com", "hunter3").await;

    let xp = shp_core::model::WebExperiment::submit("alice@test.com", Experiment::builder().build(), Utc::now());
    state.store.insert_experiment(&xp).await.unwrap();

    let app = shp_api::router(state);
    let req = Request::builder()
        .uri(format!("/experiment/{}", xp.id))
        .header("authorization", bearer(&bob_token))
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn testbed_command_requires_elevated_role() {
    let state = test_state();
    insert_user(&state, "alice@test.com", "hunter2", UserRole::User).await;
    let token = login(&state, "alice@test.com", "hunter2").await;

    let app = shp_api::router(state);
    let req = Request::builder().uri("/testbed/command").header("authorization", bearer(&token)).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn testbed_command_lists_commands_for_admin() {
    let state = test_state();
    insert_user(&state, "admin@test.com", "adminpass", UserRole::Admin).await;
    let token = login(&state, "admin@test.com", "adminpass").await;

    let app = shp_api::router(state);
    let req = Request::builder().uri("/testbed/command").header("authorization", bearer(&token)).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let commands = body_json(resp).await;
    assert!(commands.as_array().unwrap().iter().any(|c| c == "restart"));
    assert!(commands.as_array().unwrap().iter().any(|c| c == "start-scheduler"));
}
