//! End-to-end auth and workspace authorization flows
//!
//! Drives the full router in-process with `tower::oneshot` against
//! tempfile-backed SQLite databases. No network, no prebuilt binary.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tower::util::ServiceExt;

use ledgerdesk_backend::{
    api::{create_router, AppState},
    auth::{AuthState, JwtHandler, TokenLedger, UserStore},
    workspace::{WorkspaceState, WorkspaceStore},
};

struct TestApp {
    router: Router,
    user_store: Arc<UserStore>,
    _temp: NamedTempFile,
}

fn test_app() -> TestApp {
    test_app_with_access_ttl(15)
}

fn test_app_with_access_ttl(access_ttl_minutes: i64) -> TestApp {
    let temp = NamedTempFile::new().unwrap();
    let db_path = temp.path().to_str().unwrap();

    let user_store = Arc::new(UserStore::new(db_path).unwrap());
    let token_ledger = Arc::new(TokenLedger::new(db_path, 7).unwrap());
    let workspace_store = Arc::new(WorkspaceStore::new(db_path, 7).unwrap());
    let jwt_handler = Arc::new(JwtHandler::new(
        "test-secret-key-12345".to_string(),
        access_ttl_minutes,
    ));

    let state = AppState {
        auth: AuthState::new(
            user_store.clone(),
            token_ledger,
            jwt_handler,
            false,
        ),
        workspace: WorkspaceState::new(workspace_store, user_store.clone()),
    };

    TestApp {
        router: create_router(state),
        user_store,
        _temp: temp,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));
    (status, value)
}

async fn register(app: &Router, email: &str, password: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": email, "password": password, "name": name})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();

    let (status, body) = send(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_register_login_refresh_logout_cycle() {
    let app = test_app();

    // Register returns a full token pair.
    let registered = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access = registered["access_token"].as_str().unwrap().to_string();
    let refresh1 = registered["refresh_token"].as_str().unwrap().to_string();
    assert_eq!(registered["user"]["email"], "a@x.com");

    // Login issues another independent pair.
    let (status, logged_in) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "A@X.com", "password": "pw12345678"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(logged_in["refresh_token"], registered["refresh_token"]);

    // Rotation: the old refresh token is consumed, a new one comes back.
    let (status, refreshed) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh2 = refreshed["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(refresh1, refresh2);

    // The consumed token validates exactly once; replay is rejected.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh1})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Logout kills the rotated token.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/logout",
        None,
        Some(json!({"refresh_token": refresh2})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh2})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Access and refresh lifetimes are decoupled: the original access token
    // still resolves identity after every refresh token is gone.
    let (status, me) = send(&app.router, "GET", "/api/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "a@x.com");
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = test_app();
    register(&app.router, "a@x.com", "pw12345678", "Alice").await;

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "a@x.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "nobody@x.com", "password": "pw12345678"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_validation_and_conflict() {
    let app = test_app();
    register(&app.router, "a@x.com", "pw12345678", "Alice").await;

    // Same email, different case: conflict.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": "A@X.COM", "password": "pw12345678", "name": "Dupe"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Short password.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({"email": "b@x.com", "password": "short", "name": "Bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let app = test_app();

    let registered = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access = registered["access_token"].as_str().unwrap().to_string();
    let refresh_a = registered["refresh_token"].as_str().unwrap().to_string();

    // Second device.
    let (_, second) = send(
        &app.router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "a@x.com", "password": "pw12345678"})),
    )
    .await;
    let refresh_b = second["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app.router,
        "POST",
        "/api/auth/logout-all",
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Every previously issued refresh token is dead.
    for refresh in [refresh_a, refresh_b] {
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_missing_and_invalid_tokens_rejected() {
    let app = test_app();

    let (status, _) = send(&app.router, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        "GET",
        "/api/auth/me",
        Some("not.a.token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleted_user_token_rejected() {
    let app = test_app();

    let registered = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access = registered["access_token"].as_str().unwrap().to_string();
    let user_id = registered["user"]["id"].as_str().unwrap().to_string();

    app.user_store
        .delete_user(&user_id.parse().unwrap())
        .unwrap();

    // Token signature is still valid, but the subject is gone.
    let (status, body) = send(&app.router, "GET", "/api/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::String("User not found".to_string()));
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    let app = test_app_with_access_ttl(-5);

    let registered = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access = registered["access_token"].as_str().unwrap().to_string();

    let (status, _) = send(&app.router, "GET", "/api/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn create_workspace(app: &Router, access: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/workspaces",
        Some(access),
        Some(json!({"name": name})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "workspace creation failed: {}", body);
    body
}

#[tokio::test]
async fn test_workspace_isolation() {
    let app = test_app();

    let a = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let b = register(&app.router, "b@x.com", "pw12345678", "Bob").await;
    let access_a = a["access_token"].as_str().unwrap();
    let access_b = b["access_token"].as_str().unwrap();

    let w1 = create_workspace(&app.router, access_a, "Alice FX").await;
    let w1_id = w1["workspace"]["id"].as_str().unwrap();
    create_workspace(&app.router, access_b, "Bob FX").await;

    // B is a valid, authenticated user but has no membership in W1.
    let uri = format!("/api/workspaces/{}/members", w1_id);
    let (status, body) = send(&app.router, "GET", &uri, Some(access_b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, Value::String("Access denied".to_string()));

    // A sees its own members.
    let (status, members) = send(&app.router, "GET", &uri, Some(access_a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_workspace_id_rejected() {
    let app = test_app();

    let a = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access = a["access_token"].as_str().unwrap();

    let (status, body) = send(
        &app.router,
        "GET",
        "/api/workspaces/not-a-uuid/members",
        Some(access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, Value::String("Workspace ID required".to_string()));
}

#[tokio::test]
async fn test_invitation_accept_promotes_and_role_gates() {
    let app = test_app();

    let a = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let b = register(&app.router, "b@x.com", "pw12345678", "Bob").await;
    let access_a = a["access_token"].as_str().unwrap();
    let access_b = b["access_token"].as_str().unwrap();

    let w = create_workspace(&app.router, access_a, "Shared FX").await;
    let w_id = w["workspace"]["id"].as_str().unwrap();
    assert_eq!(w["workspace"]["kind"], "SOLE_TRADER");
    let owner_member_id = w["membership"]["id"].as_str().unwrap();

    // Owner invites Bob with a 30% split.
    let inv_uri = format!("/api/workspaces/{}/invitations", w_id);
    let (status, invitation) = send(
        &app.router,
        "POST",
        &inv_uri,
        Some(access_a),
        Some(json!({"email": "B@x.com", "profit_split": 30.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = invitation["token"].as_str().unwrap();

    // A second pending invitation for the same email conflicts.
    let (status, _) = send(
        &app.router,
        "POST",
        &inv_uri,
        Some(access_a),
        Some(json!({"email": "b@x.com", "profit_split": 40.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bob accepts; the workspace promotes to PARTNERSHIP.
    let (status, accepted) = send(
        &app.router,
        "POST",
        "/api/invitations/accept",
        Some(access_b),
        Some(json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "acceptance failed: {}", accepted);
    assert_eq!(accepted["workspace"]["kind"], "PARTNERSHIP");
    assert_eq!(accepted["membership"]["role"], "MEMBER");
    let bob_member_id = accepted["membership"]["id"].as_str().unwrap().to_string();

    // The single-use token cannot be replayed.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/invitations/accept",
        Some(access_b),
        Some(json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // MEMBER role cannot reach admin routes; the flat role set for these
    // routes is {OWNER, ADMIN}. Repeating the check gives the same answer.
    let remove_uri = format!("/api/workspaces/{}/members/{}", w_id, owner_member_id);
    for _ in 0..2 {
        let (status, body) = send(&app.router, "DELETE", &remove_uri, Some(access_b), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, Value::String("Insufficient permissions".to_string()));
    }

    // Even the owner cannot remove the owner member.
    let (status, _) = send(&app.router, "DELETE", &remove_uri, Some(access_a), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Removing Bob works, and the workspace stays a partnership.
    let remove_bob = format!("/api/workspaces/{}/members/{}", w_id, bob_member_id);
    let (status, _) = send(&app.router, "DELETE", &remove_bob, Some(access_a), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let ws_uri = format!("/api/workspaces/{}", w_id);
    let (status, ws) = send(&app.router, "GET", &ws_uri, Some(access_a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ws["workspace"]["kind"], "PARTNERSHIP");
}

#[tokio::test]
async fn test_invitation_email_mismatch_rejected() {
    let app = test_app();

    let a = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let c = register(&app.router, "c@x.com", "pw12345678", "Carol").await;
    let access_a = a["access_token"].as_str().unwrap();
    let access_c = c["access_token"].as_str().unwrap();

    let w = create_workspace(&app.router, access_a, "Shared FX").await;
    let w_id = w["workspace"]["id"].as_str().unwrap();

    let (_, invitation) = send(
        &app.router,
        "POST",
        &format!("/api/workspaces/{}/invitations", w_id),
        Some(access_a),
        Some(json!({"email": "b@x.com", "profit_split": 30.0})),
    )
    .await;
    let token = invitation["token"].as_str().unwrap();

    // Carol holds the token but the invite names b@x.com.
    let (status, _) = send(
        &app.router,
        "POST",
        "/api/invitations/accept",
        Some(access_c),
        Some(json!({"token": token})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_update_member_split() {
    let app = test_app();

    let a = register(&app.router, "a@x.com", "pw12345678", "Alice").await;
    let access_a = a["access_token"].as_str().unwrap();

    let w = create_workspace(&app.router, access_a, "Solo FX").await;
    let w_id = w["workspace"]["id"].as_str().unwrap();
    let member_id = w["membership"]["id"].as_str().unwrap();

    let split_uri = format!("/api/workspaces/{}/members/{}/split", w_id, member_id);

    // Off-100 totals are allowed (soft invariant).
    let (status, updated) = send(
        &app.router,
        "PUT",
        &split_uri,
        Some(access_a),
        Some(json!({"profit_split": 60.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["profit_split"], 60.0);

    // Out-of-range splits are not.
    let (status, _) = send(
        &app.router,
        "PUT",
        &split_uri,
        Some(access_a),
        Some(json!({"profit_split": 130.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
