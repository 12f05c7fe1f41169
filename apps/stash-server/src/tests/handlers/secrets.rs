//! Secret handler tests.

use axum::http::StatusCode;
use serde_json::{json, Value};
use stash_analytics::{Channel, EventName};
use stash_storage::{Scope, SecretId, WorkspaceId};
use uuid::Uuid;

use crate::tests::common::*;

fn scope_uri(ws: Uuid, env: &str, tail: &str) -> String {
    format!("/api/v2/workspace/{ws}/environment/{env}/{tail}")
}

fn list_uri(ws: Uuid, env: &str) -> String {
    format!("/api/v2/workspace/{ws}/secrets?environment={env}")
}

fn id_of(v: &Value) -> String {
    v["id"].as_str().unwrap().to_string()
}

// ─────────────────────────────────────── Create ────────────────────────────────────────

#[tokio::test]
async fn create_secret_assigns_id_and_version() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let ws = Uuid::new_v4();
    let user = new_user();

    let mut payload = secret_payload("shared", "db");
    // Attributes outside the allow-list are dropped.
    payload["version"] = json!(42);
    payload["id"] = json!(Uuid::new_v4());
    payload["workspaceId"] = json!(Uuid::new_v4());
    payload["comment"] = json!({"ciphertext": "c", "iv": "i", "authTag": "t"});

    let (status, body) = Call::post(scope_uri(ws, "dev", "secret"))
        .as_user(user)
        .email("dev@example.com")
        .user_agent("stash-cli/0.1.0")
        .json(json!({ "secret": payload }))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::OK);
    let secret = &body["secret"];
    assert_eq!(secret["version"], 1);
    assert_eq!(secret["workspaceId"], ws.to_string());
    assert_eq!(secret["environment"], "dev");
    assert_eq!(secret["type"], "shared");
    assert!(secret.get("ownerUserId").is_none());
    assert_eq!(secret["key"]["ciphertext"], "ct-db-key");
    assert_eq!(secret["comment"]["hash"], "");
    assert_ne!(id_of(secret), payload["id"].as_str().unwrap());

    let events = events_after(&analytics, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventName::SecretsAdded);
    assert_eq!(events[0].distinct_id, "dev@example.com");
    assert_eq!(events[0].properties.number_of_secrets, 1);
    assert_eq!(events[0].properties.channel, Channel::Cli);
    assert_eq!(events[0].properties.environment, "dev");
}

#[tokio::test]
async fn create_personal_secret_is_owned_by_caller() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);
    let user = new_user();

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(user)
        .json(json!({ "secret": secret_payload("personal", "p") }))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["ownerUserId"], user.0.to_string());
}

#[tokio::test]
async fn create_secret_validation_error() {
    let (server, analytics) = test_server().await;
    let app = app(&server);

    let mut payload = secret_payload("shared", "x");
    payload["value"]["iv"] = json!("");

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": payload }))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "validation_error");
    assert_eq!(body["code"], 400);
    assert!(body["message"].as_str().unwrap().contains("iv"));

    // No event on failure.
    assert!(settled_events(&analytics).await.is_empty());
}

#[tokio::test]
async fn create_secret_requires_caller() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .json(json!({ "secret": secret_payload("shared", "x") }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "unauthenticated");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "nope": true }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "bad_request");
}

#[tokio::test]
async fn malformed_workspace_id_is_bad_request() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);

    let (status, body) = Call::post("/api/v2/workspace/not-a-uuid/environment/dev/secret")
        .as_user(new_user())
        .json(json!({ "secret": secret_payload("shared", "x") }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "bad_request");
}

#[tokio::test]
async fn create_secrets_bulk() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let ws = Uuid::new_v4();

    let (status, body) = Call::post(scope_uri(ws, "dev", "secrets"))
        .as_user(new_user())
        .user_agent("Mozilla/5.0 (Macintosh)")
        .json(json!({ "secrets": [
            secret_payload("shared", "a"),
            secret_payload("shared", "b"),
            secret_payload("shared", "c"),
        ]}))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::OK);
    let secrets = body["secrets"].as_array().unwrap();
    assert_eq!(secrets.len(), 3);
    assert!(secrets.iter().all(|s| s["version"] == 1));

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].event, EventName::SecretsAdded);
    assert_eq!(events[0].properties.number_of_secrets, 3);
    assert_eq!(events[0].properties.channel, Channel::Web);
}

#[tokio::test]
async fn create_secrets_bulk_is_all_or_nothing() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let ws = Uuid::new_v4();
    let user = new_user();

    let mut broken = secret_payload("shared", "b");
    broken["key"]["hash"] = json!("");

    let (status, body) = Call::post(scope_uri(ws, "dev", "secrets"))
        .as_user(user)
        .json(json!({ "secrets": [secret_payload("shared", "a"), broken] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("secrets[1]"));

    let (_, listed) = Call::get(list_uri(ws, "dev")).as_user(user).send(&app).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    // Only the list produced an event.
    let events = settled_events(&analytics).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventName::SecretsPulled);
}

// ──────────────────────────────────────── Read ─────────────────────────────────────────

#[tokio::test]
async fn personal_secrets_are_private_to_their_owner() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);
    let ws = Uuid::new_v4();
    let u1 = new_user();
    let u2 = new_user();

    let (_, created) = Call::post(scope_uri(ws, "dev", "secret"))
        .as_user(u1)
        .json(json!({ "secret": secret_payload("personal", "s1") }))
        .send(&app)
        .await;
    let s1 = id_of(&created["secret"]);

    Call::post(scope_uri(ws, "dev", "secret"))
        .as_user(u2)
        .json(json!({ "secret": secret_payload("shared", "team") }))
        .send(&app)
        .await;

    let (status, for_u2) = Call::get(list_uri(ws, "dev")).as_user(u2).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    let ids_u2: Vec<String> = for_u2.as_array().unwrap().iter().map(id_of).collect();
    assert_eq!(ids_u2.len(), 1);
    assert!(!ids_u2.contains(&s1));

    let (_, for_u1) = Call::get(list_uri(ws, "dev")).as_user(u1).send(&app).await;
    let ids_u1: Vec<String> = for_u1.as_array().unwrap().iter().map(id_of).collect();
    assert_eq!(ids_u1.len(), 2);
    assert!(ids_u1.contains(&s1));

    // No caller: shared only.
    let (status, anonymous) = Call::get(list_uri(ws, "dev")).send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anonymous.as_array().unwrap().len(), 1);
    assert!(anonymous[0].get("ownerUserId").is_none());
}

#[tokio::test]
async fn get_secrets_is_scoped_to_environment() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let ws = Uuid::new_v4();
    let user = new_user();

    for env in ["dev", "prod"] {
        Call::post(scope_uri(ws, env, "secret"))
            .as_user(user)
            .json(json!({ "secret": secret_payload("shared", env) }))
            .send(&app)
            .await;
    }

    let (_, listed) = Call::get(list_uri(ws, "prod")).as_user(user).send(&app).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["environment"], "prod");

    let events = events_after(&analytics, 3).await;
    let pulled = events
        .iter()
        .find(|e| e.event == EventName::SecretsPulled)
        .unwrap();
    assert_eq!(pulled.properties.number_of_secrets, 1);
    assert_eq!(pulled.distinct_id, user.to_string());
}

#[tokio::test]
async fn get_secrets_requires_environment_query() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);

    let (status, body) = Call::get(format!("/api/v2/workspace/{}/secrets", Uuid::new_v4()))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "bad_request");
}

#[tokio::test]
async fn anonymous_pull_uses_anonymous_actor() {
    let (server, analytics) = test_server().await;
    let app = app(&server);

    Call::get(list_uri(Uuid::new_v4(), "dev")).send(&app).await;

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].distinct_id, "anonymous");
    assert_eq!(events[0].properties.number_of_secrets, 0);
}

#[tokio::test]
async fn get_secret_by_id() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let owner = new_user();
    let record = server
        .store
        .create_secret(&personal_secret(&scope, owner))
        .await
        .unwrap();

    let (status, body) = Call::get(format!("/api/v2/secret/{}", record.id))
        .as_user(owner)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["id"], record.id.to_string());

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].event, EventName::SecretsPulled);
    assert_eq!(events[0].properties.number_of_secrets, 1);
}

#[tokio::test]
async fn get_secret_not_found_and_forbidden() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server
        .store
        .create_secret(&personal_secret(&scope, new_user()))
        .await
        .unwrap();

    let (status, body) = Call::get(format!("/api/v2/secret/{}", SecretId::new()))
        .as_user(new_user())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "not_found");

    let (status, body) = Call::get(format!("/api/v2/secret/{}", record.id))
        .as_user(new_user())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "permission_denied");

    let (status, _) = Call::get(format!("/api/v2/secret/{}", record.id))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(settled_events(&analytics).await.is_empty());
}

// ─────────────────────────────────────── Update ────────────────────────────────────────

#[tokio::test]
async fn update_secret_bumps_version_and_returns_record() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server.store.create_secret(&shared_secret(&scope)).await.unwrap();

    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": {
            "id": record.id,
            "value": triple("rotated"),
            "version": 100,
        }}))
        .send(&app)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["version"], 2);
    assert_eq!(body["secret"]["value"]["ciphertext"], "ct-rotated");
    assert_eq!(body["secret"]["key"]["ciphertext"], "ct-key");

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].event, EventName::SecretsModified);
    assert_eq!(events[0].properties.number_of_secrets, 1);
}

#[tokio::test]
async fn update_secret_with_stale_expected_version_conflicts() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let uri = scope_uri(scope.workspace_id.0, "dev", "secret");
    let user = new_user();

    let (status, _) = Call::patch(&uri)
        .as_user(user)
        .json(json!({ "secret": { "id": record.id, "value": triple("a"), "expectedVersion": 1 }}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = Call::patch(&uri)
        .as_user(user)
        .json(json!({ "secret": { "id": record.id, "value": triple("b"), "expectedVersion": 1 }}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "conflict");

    let current = server.store.get_secret(&record.id).await.unwrap();
    assert_eq!(current.version, 2);
    assert_eq!(current.value.ciphertext, "ct-a");

    assert_eq!(events_after(&analytics, 1).await.len(), 1);
    assert_eq!(settled_events(&analytics).await.len(), 1);
}

#[tokio::test]
async fn update_secret_outside_scope_is_denied() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server.store.create_secret(&shared_secret(&scope)).await.unwrap();

    // Same workspace, wrong environment.
    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "prod", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": { "id": record.id, "value": triple("x") }}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "permission_denied");
    assert_eq!(server.store.get_secret(&record.id).await.unwrap().version, 1);
}

#[tokio::test]
async fn update_someone_elses_personal_secret_is_denied() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let owner = new_user();
    let record = server
        .store
        .create_secret(&personal_secret(&scope, owner))
        .await
        .unwrap();

    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": { "id": record.id, "value": triple("stolen") }}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "permission_denied");
    assert!(body.get("secret").is_none());

    let stored = server.store.get_secret(&record.id).await.unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.value, record.value);
    assert!(settled_events(&analytics).await.is_empty());

    // The owner can still change it.
    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secret"))
        .as_user(owner)
        .json(json!({ "secret": { "id": record.id, "value": triple("mine") }}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["version"], 2);
}

#[tokio::test]
async fn update_secrets_bulk_bumps_each_once() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let a = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let b = server.store.create_secret(&shared_secret(&scope)).await.unwrap();

    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secrets"))
        .as_user(new_user())
        .json(json!({ "secrets": [
            { "id": a.id, "value": triple("a2") },
            { "id": b.id, "comment": {"ciphertext": "c", "iv": "i", "authTag": "t"} },
        ]}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    assert_eq!(server.store.get_secret(&a.id).await.unwrap().version, 2);
    let b_now = server.store.get_secret(&b.id).await.unwrap();
    assert_eq!(b_now.version, 2);
    assert_eq!(b_now.comment.unwrap().ciphertext, "c");

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].event, EventName::SecretsModified);
    assert_eq!(events[0].properties.number_of_secrets, 2);
}

#[tokio::test]
async fn update_secrets_with_foreign_workspace_item_changes_nothing() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let elsewhere = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let x = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let y = server.store.create_secret(&shared_secret(&elsewhere)).await.unwrap();

    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secrets"))
        .as_user(new_user())
        .json(json!({ "secrets": [
            { "id": x.id, "value": triple("x2") },
            { "id": y.id, "value": triple("y2") },
        ]}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "permission_denied");

    let x_now = server.store.get_secret(&x.id).await.unwrap();
    assert_eq!(x_now.version, 1);
    assert_eq!(x_now.value, x.value);
    assert_eq!(server.store.get_secret(&y.id).await.unwrap().version, 1);
    assert!(settled_events(&analytics).await.is_empty());
}

#[tokio::test]
async fn update_secrets_invalid_item_is_validation_error() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let a = server.store.create_secret(&shared_secret(&scope)).await.unwrap();

    let (status, body) = Call::patch(scope_uri(scope.workspace_id.0, "dev", "secrets"))
        .as_user(new_user())
        .json(json!({ "secrets": [
            { "id": a.id, "key": {"ciphertext": "only"} },
        ]}))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "validation_error");
    assert_eq!(server.store.get_secret(&a.id).await.unwrap().version, 1);
}

// ─────────────────────────────────────── Delete ────────────────────────────────────────

#[tokio::test]
async fn delete_secret_returns_removed_record() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let user = new_user();

    let (status, body) = Call::delete(format!("/api/v2/secret/{}", record.id))
        .as_user(user)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["id"], record.id.to_string());

    let (status, _) = Call::delete(format!("/api/v2/secret/{}", record.id))
        .as_user(user)
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let events = events_after(&analytics, 1).await;
    assert_eq!(events[0].event, EventName::SecretsDeleted);
    assert_eq!(settled_events(&analytics).await.len(), 1);
}

#[tokio::test]
async fn delete_someone_elses_personal_secret_is_denied() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let record = server
        .store
        .create_secret(&personal_secret(&scope, new_user()))
        .await
        .unwrap();

    let (status, _) = Call::delete(format!("/api/v2/secret/{}", record.id))
        .as_user(new_user())
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(server.store.get_secret(&record.id).await.is_ok());
}

#[tokio::test]
async fn delete_secrets_with_out_of_scope_id_deletes_nothing() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let other = Scope::new(scope.workspace_id, "prod");
    let a = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let b = server.store.create_secret(&shared_secret(&other)).await.unwrap();

    let (status, body) = Call::delete(scope_uri(scope.workspace_id.0, "dev", "secrets"))
        .as_user(new_user())
        .json(json!({ "secretIds": [a.id, b.id] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], "permission_denied");

    assert!(server.store.get_secret(&a.id).await.is_ok());
    assert!(server.store.get_secret(&b.id).await.is_ok());
    assert!(settled_events(&analytics).await.is_empty());
}

#[tokio::test]
async fn delete_secrets_twice_is_denied_the_second_time() {
    let (server, analytics) = test_server().await;
    let app = app(&server);
    let scope = Scope::new(WorkspaceId(Uuid::new_v4()), "dev");
    let a = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let keep = server.store.create_secret(&shared_secret(&scope)).await.unwrap();
    let uri = scope_uri(scope.workspace_id.0, "dev", "secrets");
    let user = new_user();

    let (status, body) = Call::delete(&uri)
        .as_user(user)
        // Duplicates collapse to one delete.
        .json(json!({ "secretIds": [a.id, a.id] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (status, _) = Call::delete(&uri)
        .as_user(user)
        .json(json!({ "secretIds": [a.id] }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(server.store.get_secret(&keep.id).await.is_ok());

    let events = settled_events(&analytics).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, EventName::SecretsDeleted);
    assert_eq!(events[0].properties.number_of_secrets, 1);
}

// ────────────────────────────────────── Analytics ──────────────────────────────────────

#[tokio::test]
async fn analytics_disabled_still_serves_requests() {
    let server = test_server_without_analytics().await;
    let app = app(&server);

    let (status, _) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": secret_payload("shared", "x") }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn analytics_failure_does_not_change_response() {
    let (server, sink) = test_server_with_failing_analytics().await;
    let app = app(&server);

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": secret_payload("shared", "x") }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secret"]["version"], 1);

    for _ in 0..50 {
        if sink.calls.load(std::sync::atomic::Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(sink.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

// ──────────────────────────────────────── Limits ───────────────────────────────────────

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (mut server, _analytics) = test_server().await;
    server.config.max_body_bytes = 256;
    let app = app(&server);

    let mut payload = secret_payload("shared", "big");
    payload["value"]["ciphertext"] = json!("x".repeat(4096));

    let (status, body) = Call::post(scope_uri(Uuid::new_v4(), "dev", "secret"))
        .as_user(new_user())
        .json(json!({ "secret": payload }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], "payload_too_large");
    assert_eq!(body["code"], 413);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (server, _analytics) = test_server().await;
    let app = app(&server);

    let (status, _) = Call::get("/api/v2/nothing-here").send(&app).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
