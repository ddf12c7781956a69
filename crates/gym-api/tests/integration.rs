//! Integration tests: assign/supersede, staff stacking, status change, remove, audit, errors.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gym_api::server::{self, AppState};
use gym_lifecycle::AssignmentLifecycleManager;
use gym_store::{InMemoryAuditLog, InMemoryGymStore, SeedData};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

const SEED: &str = r#"{
    "plans": [
        {"id": "basic", "name": "Basic", "category": "Member"},
        {"id": "premium", "name": "Premium", "category": "Member"},
        {"id": "trainer", "name": "Trainer", "category": "Staff", "linked_role_id": "trainer"}
    ],
    "members": [
        {"id": "m1", "name": "Ada"},
        {"id": "m2", "name": "Grace"}
    ]
}"#;

async fn test_app() -> axum::Router {
    let seed = SeedData::from_json_str(SEED).unwrap();
    let store = Arc::new(InMemoryGymStore::from_seed(seed).await);
    let manager = AssignmentLifecycleManager::from_store(store, Arc::new(InMemoryAuditLog::new()));
    server::router(Arc::new(AppState {
        lifecycle: Arc::new(manager),
    }))
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let j: Value = serde_json::from_slice(&body).unwrap();
    (status, j)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn assign(app: &axum::Router, member: &str, plan: &str, start: &str) -> Value {
    let (status, j) = send(
        app,
        post_json(
            &format!("/members/{}/assignments", member),
            json!({ "plan_id": plan, "start_date": start, "price_paid": 30.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", j);
    assert_eq!(j["code"], 200);
    j
}

#[tokio::test]
async fn assign_supersedes_previous_plan() {
    let app = test_app().await;
    let first = assign(&app, "m1", "basic", "2024-01-01").await;
    let basic_id = first["data"]["assignment"]["id"].as_str().unwrap().to_string();

    let j = assign(&app, "m1", "premium", "2024-01-10").await;
    let data = &j["data"];
    assert_eq!(data["member"]["current_plan_id"], "premium");
    assert_eq!(data["member"]["membership_status"], "Active");
    assert_eq!(data["superseded"][0]["id"], basic_id.as_str());
    assert_eq!(data["superseded"][0]["status"], "Ended");
    assert_eq!(data["superseded"][0]["end_date"], "2024-01-09");
    assert_eq!(data["assignment"]["end_date"], Value::Null);

    let (status, j) = send(&app, get("/members/m1/assignments")).await;
    assert_eq!(status, StatusCode::OK);
    let list = j["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["plan_id"], "premium");
    assert_eq!(list[1]["plan_id"], "basic");
}

#[tokio::test]
async fn staff_plan_grants_role_until_removed() {
    let app = test_app().await;
    assign(&app, "m1", "premium", "2024-01-10").await;
    let j = assign(&app, "m1", "trainer", "2024-02-01").await;
    assert_eq!(j["data"]["member"]["access_role"], "staff");
    assert_eq!(j["data"]["member"]["linked_role_id"], "trainer");
    assert_eq!(j["data"]["member"]["current_plan_id"], "premium");
    let trainer_id = j["data"]["assignment"]["id"].as_str().unwrap().to_string();

    let (status, j) = send(
        &app,
        delete(&format!(
            "/members/m1/assignments/{}?plan_id=trainer",
            trainer_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", j);
    assert_eq!(j["data"]["member"]["access_role"], "member");
    assert_eq!(j["data"]["member"]["linked_role_id"], Value::Null);
    assert_eq!(j["data"]["member"]["current_plan_id"], "premium");

    let (_, j) = send(&app, get("/members/m1/audit")).await;
    let entries = j["data"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["action"], "removed");
    assert_eq!(entries[0]["plan_name"], "Trainer");
}

#[tokio::test]
async fn cancel_through_status_route() {
    let app = test_app().await;
    let j = assign(&app, "m1", "premium", "2024-01-10").await;
    let id = j["data"]["assignment"]["id"].as_str().unwrap().to_string();

    let (status, j) = send(
        &app,
        post_json(
            &format!("/members/m1/assignments/{}/status", id),
            json!({ "status": "Cancelled" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", j);
    assert_eq!(j["data"]["assignment"]["status"], "Cancelled");
    assert!(j["data"]["assignment"]["end_date"].is_string());
    assert_eq!(j["data"]["member"]["membership_status"], "Inactive");
    assert_eq!(j["data"]["member"]["current_plan_id"], Value::Null);

    let (_, j) = send(&app, get("/members/m1/audit?limit=1")).await;
    let entries = j["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "status_changed_to_cancelled");
    assert_eq!(entries[0]["status_before"], "Active");
}

#[tokio::test]
async fn errors_map_to_http_status() {
    let app = test_app().await;

    let (status, j) = send(
        &app,
        post_json(
            "/members/m1/assignments",
            json!({ "plan_id": "platinum", "start_date": "2024-01-10" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(j["code"], 404);
    assert!(j["message"].as_str().unwrap().contains("platinum"));

    let (status, j) = send(
        &app,
        post_json(
            "/members/m1/assignments",
            json!({ "plan_id": "basic", "start_date": "2024-01-10", "price_paid": -1.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(j["code"], 400);

    let (status, _) = send(
        &app,
        post_json(
            "/members/ghost/assignments",
            json!({ "plan_id": "basic", "start_date": "2024-01-10" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_json(
            "/members/m1/assignments/nope/status",
            json!({ "status": "Ended" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, j) = send(&app, get("/members/m1/audit")).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn members_are_isolated() {
    let app = test_app().await;
    let j = assign(&app, "m1", "basic", "2024-01-01").await;
    let id = j["data"]["assignment"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        delete(&format!("/members/m2/assignments/{}?plan_id=basic", id)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, j) = send(&app, get("/members/m2/assignments")).await;
    assert!(j["data"].as_array().unwrap().is_empty());
    let (_, j) = send(&app, get("/members/m2/audit")).await;
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn audit_since_accepts_utc_and_encoded_offsets() {
    let app = test_app().await;
    assign(&app, "m1", "basic", "2024-01-01").await;

    let (status, j) = send(&app, get("/members/m1/audit?since=2000-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["data"].as_array().unwrap().len(), 1);

    let (status, j) = send(
        &app,
        get("/members/m1/audit?since=2000-01-01T00:00:00%2B00:00"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["data"].as_array().unwrap().len(), 1);

    let (status, j) = send(&app, get("/members/m1/audit?since=2999-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(j["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_is_ok() {
    let app = test_app().await;
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}
