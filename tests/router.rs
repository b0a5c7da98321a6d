//! Router-level tests: routing, body formats and the response envelope as
//! seen over HTTP.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{create_test_app_state, pending_tasks, seed_task};
use task_assignment_api::api::{AppState, router};

async fn send(application: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = application.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn form_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn app(state: &AppState) -> Router {
    router(state.clone())
}

#[rstest]
#[tokio::test]
async fn test_health() {
    let state = create_test_app_state();

    let (status, body) = send(app(&state), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
}

#[rstest]
#[case("/tasks?where=not-json", "Invalid JSON in 'where' parameter")]
#[case("/api/tasks?sort=%7B", "Invalid JSON in 'sort' parameter")]
#[case("/users?select=nope", "Invalid JSON in 'select' parameter")]
#[case("/tasks?limit=-3", "Invalid 'limit' parameter: expected a non-negative integer")]
#[case("/tasks?count=true&sort=not-json", "Invalid JSON in 'sort' parameter")]
#[case("/users?count=true&select=%5B", "Invalid JSON in 'select' parameter")]
#[case("/tasks/%FF", "Invalid resource id")]
#[tokio::test]
async fn test_malformed_query_renders_error_envelope(#[case] uri: &str, #[case] message: &str) {
    let state = create_test_app_state();

    let (status, body) = send(app(&state), get(uri)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": message, "data": {}}));
}

#[rstest]
#[case("/tasks")]
#[case("/api/tasks")]
#[case("/users?where=%7B%7D&count=true")]
#[tokio::test]
async fn test_routes_served_at_root_and_under_api(#[case] uri: &str) {
    let state = create_test_app_state();

    let (status, body) = send(app(&state), get(uri)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("OK"));
}

#[rstest]
#[tokio::test]
async fn test_json_and_form_bodies_drive_assignment() {
    let state = create_test_app_state();

    let (status, created) = send(
        app(&state),
        form_request("POST", "/api/users", "name=Ada&email=ada%40example.com"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = created["data"]["_id"].as_str().unwrap().to_string();

    let (status, task) = send(
        app(&state),
        json_request(
            "POST",
            "/tasks",
            &json!({
                "name": "Write report",
                "deadline": "2030-01-15",
                "assignedUser": user_id,
                "assignedUserName": "Ada"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task["data"]["_id"].as_str().unwrap().to_string();

    state.synchronizer.settle().await;
    assert_eq!(pending_tasks(&state, &user_id).await, vec![task_id.clone()]);

    let (status, updated) = send(
        app(&state),
        form_request(
            "PUT",
            &format!("/tasks/{task_id}"),
            &format!("name=Write+report&deadline=2030-01-15&completed=true&assignedUser={user_id}"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["completed"], json!(true));

    state.synchronizer.settle().await;
    assert!(pending_tasks(&state, &user_id).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_invalid_json_body_is_400() {
    let state = create_test_app_state();

    let (status, body) = send(
        app(&state),
        Request::builder()
            .method("POST")
            .uri("/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\":"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Invalid JSON body", "data": {}}));
}

#[rstest]
#[tokio::test]
async fn test_delete_missing_user_over_http() {
    let state = create_test_app_state();

    let request = Request::builder()
        .method("DELETE")
        .uri("/users/missing")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&state), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": "User not found", "data": {}}));
}

#[rstest]
#[tokio::test]
async fn test_repeated_query_parameter_uses_first_value() {
    let state = create_test_app_state();
    for name in ["First", "Second", "Third"] {
        seed_task(&state, name, "", false).await;
    }

    let (status, body) = send(app(&state), get("/tasks?limit=1&limit=2")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}
