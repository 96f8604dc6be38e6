use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use taskso::config::ClientConfig;
use taskso::db::MemoryCredentialStore;
use taskso::error::AppError;
use taskso::gateway::{HttpGateway, TaskGateway};
use taskso::models::{Category, Credential, LoginRequest, NewTask, TaskPatch, TaskQuery, TaskStatus};
use taskso::AppContext;

const TOKEN: &str = "tok-123";

#[derive(Default)]
struct FakeState {
    tasks: Vec<Value>,
    next_id: u32,
    creates: u32,
    last_query: HashMap<String, String>,
    fail_creates: bool,
    /// Holds back delete responses after the task is already removed.
    stall_deletes: bool,
    deletes: u32,
}

type Shared = Arc<Mutex<FakeState>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

fn refused() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Not authorized, token failed" })),
    )
        .into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == "a@b.com" && body["password"] == "secret1" {
        Json(json!({
            "token": TOKEN,
            "user": { "id": "u1", "email": "a@b.com", "name": "Ann" }
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid email or password" })),
        )
            .into_response()
    }
}

async fn health(headers: HeaderMap) -> Response {
    if authorized(&headers) {
        StatusCode::OK.into_response()
    } else {
        refused()
    }
}

async fn list_tasks(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return refused();
    }
    let mut state = state.lock().unwrap();
    let tasks: Vec<Value> = state
        .tasks
        .iter()
        .filter(|t| params.get("status").is_none_or(|s| t["status"] == *s))
        .filter(|t| params.get("category").is_none_or(|c| t["category"] == *c))
        .cloned()
        .collect();
    state.last_query = params;
    Json(tasks).into_response()
}

async fn create_task(State(state): State<Shared>, headers: HeaderMap, Json(mut body): Json<Value>) -> Response {
    if !authorized(&headers) {
        return refused();
    }
    let mut state = state.lock().unwrap();
    state.creates += 1;
    if state.fail_creates {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    state.next_id += 1;
    let now = "2024-05-01T10:00:00Z";
    body["_id"] = json!(format!("task-{}", state.next_id));
    body["userId"] = json!("u1");
    body["createdAt"] = json!(now);
    body["updatedAt"] = json!(now);
    state.tasks.push(body.clone());
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn get_task(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return refused();
    }
    let state = state.lock().unwrap();
    match state.tasks.iter().find(|t| t["_id"] == *id) {
        Some(task) => Json(task.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "Task not found" }))).into_response(),
    }
}

async fn update_task(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return refused();
    }
    let mut state = state.lock().unwrap();
    let Some(task) = state.tasks.iter_mut().find(|t| t["_id"] == *id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let (Some(task), Some(patch)) = (task.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            task.insert(key.clone(), value.clone());
        }
        task.insert("updatedAt".to_string(), json!("2024-05-01T11:00:00Z"));
    }
    Json(task.clone()).into_response()
}

async fn delete_task(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&headers) {
        return refused();
    }
    let (removed, stall) = {
        let mut state = state.lock().unwrap();
        state.deletes += 1;
        let before = state.tasks.len();
        state.tasks.retain(|t| t["_id"] != *id);
        (state.tasks.len() < before, state.stall_deletes)
    };
    if !removed {
        return StatusCode::NOT_FOUND.into_response();
    }
    if stall {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK.into_response()
}

async fn spawn_fake() -> (String, Shared) {
    let state = Shared::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/slow/auth/health", get(slow))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake service");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

async fn gateway() -> (HttpGateway, Shared) {
    let (base, state) = spawn_fake().await;
    let config = ClientConfig::new(&format!("{}/api", base)).unwrap();
    (HttpGateway::new(config).unwrap(), state)
}

fn token() -> Credential {
    Credential::new(TOKEN)
}

#[tokio::test]
async fn test_login_returns_credential_and_profile() {
    let (gateway, _) = gateway().await;
    let resp = gateway
        .login(&LoginRequest {
            email: "a@b.com".to_string(),
            password: "secret1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(resp.token.expose(), TOKEN);
    assert_eq!(resp.user.name, "Ann");
}

#[tokio::test]
async fn test_login_failure_carries_service_message() {
    let (gateway, _) = gateway().await;
    let err = gateway
        .login(&LoginRequest {
            email: "a@b.com".to_string(),
            password: "nope".to_string(),
        })
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
    assert_eq!(err.service_message(), Some("Invalid email or password"));
}

#[tokio::test]
async fn test_health_checks_bearer_header() {
    let (gateway, _) = gateway().await;
    assert!(gateway.check_auth(&token()).await.is_ok());
    let err = gateway.check_auth(&Credential::new("other")).await.unwrap_err();
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_task_endpoints_round_trip() {
    let (gateway, state) = gateway().await;
    let created = gateway
        .create_task(
            Some(&token()),
            &NewTask::new("Read")
                .with_category(Category::Nature)
                .with_status(TaskStatus::Todo),
        )
        .await
        .unwrap();
    assert_eq!(created.title, "Read");
    assert_eq!(created.owner, "u1");
    assert_eq!(created.category, Category::Nature);

    let query = TaskQuery {
        status: Some(TaskStatus::Todo),
        category: None,
    };
    let listed = gateway.list_tasks(Some(&token()), &query).await.unwrap();
    assert_eq!(listed.len(), 1);
    {
        let state = state.lock().unwrap();
        assert_eq!(state.last_query.get("status").map(String::as_str), Some("todo"));
        assert!(!state.last_query.contains_key("category"));
    }

    let updated = gateway
        .update_task(Some(&token()), &created.id, &TaskPatch::status(TaskStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.title, "Read");
    assert!(updated.updated_at > updated.created_at);

    let fetched = gateway.get_task(Some(&token()), &created.id).await.unwrap();
    assert_eq!(fetched.status, TaskStatus::InProgress);

    gateway.delete_task(Some(&token()), &created.id).await.unwrap();
    let err = gateway.get_task(Some(&token()), &created.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn test_missing_credential_is_refused() {
    let (gateway, _) = gateway().await;
    let err = gateway.list_tasks(None, &TaskQuery::all()).await.unwrap_err();
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn test_failed_create_is_sent_once() {
    let (gateway, state) = gateway().await;
    state.lock().unwrap().fail_creates = true;
    let err = gateway
        .create_task(Some(&token()), &NewTask::new("Read"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Rejected { status: 500, .. }));
    assert_eq!(state.lock().unwrap().creates, 1);
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let (base, _) = spawn_fake().await;
    let mut config = ClientConfig::new(&format!("{}/slow", base)).unwrap();
    config.request_timeout = Duration::from_millis(200);
    config.max_retries = 0;
    let gateway = HttpGateway::new(config).unwrap();

    let err = gateway.check_auth(&token()).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_delete_resent_after_lost_response_succeeds() {
    let (base, state) = spawn_fake().await;
    let mut config = ClientConfig::new(&format!("{}/api", base)).unwrap();
    config.request_timeout = Duration::from_millis(200);
    config.max_retries = 1;
    let gateway = HttpGateway::new(config).unwrap();

    let created = gateway
        .create_task(Some(&token()), &NewTask::new("Read"))
        .await
        .unwrap();
    state.lock().unwrap().stall_deletes = true;

    gateway.delete_task(Some(&token()), &created.id).await.unwrap();
    {
        let state = state.lock().unwrap();
        assert_eq!(state.deletes, 2);
        assert!(state.tasks.is_empty());
    }
}

#[tokio::test]
async fn test_delete_of_missing_task_is_not_found() {
    let (gateway, state) = gateway().await;
    let err = gateway.delete_task(Some(&token()), "task-404").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound), "unexpected error: {err:?}");
    assert_eq!(state.lock().unwrap().deletes, 1);
}

#[tokio::test]
async fn test_full_stack_login_create_and_list() {
    let (base, _) = spawn_fake().await;
    let config = ClientConfig::new(&format!("{}/api", base)).unwrap();
    let gateway = Arc::new(HttpGateway::new(config.clone()).unwrap());
    let ctx = AppContext::new(config, gateway, Arc::new(MemoryCredentialStore::new()));

    assert!(ctx.session.login("a@b.com", "secret1").await);
    let mut dash = ctx.dashboard();
    dash.refresh().await;
    assert_eq!(dash.view().tasks.as_ref().map(|t| t.len()), Some(0));

    dash.create(NewTask::new("Call mum").with_category(Category::Family))
        .await
        .unwrap();
    let tasks = dash.view().tasks.clone().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Call mum");
}
