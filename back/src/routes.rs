use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tally_api::v1::{CreateTodo, DbInfo, Deleted, Health, Todo, UpdateTodo};
use tokio::sync::watch;
use tracing::info;

use crate::{
    db::DbState,
    store::{StoreError, TodoStore},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TodoStore>,
    pub db_state: watch::Receiver<DbState>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/todos/:id/toggle", patch(toggle_todo))
        .route("/health", get(health))
        .route("/db-info", get(db_info))
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Known store outcomes get their own codes; anything else collapses to
    /// the route's fallback status.
    fn classify(err: StoreError, fallback: StatusCode) -> Self {
        let status = match &err {
            StoreError::NotFound => StatusCode::NOT_FOUND,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => fallback,
        };

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn list_todos(State(state): State<AppState>) -> Result<Json<Vec<Todo>>, ApiError> {
    let todos = state
        .store
        .list()
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(todos))
}

async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let todo = state
        .store
        .get(&id)
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(todo))
}

async fn create_todo(
    State(state): State<AppState>,
    Json(fields): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let todo = state
        .store
        .create(fields)
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::BAD_REQUEST))?;

    info!(
        id = %todo.id,
        title = %todo.title,
        "created todo"
    );

    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<UpdateTodo>,
) -> Result<Json<Todo>, ApiError> {
    let todo = state
        .store
        .update(&id, fields)
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::BAD_REQUEST))?;

    info!(
        id = %todo.id,
        title = %todo.title,
        "updated todo"
    );

    Ok(Json(todo))
}

async fn toggle_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let todo = state
        .store
        .toggle_completed(&id)
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::BAD_REQUEST))?;

    info!(
        id = %todo.id,
        completed = todo.completed,
        "toggled todo"
    );

    Ok(Json(todo))
}

async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, ApiError> {
    let todo = state
        .store
        .delete(&id)
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::INTERNAL_SERVER_ERROR))?;

    info!(id = %todo.id, "deleted todo");

    Ok(Json(Deleted {
        message: String::from("Todo deleted successfully"),
        todo,
    }))
}

// Always 200, even while the store is unreachable.
async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = state.db_state.borrow().as_str().to_owned();

    Json(Health {
        message: String::from("Server is running!"),
        database,
        timestamp: Utc::now(),
    })
}

async fn db_info(State(state): State<AppState>) -> Result<Json<DbInfo>, ApiError> {
    let info = state
        .store
        .info()
        .await
        .map_err(|err| ApiError::classify(err, StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(info))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::store::mem::MemStore;

    const UNKNOWN_ID: &str = "65f1a0b2c3d4e5f6a7b8c9d0";

    fn app() -> (Router, watch::Sender<DbState>) {
        let (state_tx, state_rx) = watch::channel(DbState::Connected);

        let state = AppState {
            store: Arc::new(MemStore::new()),
            db_state: state_rx,
        };

        (router().with_state(state), state_tx)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap();

        (status, value)
    }

    #[tokio::test]
    async fn created_todo_gets_defaults_and_lists_first() {
        let (app, _state) = app();

        let (status, first) = send(&app, "POST", "/todos", Some(json!({ "title": "Buy milk" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["title"], "Buy milk");
        assert_eq!(first["completed"], false);
        assert_eq!(first["priority"], "medium");
        assert_eq!(first["description"], Value::Null);

        let (status, _) = send(&app, "POST", "/todos", Some(json!({ "title": "Walk dog" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, list) = send(&app, "GET", "/todos", None).await;
        assert_eq!(status, StatusCode::OK);

        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["title"], "Walk dog");
        assert_eq!(list[1]["title"], "Buy milk");
    }

    #[tokio::test]
    async fn create_without_title_is_rejected_and_persists_nothing() {
        let (app, _state) = app();

        for body in [json!({}), json!({ "title": "" }), json!({ "title": "   " })] {
            let (status, error) = send(&app, "POST", "/todos", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(error["error"], "Title is required");
        }

        let (_, list) = send(&app, "GET", "/todos", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_trims_title_and_accepts_optional_fields() {
        let (app, _state) = app();

        let body = json!({
            "title": "  Ship release  ",
            "description": " cut the branch ",
            "priority": "high",
            "dueDate": "2026-09-01T12:00:00Z",
        });

        let (status, todo) = send(&app, "POST", "/todos", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(todo["title"], "Ship release");
        assert_eq!(todo["description"], "cut the branch");
        assert_eq!(todo["priority"], "high");
        assert!(todo["dueDate"].as_str().unwrap().starts_with("2026-09-01"));
    }

    #[tokio::test]
    async fn get_returns_the_created_todo() {
        let (app, _state) = app();

        let (_, created) = send(&app, "POST", "/todos", Some(json!({ "title": "Read" }))).await;
        let id = created["_id"].as_str().unwrap();

        let (status, fetched) = send(&app, "GET", &format!("/todos/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["title"], "Read");
        assert_eq!(fetched["completed"], false);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found_everywhere() {
        let (app, _state) = app();

        let (status, error) = send(&app, "GET", &format!("/todos/{UNKNOWN_ID}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "Todo not found");

        let (status, error) = send(
            &app,
            "PUT",
            &format!("/todos/{UNKNOWN_ID}"),
            Some(json!({ "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "Todo not found");

        let (status, error) = send(&app, "DELETE", &format!("/todos/{UNKNOWN_ID}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "Todo not found");

        let (status, error) =
            send(&app, "PATCH", &format!("/todos/{UNKNOWN_ID}/toggle"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "Todo not found");
    }

    #[tokio::test]
    async fn malformed_ids_use_the_route_fallback_status() {
        let (app, _state) = app();

        let (status, _) = send(&app, "GET", "/todos/not-an-id", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = send(
            &app,
            "PUT",
            "/todos/not-an-id",
            Some(json!({ "title": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_the_original_state() {
        let (app, _state) = app();

        let (_, created) = send(&app, "POST", "/todos", Some(json!({ "title": "Gym" }))).await;
        let id = created["_id"].as_str().unwrap();

        let (status, toggled) = send(&app, "PATCH", &format!("/todos/{id}/toggle"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["completed"], true);

        let (status, toggled) = send(&app, "PATCH", &format!("/todos/{id}/toggle"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggled["completed"], false);

        let (_, fetched) = send(&app, "GET", &format!("/todos/{id}"), None).await;
        assert_eq!(fetched["completed"], false);
    }

    #[tokio::test]
    async fn update_is_a_partial_merge() {
        let (app, _state) = app();

        let body = json!({
            "title": "Plan trip",
            "description": "book flights",
            "dueDate": "2026-10-01T00:00:00Z",
        });
        let (_, created) = send(&app, "POST", "/todos", Some(body)).await;
        let id = created["_id"].as_str().unwrap();

        // Only `completed` is sent; everything else must survive, including
        // fields sent as explicit nulls.
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/todos/{id}"),
            Some(json!({ "completed": true, "dueDate": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["completed"], true);
        assert_eq!(updated["title"], "Plan trip");
        assert_eq!(updated["description"], "book flights");
        assert!(updated["dueDate"].as_str().unwrap().starts_with("2026-10-01"));
    }

    #[tokio::test]
    async fn update_with_blank_title_is_rejected() {
        let (app, _state) = app();

        let (_, created) = send(&app, "POST", "/todos", Some(json!({ "title": "Keep" }))).await;
        let id = created["_id"].as_str().unwrap();

        let (status, error) = send(
            &app,
            "PUT",
            &format!("/todos/{id}"),
            Some(json!({ "title": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["error"], "Title is required");

        let (_, fetched) = send(&app, "GET", &format!("/todos/{id}"), None).await;
        assert_eq!(fetched["title"], "Keep");
    }

    #[tokio::test]
    async fn delete_returns_last_state_and_then_not_found() {
        let (app, _state) = app();

        let (_, created) = send(&app, "POST", "/todos", Some(json!({ "title": "Old" }))).await;
        let id = created["_id"].as_str().unwrap();

        let (status, deleted) = send(&app, "DELETE", &format!("/todos/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["message"], "Todo deleted successfully");
        assert_eq!(deleted["todo"]["title"], "Old");

        let (status, error) = send(&app, "GET", &format!("/todos/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["error"], "Todo not found");
    }

    #[tokio::test]
    async fn health_reports_state_and_never_fails() {
        let (app, state) = app();

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Server is running!");
        assert_eq!(body["database"], "connected");
        assert!(body["timestamp"].is_string());

        state.send_replace(DbState::Disconnected);

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "disconnected");
    }

    #[tokio::test]
    async fn db_info_reports_collection_stats() {
        let (app, _state) = app();

        send(&app, "POST", "/todos", Some(json!({ "title": "One" }))).await;
        send(&app, "POST", "/todos", Some(json!({ "title": "Two" }))).await;

        let (status, body) = send(&app, "GET", "/db-info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "mem");
        assert_eq!(body["collections"][0], "todos");
        assert_eq!(body["stats"]["objects"], 2);
    }
}
