//! API module for HTTP handlers.
//!
//! This module contains route definitions and request/response handlers.

pub mod body;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod query;
pub mod server;
pub mod tasks;
pub mod users;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use body::Payload;
pub use dto::{Envelope, TaskRequest, UserRequest};
pub use error::ApiErrorResponse;
pub use extract::{QueryParams, ResourceId};
pub use handlers::{AppConfig, AppState, HealthResponse, UserUpdatePolicy, health_check};
pub use query::{ListParams, ListRequest, SelectParams};
pub use server::{ServerConfig, WorkerThreads, serve};
pub use tasks::{create_task, delete_task, get_task, list_tasks, replace_task};
pub use users::{create_user, delete_user, get_user, list_users, replace_user};

/// Task and user routes, mounted both at the root and under `/api`.
fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(replace_task).delete(delete_task),
        )
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(replace_user).delete(delete_user),
        )
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(resource_routes())
        .nest("/api", resource_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
