//! Task resource handlers.
//!
//! Every mutation answers from its primary write. The pending-list edits it
//! implies on the assigned users are handed to the [`ReferenceSynchronizer`]
//! and run after the response is built.
//!
//! [`ReferenceSynchronizer`]: crate::infrastructure::ReferenceSynchronizer

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde_json::Value;

use super::body::Payload;
use super::dto::{Envelope, task_draft};
use super::error::{ApiErrorResponse, internal_failure};
use super::extract::{QueryParams, ResourceId};
use super::handlers::AppState;
use super::query::{ListParams, SelectParams, run_list};
use crate::domain::{Document, PendingListEdit, Task, from_document, to_document};
use crate::infrastructure::Collection;
use crate::infrastructure::query::Projection;

fn task_not_found() -> ApiErrorResponse {
    ApiErrorResponse::not_found("Task not found")
}

/// Decodes a stored task for synchronization. A document that is not a
/// valid task is logged and skipped.
fn stored_task(document: &Document) -> Option<Task> {
    match from_document(document.clone()) {
        Ok(task) => Some(task),
        Err(error) => {
            tracing::warn!(
                task_id = ?document.get("_id"),
                error = %error,
                "stored task could not be decoded; skipping reference sync"
            );
            None
        }
    }
}

// =============================================================================
// GET /tasks
// =============================================================================

/// Lists tasks, or counts them with `count=true`.
///
/// # Errors
///
/// - 400 if a query parameter is malformed
/// - 500 if the store fails
pub async fn list_tasks(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let request = params.into_request(state.config.task_default_limit)?;
    let data = run_list(state.store.as_ref(), Collection::Tasks, request).await?;
    Ok(Json(Envelope::ok(data)))
}

// =============================================================================
// POST /tasks
// =============================================================================

/// Creates a task and adds it to its assignee's pending list.
///
/// ```json
/// {
///   "name": "Write report",
///   "deadline": "2030-01-15T12:00:00Z",
///   "assignedUser": "0190f5...",
///   "assignedUserName": "Ada"
/// }
/// ```
///
/// # Errors
///
/// - 400 if `name` or `deadline` is missing or a field is invalid
/// - 500 if the store fails
pub async fn create_task(
    State(state): State<AppState>,
    Payload(body): Payload,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiErrorResponse> {
    let draft = task_draft(body)?;
    let document = to_document(&draft).map_err(internal_failure("Error creating task"))?;

    let saved = state
        .store
        .insert_one(Collection::Tasks, document)
        .await
        .map_err(internal_failure("Error creating task"))?;

    if let Some(edit) = stored_task(&saved).as_ref().and_then(PendingListEdit::for_created_task) {
        state.synchronizer.apply_pending_edits(vec![edit]);
    }

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("Task created", Value::Object(saved))),
    ))
}

// =============================================================================
// GET /tasks/{id}
// =============================================================================

/// Returns one task, optionally projected with `select`.
///
/// # Errors
///
/// - 400 if `select` is malformed
/// - 404 if the task does not exist
/// - 500 if the store fails
pub async fn get_task(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    QueryParams(params): QueryParams<SelectParams>,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let projection = params.projection()?;

    let document = state
        .store
        .find_by_id(Collection::Tasks, &id, projection)
        .await
        .map_err(internal_failure("Error retrieving task"))?
        .ok_or_else(task_not_found)?;

    Ok(Json(Envelope::ok(Value::Object(document))))
}

// =============================================================================
// PUT /tasks/{id}
// =============================================================================

/// Replaces every field of a task, keeping its id and creation time.
///
/// When the assignee or the completion flag changes, the previous assignee
/// loses the task and a new open assignee gains it.
///
/// # Errors
///
/// - 400 if `name` or `deadline` is missing or a field is invalid
/// - 404 if the task does not exist
/// - 500 if the store fails
pub async fn replace_task(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    Payload(body): Payload,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let draft = task_draft(body)?;

    let existing = state
        .store
        .find_by_id(Collection::Tasks, &id, Projection::All)
        .await
        .map_err(internal_failure("Error retrieving task"))?
        .ok_or_else(task_not_found)?;
    let before: Task = from_document(existing).map_err(internal_failure("Error retrieving task"))?;

    let snapshot = before.snapshot();
    let task = draft.into_task(before.id, before.date_created);
    let document = to_document(&task).map_err(internal_failure("Error updating task"))?;

    let saved = state
        .store
        .replace_one(Collection::Tasks, &id, document)
        .await
        .map_err(internal_failure("Error updating task"))?
        .ok_or_else(task_not_found)?;

    state
        .synchronizer
        .apply_pending_edits(PendingListEdit::for_replaced_task(&snapshot, &task));

    Ok(Json(Envelope::new("Task updated", Value::Object(saved))))
}

// =============================================================================
// DELETE /tasks/{id}
// =============================================================================

/// Deletes a task and removes it from its assignee's pending list.
///
/// # Errors
///
/// - 404 if the task does not exist
/// - 500 if the store fails
pub async fn delete_task(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let deleted = state
        .store
        .delete_one(Collection::Tasks, &id)
        .await
        .map_err(internal_failure("Error deleting task"))?
        .ok_or_else(task_not_found)?;

    if let Some(edit) = stored_task(&deleted).as_ref().and_then(PendingListEdit::for_deleted_task) {
        state.synchronizer.apply_pending_edits(vec![edit]);
    }

    Ok(Json(Envelope::new("Task deleted", Value::Object(deleted))))
}
