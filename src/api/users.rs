//! User resource handlers.
//!
//! A user's `pendingTasks` can be edited directly with `PUT`. Tasks that
//! leave the list are unassigned and tasks that join it are assigned to the
//! user. Under [`UserUpdatePolicy::Checked`] a task that is completed or
//! belongs to someone else cannot join.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde_json::Value;

use super::body::Payload;
use super::dto::{Envelope, user_draft};
use super::error::{ApiErrorResponse, internal_failure};
use super::extract::{QueryParams, ResourceId};
use super::handlers::{AppState, UserUpdatePolicy};
use super::query::{ListParams, SelectParams, run_list};
use crate::domain::{PendingTasksDiff, Task, User, find_conflict, from_document, to_document};
use crate::infrastructure::query::{Filter, FindQuery, Projection};
use crate::infrastructure::{Collection, StoreError};

const DUPLICATE_EMAIL: &str = "User with this email already exists";

fn user_not_found() -> ApiErrorResponse {
    ApiErrorResponse::not_found("User not found")
}

/// Maps a failed user write: a duplicate email is the client's fault,
/// anything else is a 500 with `message`.
fn write_failure(message: &'static str) -> impl FnOnce(StoreError) -> ApiErrorResponse {
    move |error| match error {
        StoreError::UniqueViolation { ref field, .. } if field == "email" => {
            ApiErrorResponse::bad_request(DUPLICATE_EMAIL)
        }
        error => internal_failure(message)(error),
    }
}

// =============================================================================
// GET /users
// =============================================================================

/// Lists users, or counts them with `count=true`. Unlimited by default.
///
/// # Errors
///
/// - 400 if a query parameter is malformed
/// - 500 if the store fails
pub async fn list_users(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let request = params.into_request(state.config.user_default_limit)?;
    let data = run_list(state.store.as_ref(), Collection::Users, request).await?;
    Ok(Json(Envelope::ok(data)))
}

// =============================================================================
// POST /users
// =============================================================================

/// Creates a user. The submitted `pendingTasks` are stored as sent; tasks
/// are not touched.
///
/// # Errors
///
/// - 400 if `name` or `email` is missing, or the email is taken
/// - 500 if the store fails
pub async fn create_user(
    State(state): State<AppState>,
    Payload(body): Payload,
) -> Result<(StatusCode, Json<Envelope<Value>>), ApiErrorResponse> {
    let draft = user_draft(body)?;
    let document = to_document(&draft).map_err(internal_failure("Error creating user"))?;

    let saved = state
        .store
        .insert_one(Collection::Users, document)
        .await
        .map_err(write_failure("Error creating user"))?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::new("User created", Value::Object(saved))),
    ))
}

// =============================================================================
// GET /users/{id}
// =============================================================================

/// Returns one user, optionally projected with `select`.
///
/// # Errors
///
/// - 400 if `select` is malformed
/// - 404 if the user does not exist
/// - 500 if the store fails
pub async fn get_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    QueryParams(params): QueryParams<SelectParams>,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let projection = params.projection()?;

    let document = state
        .store
        .find_by_id(Collection::Users, &id, projection)
        .await
        .map_err(internal_failure("Error retrieving user"))?
        .ok_or_else(user_not_found)?;

    Ok(Json(Envelope::ok(Value::Object(document))))
}

// =============================================================================
// PUT /users/{id}
// =============================================================================

/// Replaces a user and reconciles the tasks that left or joined its
/// pending list.
///
/// # Errors
///
/// - 400 if `name` or `email` is missing, `pendingTasks` is invalid, the
///   email is taken, or (checked policy) an added task cannot be claimed
/// - 404 if the user does not exist
/// - 500 if the store fails
pub async fn replace_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    Payload(body): Payload,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let draft = user_draft(body)?;

    let existing = state
        .store
        .find_by_id(Collection::Users, &id, Projection::All)
        .await
        .map_err(internal_failure("Error retrieving user"))?
        .ok_or_else(user_not_found)?;
    let before: User = from_document(existing).map_err(internal_failure("Error retrieving user"))?;

    let diff = PendingTasksDiff::between(&before.pending_tasks, &draft.pending_tasks);

    if state.config.user_update_policy == UserUpdatePolicy::Checked && !diff.added.is_empty() {
        ensure_claimable(&state, &id, &diff.added).await?;
    }

    let user = draft.into_user(before.id, before.date_created);
    let document = to_document(&user).map_err(internal_failure("Error updating user"))?;

    let saved = state
        .store
        .replace_one(Collection::Users, &id, document)
        .await
        .map_err(write_failure("Error updating user"))?
        .ok_or_else(user_not_found)?;

    let PendingTasksDiff { removed, added } = diff;
    state.synchronizer.unassign_tasks(removed);
    state.synchronizer.assign_tasks(added, &user);

    Ok(Json(Envelope::new("User updated", Value::Object(saved))))
}

/// Rejects the update if any of `task_ids` is completed or assigned to a
/// user other than `user_id`. Ids with no stored task are allowed.
async fn ensure_claimable(
    state: &AppState,
    user_id: &str,
    task_ids: &[String],
) -> Result<(), ApiErrorResponse> {
    let documents = state
        .store
        .find(Collection::Tasks, FindQuery::matching(Filter::id_in(task_ids)))
        .await
        .map_err(internal_failure("Error retrieving tasks"))?;

    let tasks = documents
        .into_iter()
        .map(from_document::<Task>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(internal_failure("Error retrieving tasks"))?;

    match find_conflict(user_id, &tasks) {
        Some(conflict) => {
            tracing::debug!(user_id = %user_id, conflict = %conflict, "user update rejected");
            Err(ApiErrorResponse::bad_request(conflict.to_string()))
        }
        None => Ok(()),
    }
}

// =============================================================================
// DELETE /users/{id}
// =============================================================================

/// Deletes a user and unassigns every task in its pending list.
///
/// # Errors
///
/// - 404 if the user does not exist
/// - 500 if the store fails
pub async fn delete_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
) -> Result<Json<Envelope<Value>>, ApiErrorResponse> {
    let deleted = state
        .store
        .delete_one(Collection::Users, &id)
        .await
        .map_err(internal_failure("Error deleting user"))?
        .ok_or_else(user_not_found)?;

    match from_document::<User>(deleted.clone()) {
        Ok(user) => state.synchronizer.unassign_tasks(user.pending_tasks),
        Err(error) => tracing::warn!(
            user_id = %id,
            error = %error,
            "deleted user could not be decoded; skipping reference sync"
        ),
    }

    Ok(Json(Envelope::new("User deleted", Value::Object(deleted))))
}
