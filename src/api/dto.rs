//! Data Transfer Objects for API requests and responses.
//!
//! Request DTOs hold raw JSON values so that JSON and form bodies go through
//! the same validation: a form can only send strings, so `completed=true`
//! and a single `pendingTasks=<id>` have to be accepted alongside their JSON
//! counterparts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ApiErrorResponse;
use crate::domain::{
    DeadlineError, Document, TaskDraft, UNASSIGNED_USER_NAME, UserDraft, parse_deadline,
};

// =============================================================================
// Response Envelope
// =============================================================================

/// Body of every response: a human-readable message and the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    #[must_use]
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    /// Envelope for a plain successful read.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self::new("OK", data)
    }
}

// =============================================================================
// Task DTOs
// =============================================================================

/// Request DTO for creating or replacing a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub name: Option<Value>,
    pub description: Option<Value>,
    pub deadline: Option<Value>,
    pub completed: Option<Value>,
    pub assigned_user: Option<Value>,
    pub assigned_user_name: Option<Value>,
}

impl TaskRequest {
    /// Reads the task fields out of a request body, ignoring unknown fields.
    ///
    /// # Errors
    ///
    /// Returns 400 if a known field has an unusable JSON shape.
    pub fn from_document(body: Document) -> Result<Self, ApiErrorResponse> {
        serde_json::from_value(Value::Object(body))
            .map_err(|_| ApiErrorResponse::bad_request("Invalid task body"))
    }

    /// Validates the request and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns 400 if `name` or `deadline` is missing, the deadline is not a
    /// date, or `completed` is not a boolean.
    pub fn into_draft(self) -> Result<TaskDraft, ApiErrorResponse> {
        let missing = || ApiErrorResponse::bad_request("Name and deadline are required");

        let name = text(self.name).filter(|name| !name.is_empty()).ok_or_else(missing)?;
        let deadline = match parse_deadline(self.deadline.as_ref().unwrap_or(&Value::Null)) {
            Ok(deadline) => deadline,
            Err(DeadlineError::Missing) => return Err(missing()),
            Err(DeadlineError::Invalid(value)) => {
                return Err(ApiErrorResponse::bad_request(format!("Invalid deadline: {value}")));
            }
        };
        let completed = flag(self.completed)
            .ok_or_else(|| ApiErrorResponse::bad_request("completed must be true or false"))?;

        Ok(TaskDraft::new(name, deadline)
            .with_description(text(self.description).unwrap_or_default())
            .with_completed(completed)
            .with_assignment(
                text(self.assigned_user).unwrap_or_default(),
                text(self.assigned_user_name)
                    .unwrap_or_else(|| UNASSIGNED_USER_NAME.to_string()),
            ))
    }
}

/// Parses and validates a task body.
///
/// # Errors
///
/// Returns 400 for any validation failure.
pub fn task_draft(body: Document) -> Result<TaskDraft, ApiErrorResponse> {
    TaskRequest::from_document(body)?.into_draft()
}

// =============================================================================
// User DTOs
// =============================================================================

/// Request DTO for creating or replacing a user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub pending_tasks: Option<Value>,
}

impl UserRequest {
    /// Reads the user fields out of a request body, ignoring unknown fields.
    ///
    /// # Errors
    ///
    /// Returns 400 if a known field has an unusable JSON shape.
    pub fn from_document(body: Document) -> Result<Self, ApiErrorResponse> {
        serde_json::from_value(Value::Object(body))
            .map_err(|_| ApiErrorResponse::bad_request("Invalid user body"))
    }

    /// Validates the request and normalizes `pendingTasks`.
    ///
    /// # Errors
    ///
    /// Returns 400 if `name` or `email` is missing or `pendingTasks` is an
    /// array holding anything but strings.
    pub fn into_draft(self) -> Result<UserDraft, ApiErrorResponse> {
        let missing = || ApiErrorResponse::bad_request("Name and email are required");

        let name = text(self.name).filter(|name| !name.is_empty()).ok_or_else(missing)?;
        let email = text(self.email).filter(|email| !email.is_empty()).ok_or_else(missing)?;
        let pending_tasks = normalize_pending_tasks(self.pending_tasks)?;

        Ok(UserDraft {
            name,
            email,
            pending_tasks,
        })
    }
}

/// Parses and validates a user body.
///
/// # Errors
///
/// Returns 400 for any validation failure.
pub fn user_draft(body: Document) -> Result<UserDraft, ApiErrorResponse> {
    UserRequest::from_document(body)?.into_draft()
}

/// Normalizes a submitted `pendingTasks` value.
///
/// An array passes through, a single id becomes a one-element list, and
/// anything else (including absence) means no pending tasks.
///
/// # Errors
///
/// Returns 400 if an array element is not a string.
pub fn normalize_pending_tasks(value: Option<Value>) -> Result<Vec<String>, ApiErrorResponse> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Ok(id),
                _ => Err(ApiErrorResponse::bad_request(
                    "pendingTasks must be an array of task ids",
                )),
            })
            .collect(),
        Some(Value::String(id)) if !id.is_empty() => Ok(vec![id]),
        _ => Ok(Vec::new()),
    }
}

// =============================================================================
// Field Helpers
// =============================================================================

/// Reads a scalar as text. Numbers and booleans are stringified.
fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Reads an optional boolean, accepting `"true"` and `"false"` from forms.
/// Returns `None` for anything else.
fn flag(value: Option<Value>) -> Option<bool> {
    match value {
        None | Some(Value::Null) => Some(false),
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" | "" => Some(false),
            _ => None,
        },
        Some(_) => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
