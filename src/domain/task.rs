//! Task domain model.
//!
//! A task is stored as a document in the `tasks` collection. The
//! `assignedUser` field holds a user id (or the empty string when nobody is
//! assigned) and `assignedUserName` is a display snapshot of that user's name.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::assignment::AssignmentSnapshot;
use super::timestamp;

/// Display name stored on tasks that have no assignee.
pub const UNASSIGNED_USER_NAME: &str = "unassigned";

fn unassigned_user_name() -> String {
    UNASSIGNED_USER_NAME.to_string()
}

// =============================================================================
// Task
// =============================================================================

/// A stored task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Task name (never empty).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Deadline of the task.
    #[serde(with = "timestamp")]
    pub deadline: DateTime<Utc>,
    /// Whether the task has been completed.
    #[serde(default)]
    pub completed: bool,
    /// Id of the assigned user, empty when unassigned.
    #[serde(default)]
    pub assigned_user: String,
    /// Snapshot of the assigned user's name at assignment time.
    #[serde(default = "unassigned_user_name")]
    pub assigned_user_name: String,
    /// Creation timestamp assigned by the store.
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_created: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns the assigned user id, if any.
    #[must_use]
    pub fn assignee(&self) -> Option<&str> {
        (!self.assigned_user.is_empty()).then_some(self.assigned_user.as_str())
    }

    /// Returns the user whose pending list should contain this task.
    ///
    /// Completed tasks are pending for nobody.
    #[must_use]
    pub fn pending_assignee(&self) -> Option<&str> {
        if self.completed {
            None
        } else {
            self.assignee()
        }
    }

    /// Captures the fields that drive reference synchronization.
    #[must_use]
    pub fn snapshot(&self) -> AssignmentSnapshot {
        AssignmentSnapshot {
            assigned_user: self.assigned_user.clone(),
            completed: self.completed,
        }
    }
}

// =============================================================================
// Task Draft
// =============================================================================

/// Client-supplied task fields, validated and defaulted.
///
/// A draft becomes a new document on creation, or replaces every field of an
/// existing task (keeping its id and creation timestamp) on `PUT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub name: String,
    pub description: String,
    #[serde(with = "timestamp")]
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub assigned_user: String,
    pub assigned_user_name: String,
}

impl TaskDraft {
    /// Creates a draft with default optional fields.
    #[must_use]
    pub fn new(name: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            deadline,
            completed: false,
            assigned_user: String::new(),
            assigned_user_name: unassigned_user_name(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the completion flag.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Sets the assignee id and display name.
    #[must_use]
    pub fn with_assignment(
        mut self,
        assigned_user: impl Into<String>,
        assigned_user_name: impl Into<String>,
    ) -> Self {
        self.assigned_user = assigned_user.into();
        self.assigned_user_name = assigned_user_name.into();
        self
    }

    /// Builds the stored task this draft describes under the given identity.
    #[must_use]
    pub fn into_task(self, id: String, date_created: Option<DateTime<Utc>>) -> Task {
        Task {
            id,
            name: self.name,
            description: self.description,
            deadline: self.deadline,
            completed: self.completed,
            assigned_user: self.assigned_user,
            assigned_user_name: self.assigned_user_name,
            date_created,
        }
    }
}

// =============================================================================
// Deadline Parsing
// =============================================================================

/// Why a deadline value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineError {
    /// No usable value was supplied.
    #[error("deadline is required")]
    Missing,

    /// A value was supplied but is not a recognizable date.
    #[error("invalid deadline: {0}")]
    Invalid(String),
}

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a deadline from a request value.
///
/// Accepts RFC 3339 timestamps, naive date-times and `YYYY-MM-DD` dates
/// (interpreted as UTC), and milliseconds since the Unix epoch either as a
/// JSON number or a numeric string. Precision below a millisecond is dropped.
///
/// # Errors
///
/// Returns `DeadlineError::Missing` for null or blank values and
/// `DeadlineError::Invalid` for anything that is not a recognizable date.
pub fn parse_deadline(value: &Value) -> Result<DateTime<Utc>, DeadlineError> {
    let deadline = match value {
        Value::Null => Err(DeadlineError::Missing),
        Value::String(text) => parse_deadline_text(text.trim()),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| DeadlineError::Invalid(number.to_string())),
        other => Err(DeadlineError::Invalid(other.to_string())),
    }?;
    Ok(timestamp::to_millis(deadline))
}

fn parse_deadline_text(text: &str) -> Result<DateTime<Utc>, DeadlineError> {
    if text.is_empty() {
        return Err(DeadlineError::Missing);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    text.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| DeadlineError::Invalid(text.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
