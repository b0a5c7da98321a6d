//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Email address, unique across users.
    pub email: String,
    /// Ids of the tasks currently pending against this user, in insertion order.
    #[serde(default)]
    pub pending_tasks: Vec<String>,
    /// Creation timestamp assigned by the store.
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_created: Option<DateTime<Utc>>,
}

impl User {
    /// Returns true if `task_id` is in the pending list.
    #[must_use]
    pub fn has_pending_task(&self, task_id: &str) -> bool {
        self.pending_tasks.iter().any(|pending| pending == task_id)
    }

    /// Appends `task_id` unless it is already pending.
    ///
    /// Returns true if the list changed.
    pub fn add_pending_task(&mut self, task_id: &str) -> bool {
        if self.has_pending_task(task_id) {
            return false;
        }
        self.pending_tasks.push(task_id.to_string());
        true
    }

    /// Removes the first occurrence of `task_id`.
    ///
    /// Returns true if the list changed.
    pub fn remove_pending_task(&mut self, task_id: &str) -> bool {
        match self.pending_tasks.iter().position(|pending| pending == task_id) {
            Some(index) => {
                self.pending_tasks.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Client-supplied user fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub pending_tasks: Vec<String>,
}

impl UserDraft {
    /// Builds the stored user this draft describes under the given identity.
    #[must_use]
    pub fn into_user(self, id: String, date_created: Option<DateTime<Utc>>) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            pending_tasks: self.pending_tasks,
            date_created,
        }
    }
}
