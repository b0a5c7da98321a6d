//! Two-way assignment rules between tasks and users.
//!
//! `Task.assignedUser` and `User.pendingTasks` reference each other without any
//! store-level constraint. The functions here decide, from the before and
//! after states of a write, which edits the opposite side needs. They are pure:
//! issuing the edits is the synchronizer's job.

use std::collections::HashSet;

use thiserror::Error;

use super::task::Task;
use super::user::User;

// =============================================================================
// Task Side
// =============================================================================

/// The task fields that drive synchronization, captured before a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSnapshot {
    pub assigned_user: String,
    pub completed: bool,
}

/// A single edit to one user's pending list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingListEdit {
    /// Append the task id unless already present.
    Add { user_id: String, task_id: String },
    /// Remove the task id if present.
    Remove { user_id: String, task_id: String },
}

impl PendingListEdit {
    /// Edit required after a task was created.
    #[must_use]
    pub fn for_created_task(task: &Task) -> Option<Self> {
        task.pending_assignee().map(|user_id| Self::Add {
            user_id: user_id.to_string(),
            task_id: task.id.clone(),
        })
    }

    /// Edits required after a task was replaced.
    ///
    /// Nothing happens unless the assignee or the completion flag changed.
    /// The previous assignee always loses the task; the new assignee gains it
    /// only when the task is open and the assignee itself changed, so flipping
    /// `completed` on the same user never re-adds it.
    #[must_use]
    pub fn for_replaced_task(before: &AssignmentSnapshot, after: &Task) -> Vec<Self> {
        let assignee_changed = before.assigned_user != after.assigned_user;
        if !assignee_changed && before.completed == after.completed {
            return Vec::new();
        }

        let mut edits = Vec::with_capacity(2);

        if !before.assigned_user.is_empty() {
            edits.push(Self::Remove {
                user_id: before.assigned_user.clone(),
                task_id: after.id.clone(),
            });
        }

        if assignee_changed && let Some(user_id) = after.pending_assignee() {
            edits.push(Self::Add {
                user_id: user_id.to_string(),
                task_id: after.id.clone(),
            });
        }

        edits
    }

    /// Edit required after a task was deleted.
    #[must_use]
    pub fn for_deleted_task(task: &Task) -> Option<Self> {
        task.assignee().map(|user_id| Self::Remove {
            user_id: user_id.to_string(),
            task_id: task.id.clone(),
        })
    }

    /// The user whose pending list this edit targets.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Add { user_id, .. } | Self::Remove { user_id, .. } => user_id,
        }
    }

    /// The task id this edit adds or removes.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::Add { task_id, .. } | Self::Remove { task_id, .. } => task_id,
        }
    }

    /// Applies the edit to a loaded user. Returns true if the list changed.
    pub fn apply(&self, user: &mut User) -> bool {
        match self {
            Self::Add { task_id, .. } => user.add_pending_task(task_id),
            Self::Remove { task_id, .. } => user.remove_pending_task(task_id),
        }
    }
}

// =============================================================================
// User Side
// =============================================================================

/// Task ids that left and joined a user's pending list in one replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTasksDiff {
    /// Present before, absent after. These tasks get unassigned.
    pub removed: Vec<String>,
    /// Absent before, present after. These tasks get assigned to the user.
    pub added: Vec<String>,
}

impl PendingTasksDiff {
    /// Computes the diff between two pending lists.
    ///
    /// Each side keeps first-occurrence order and lists an id once.
    #[must_use]
    pub fn between(before: &[String], after: &[String]) -> Self {
        Self {
            removed: missing_from(before, after),
            added: missing_from(after, before),
        }
    }

    /// Returns true if the lists hold the same ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

fn missing_from(source: &[String], other: &[String]) -> Vec<String> {
    let other: HashSet<&str> = other.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    source
        .iter()
        .filter(|id| !other.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Why a task cannot be added to a user's pending list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentConflict {
    /// The task already belongs to a different user.
    #[error("Task {task_id} is already assigned to another user")]
    AssignedElsewhere {
        task_id: String,
        assigned_user: String,
    },

    /// The task is completed and cannot be pending.
    #[error("Task {task_id} is already completed")]
    AlreadyCompleted { task_id: String },
}

/// Returns the first task that `user_id` may not claim, if any.
#[must_use]
pub fn find_conflict(user_id: &str, tasks: &[Task]) -> Option<AssignmentConflict> {
    tasks.iter().find_map(|task| {
        if task.completed {
            return Some(AssignmentConflict::AlreadyCompleted {
                task_id: task.id.clone(),
            });
        }
        match task.assignee() {
            Some(assignee) if assignee != user_id => Some(AssignmentConflict::AssignedElsewhere {
                task_id: task.id.clone(),
                assigned_user: assignee.to_string(),
            }),
            _ => None,
        }
    })
}

// =============================================================================
// Tests
// =============================================================================
