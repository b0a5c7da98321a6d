//! Reference synchronizer.
//!
//! Keeps `Task.assignedUser` and `User.pendingTasks` consistent after a
//! primary write has been answered. Every secondary write is spawned onto the
//! runtime and tracked, never awaited by the request that caused it. Failures
//! are logged and otherwise ignored.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::task::TaskTracker;

use super::store::{Collection, DocumentStore, StoreError};
use crate::domain::{
    Document, PendingListEdit, UNASSIGNED_USER_NAME, User, from_document, to_document,
};

/// Result of applying one pending-list edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The user's list changed and was saved.
    Applied,
    /// The list already had the requested shape.
    Unchanged,
    /// The target user does not exist.
    MissingUser,
}

/// Issues best-effort secondary writes between the tasks and users collections.
#[derive(Clone)]
pub struct ReferenceSynchronizer {
    store: Arc<dyn DocumentStore>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for ReferenceSynchronizer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReferenceSynchronizer")
            .field("store", &"Arc<dyn DocumentStore>")
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

impl ReferenceSynchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            tracker: TaskTracker::new(),
        }
    }

    /// Schedules pending-list edits. Each edit runs independently, so one
    /// failing does not prevent the others.
    pub fn apply_pending_edits(&self, edits: Vec<PendingListEdit>) {
        for edit in edits {
            let store = Arc::clone(&self.store);
            self.tracker.spawn(async move {
                match apply_pending_edit(store.as_ref(), &edit).await {
                    Ok(EditOutcome::Applied) => tracing::debug!(
                        user_id = %edit.user_id(),
                        task_id = %edit.task_id(),
                        "pending tasks updated"
                    ),
                    Ok(EditOutcome::Unchanged) => {}
                    Ok(EditOutcome::MissingUser) => tracing::debug!(
                        user_id = %edit.user_id(),
                        task_id = %edit.task_id(),
                        "pending tasks not updated: user does not exist"
                    ),
                    Err(error) => tracing::warn!(
                        user_id = %edit.user_id(),
                        task_id = %edit.task_id(),
                        error = %error,
                        "failed to update pending tasks"
                    ),
                }
            });
        }
    }

    /// Schedules assigning `task_ids` to `user`, taking a snapshot of its name.
    pub fn assign_tasks(&self, task_ids: Vec<String>, user: &User) {
        self.patch_tasks(task_ids, assignment_patch(&user.id, &user.name));
    }

    /// Schedules clearing the assignee of `task_ids`.
    pub fn unassign_tasks(&self, task_ids: Vec<String>) {
        self.patch_tasks(task_ids, assignment_patch("", UNASSIGNED_USER_NAME));
    }

    fn patch_tasks(&self, task_ids: Vec<String>, patch: Document) {
        if task_ids.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        self.tracker.spawn(async move {
            let requested = task_ids.len();
            let assigned_user = patch
                .get("assignedUser")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match store.update_many(Collection::Tasks, task_ids, patch).await {
                Ok(updated) => tracing::debug!(
                    assigned_user = %assigned_user,
                    requested,
                    updated,
                    "task assignments updated"
                ),
                Err(error) => tracing::warn!(
                    assigned_user = %assigned_user,
                    requested,
                    error = %error,
                    "failed to update task assignments"
                ),
            }
        });
    }

    /// Number of secondary writes still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every scheduled write to finish.
    ///
    /// Writes scheduled while waiting are waited for too.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

fn assignment_patch(user_id: &str, user_name: &str) -> Document {
    let mut patch = Document::new();
    patch.insert("assignedUser".to_string(), Value::String(user_id.to_string()));
    patch.insert(
        "assignedUserName".to_string(),
        Value::String(user_name.to_string()),
    );
    patch
}

/// Applies the edit to the target user's pending list in one atomic store
/// update, so concurrent edits of the same user do not overwrite each other.
///
/// # Errors
///
/// Returns `StoreError` if the user cannot be read, decoded or saved.
pub async fn apply_pending_edit(
    store: &dyn DocumentStore,
    edit: &PendingListEdit,
) -> Result<EditOutcome, StoreError> {
    let pending_edit = edit.clone();
    let outcome = store
        .update_one(
            Collection::Users,
            edit.user_id(),
            Box::new(move |document: &mut Document| -> Result<bool, StoreError> {
                let mut user: User = from_document(document.clone())?;
                if !pending_edit.apply(&mut user) {
                    return Ok(false);
                }
                *document = to_document(&user)?;
                Ok(true)
            }),
        )
        .await?;

    Ok(match outcome {
        Some(true) => EditOutcome::Applied,
        Some(false) => EditOutcome::Unchanged,
        None => EditOutcome::MissingUser,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryDocumentStore;
    use crate::infrastructure::query::Projection;
    use rstest::rstest;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    async fn seeded_store() -> (Arc<dyn DocumentStore>, String) {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let user = store
            .insert_one(
                Collection::Users,
                document(json!({"name": "Ada", "email": "ada@example.com", "pendingTasks": ["t1"]})),
            )
            .await
            .unwrap();
        let user_id = user["_id"].as_str().unwrap().to_string();
        (store, user_id)
    }

    async fn pending_tasks(store: &Arc<dyn DocumentStore>, user_id: &str) -> Value {
        store
            .find_by_id(Collection::Users, user_id, Projection::All)
            .await
            .unwrap()
            .unwrap()["pendingTasks"]
            .clone()
    }

    #[rstest]
    #[case("t2", true, EditOutcome::Applied, json!(["t1", "t2"]))]
    #[case("t1", true, EditOutcome::Unchanged, json!(["t1"]))]
    #[case("t1", false, EditOutcome::Applied, json!([]))]
    #[case("t9", false, EditOutcome::Unchanged, json!(["t1"]))]
    #[tokio::test]
    async fn test_apply_pending_edit(
        #[case] task_id: &str,
        #[case] add: bool,
        #[case] expected_outcome: EditOutcome,
        #[case] expected_pending: Value,
    ) {
        let (store, user_id) = seeded_store().await;
        let edit = if add {
            PendingListEdit::Add {
                user_id: user_id.clone(),
                task_id: task_id.to_string(),
            }
        } else {
            PendingListEdit::Remove {
                user_id: user_id.clone(),
                task_id: task_id.to_string(),
            }
        };

        let outcome = apply_pending_edit(store.as_ref(), &edit).await.unwrap();

        assert_eq!(outcome, expected_outcome);
        assert_eq!(pending_tasks(&store, &user_id).await, expected_pending);
    }

    #[rstest]
    #[tokio::test]
    async fn test_apply_pending_edit_missing_user() {
        let (store, _) = seeded_store().await;
        let edit = PendingListEdit::Add {
            user_id: "nobody".to_string(),
            task_id: "t1".to_string(),
        };
        assert_eq!(
            apply_pending_edit(store.as_ref(), &edit).await,
            Ok(EditOutcome::MissingUser)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_scheduled_edits_are_visible_after_settle() {
        let (store, user_id) = seeded_store().await;
        let synchronizer = ReferenceSynchronizer::new(Arc::clone(&store));

        synchronizer.apply_pending_edits(vec![PendingListEdit::Remove {
            user_id: user_id.clone(),
            task_id: "t1".to_string(),
        }]);
        synchronizer.settle().await;

        assert_eq!(synchronizer.in_flight(), 0);
        assert_eq!(pending_tasks(&store, &user_id).await, json!([]));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_edits_of_one_user_are_all_kept() {
        let (store, user_id) = seeded_store().await;
        let synchronizer = ReferenceSynchronizer::new(Arc::clone(&store));

        synchronizer.apply_pending_edits(
            (0..50)
                .map(|index| PendingListEdit::Add {
                    user_id: user_id.clone(),
                    task_id: format!("task-{index}"),
                })
                .collect(),
        );
        synchronizer.settle().await;

        let pending = pending_tasks(&store, &user_id).await;
        assert_eq!(pending.as_array().map(Vec::len), Some(51));
        assert_eq!(pending[0], json!("t1"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_assign_and_unassign_tasks() {
        let (store, user_id) = seeded_store().await;
        let task = store
            .insert_one(Collection::Tasks, document(json!({"name": "Report"})))
            .await
            .unwrap();
        let task_id = task["_id"].as_str().unwrap().to_string();
        let user: User = from_document(
            store
                .find_by_id(Collection::Users, &user_id, Projection::All)
                .await
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        let synchronizer = ReferenceSynchronizer::new(Arc::clone(&store));

        synchronizer.assign_tasks(vec![task_id.clone()], &user);
        synchronizer.settle().await;
        let assigned = store
            .find_by_id(Collection::Tasks, &task_id, Projection::All)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assigned["assignedUser"], json!(user_id));
        assert_eq!(assigned["assignedUserName"], json!("Ada"));

        synchronizer.unassign_tasks(vec![task_id.clone()]);
        synchronizer.settle().await;
        let unassigned = store
            .find_by_id(Collection::Tasks, &task_id, Projection::All)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unassigned["assignedUser"], json!(""));
        assert_eq!(unassigned["assignedUserName"], json!(UNASSIGNED_USER_NAME));
    }

    #[rstest]
    #[tokio::test]
    async fn test_settle_can_be_called_repeatedly() {
        let (store, _) = seeded_store().await;
        let synchronizer = ReferenceSynchronizer::new(store);
        synchronizer.settle().await;
        synchronizer.unassign_tasks(vec!["missing".to_string()]);
        synchronizer.settle().await;
        assert_eq!(synchronizer.in_flight(), 0);
    }
}
