//! Common test helpers for integration tests.
//!
//! Builds in-memory `AppState`s, seeds tasks and users through the real
//! handlers, and provides `FaultyStore`, a store wrapper that counts calls and
//! fails chosen operations on demand.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use task_assignment_api::api::{
    AppConfig, AppState, Envelope, Payload, UserUpdatePolicy, create_task, create_user,
};
use task_assignment_api::domain::{Document, Task, User, from_document};
use task_assignment_api::infrastructure::query::{Filter, FindQuery, Projection};
use task_assignment_api::infrastructure::{
    Collection, DocumentEdit, DocumentStore, InMemoryDocumentStore, StoreError, StoreFuture,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates a test `AppState` over an empty in-memory store.
pub fn create_test_app_state() -> AppState {
    AppState::new(Arc::new(InMemoryDocumentStore::new()))
}

/// Creates a test `AppState` using the given user update policy.
pub fn create_test_app_state_with_policy(policy: UserUpdatePolicy) -> AppState {
    AppState::with_config(
        Arc::new(InMemoryDocumentStore::new()),
        AppConfig {
            user_update_policy: policy,
            ..AppConfig::default()
        },
    )
}

/// Creates a test `AppState` over a `FaultyStore`, returning both.
pub fn create_faulty_app_state() -> (AppState, Arc<FaultyStore>) {
    let store = Arc::new(FaultyStore::new());
    let state = AppState::new(Arc::clone(&store) as Arc<dyn DocumentStore>);
    (state, store)
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Wraps a JSON object literal as a request body.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(document) => Payload(document),
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Reads the `_id` of a response document.
pub fn id_of(data: &Value) -> String {
    data["_id"]
        .as_str()
        .unwrap_or_else(|| panic!("document without _id: {data}"))
        .to_string()
}

/// Creates a user through `POST /users` and returns its id.
pub async fn seed_user(state: &AppState, name: &str, email: &str) -> String {
    let (_, Json(Envelope { data, .. })) = create_user(
        State(state.clone()),
        payload(serde_json::json!({ "name": name, "email": email })),
    )
    .await
    .expect("user creation should succeed");
    id_of(&data)
}

/// Creates a task through `POST /tasks` and returns its id.
///
/// Waits for the resulting reference sync to finish.
pub async fn seed_task(state: &AppState, name: &str, assigned_user: &str, completed: bool) -> String {
    let assigned_user_name = if assigned_user.is_empty() {
        "unassigned"
    } else {
        "Seeded"
    };
    let (_, Json(Envelope { data, .. })) = create_task(
        State(state.clone()),
        payload(serde_json::json!({
            "name": name,
            "deadline": "2030-01-15T12:00:00Z",
            "completed": completed,
            "assignedUser": assigned_user,
            "assignedUserName": assigned_user_name,
        })),
    )
    .await
    .expect("task creation should succeed");
    state.synchronizer.settle().await;
    id_of(&data)
}

// =============================================================================
// Store Inspection Helpers
// =============================================================================

/// Loads a user straight from the store.
pub async fn stored_user(state: &AppState, id: &str) -> Option<User> {
    state
        .store
        .find_by_id(Collection::Users, id, Projection::All)
        .await
        .expect("store read should succeed")
        .map(|document| from_document(document).expect("stored user should decode"))
}

/// Loads a task straight from the store.
pub async fn stored_task(state: &AppState, id: &str) -> Option<Task> {
    state
        .store
        .find_by_id(Collection::Tasks, id, Projection::All)
        .await
        .expect("store read should succeed")
        .map(|document| from_document(document).expect("stored task should decode"))
}

/// Returns a user's pending task ids.
pub async fn pending_tasks(state: &AppState, user_id: &str) -> Vec<String> {
    stored_user(state, user_id)
        .await
        .expect("user should exist")
        .pending_tasks
}

/// Counts the documents in a collection.
pub async fn document_count(state: &AppState, collection: Collection) -> u64 {
    state
        .store
        .count(collection, Filter::All)
        .await
        .expect("store count should succeed")
}

// =============================================================================
// Faulty Store
// =============================================================================

/// Store operation kinds that `FaultyStore` can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
}

/// In-memory store that counts every call and fails selected operations.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryDocumentStore,
    calls: AtomicUsize,
    failing: Mutex<HashSet<(Collection, Operation)>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `operation` on `collection` fail from now on.
    pub fn fail(&self, collection: Collection, operation: Operation) {
        self.failing
            .lock()
            .expect("lock should not be poisoned")
            .insert((collection, operation));
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, collection: Collection, operation: Operation) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.lock().expect("lock should not be poisoned");
        if failing.contains(&(collection, operation)) {
            Err(StoreError::DatabaseError(format!(
                "injected {operation:?} failure on {collection}"
            )))
        } else {
            Ok(())
        }
    }
}

fn failed<T: Send + 'static>(error: StoreError) -> StoreFuture<T> {
    Box::pin(async move { Err(error) })
}

impl DocumentStore for FaultyStore {
    fn find(&self, collection: Collection, query: FindQuery) -> StoreFuture<Vec<Document>> {
        match self.check(collection, Operation::Read) {
            Ok(()) => self.inner.find(collection, query),
            Err(error) => failed(error),
        }
    }

    fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
        projection: Projection,
    ) -> StoreFuture<Option<Document>> {
        match self.check(collection, Operation::Read) {
            Ok(()) => self.inner.find_by_id(collection, id, projection),
            Err(error) => failed(error),
        }
    }

    fn count(&self, collection: Collection, filter: Filter) -> StoreFuture<u64> {
        match self.check(collection, Operation::Read) {
            Ok(()) => self.inner.count(collection, filter),
            Err(error) => failed(error),
        }
    }

    fn insert_one(&self, collection: Collection, document: Document) -> StoreFuture<Document> {
        match self.check(collection, Operation::Write) {
            Ok(()) => self.inner.insert_one(collection, document),
            Err(error) => failed(error),
        }
    }

    fn replace_one(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StoreFuture<Option<Document>> {
        match self.check(collection, Operation::Write) {
            Ok(()) => self.inner.replace_one(collection, id, document),
            Err(error) => failed(error),
        }
    }

    fn update_one(
        &self,
        collection: Collection,
        id: &str,
        edit: DocumentEdit,
    ) -> StoreFuture<Option<bool>> {
        match self.check(collection, Operation::Write) {
            Ok(()) => self.inner.update_one(collection, id, edit),
            Err(error) => failed(error),
        }
    }

    fn update_many(
        &self,
        collection: Collection,
        ids: Vec<String>,
        patch: Document,
    ) -> StoreFuture<u64> {
        match self.check(collection, Operation::Write) {
            Ok(()) => self.inner.update_many(collection, ids, patch),
            Err(error) => failed(error),
        }
    }

    fn delete_one(&self, collection: Collection, id: &str) -> StoreFuture<Option<Document>> {
        match self.check(collection, Operation::Write) {
            Ok(()) => self.inner.delete_one(collection, id),
            Err(error) => failed(error),
        }
    }
}
