//! Document store abstraction.
//!
//! Handlers never talk to a database directly. They go through
//! [`DocumentStore`], which stores JSON documents in named collections and
//! answers the query language in [`super::query`]. Every method returns a
//! boxed `'static` future so a call can be moved into a spawned task, which is
//! how the reference synchronizer issues its fire-and-forget writes.

use std::fmt;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::query::{Filter, FindQuery, Projection};
use crate::domain::{DATE_CREATED_FIELD, Document, ID_FIELD, timestamp};

// =============================================================================
// Collections
// =============================================================================

/// The collections this service stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Users,
}

impl Collection {
    /// Every collection, in schema creation order.
    pub const ALL: [Self; 2] = [Self::Tasks, Self::Users];

    /// Collection (and table) name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Users => "users",
        }
    }

    /// Top-level fields whose values must be unique across the collection.
    #[must_use]
    pub const fn unique_fields(self) -> &'static [&'static str] {
        match self {
            Self::Tasks => &[],
            Self::Users => &["email"],
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A write would duplicate the value of a unique field.
    #[error("Unique constraint violated: {collection}.{field}")]
    UniqueViolation {
        collection: Collection,
        field: String,
    },

    /// Database connection or execution error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error.to_string())
    }
}

/// Future returned by every store operation.
pub type StoreFuture<T> = BoxFuture<'static, Result<T, StoreError>>;

/// An in-place edit of one stored document. Returns true if it changed the
/// document.
pub type DocumentEdit = Box<dyn FnOnce(&mut Document) -> Result<bool, StoreError> + Send>;

// =============================================================================
// Document Store
// =============================================================================

/// A collection-oriented JSON document store.
///
/// Single-document writes, `update_one` included, are atomic; `update_many` is applied per document
/// with no cross-document guarantee. Implementations report duplicate values
/// of [`Collection::unique_fields`] as [`StoreError::UniqueViolation`].
pub trait DocumentStore: Send + Sync {
    /// Returns the documents matching `query.filter`, sorted, paged and
    /// projected as the query asks. Without a sort, documents come back in
    /// insertion order.
    fn find(&self, collection: Collection, query: FindQuery) -> StoreFuture<Vec<Document>>;

    /// Finds one document by id.
    fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
        projection: Projection,
    ) -> StoreFuture<Option<Document>>;

    /// Counts the documents matching `filter`.
    fn count(&self, collection: Collection, filter: Filter) -> StoreFuture<u64>;

    /// Inserts a new document, assigning `_id` and `dateCreated`, and returns
    /// the stored document.
    fn insert_one(&self, collection: Collection, document: Document) -> StoreFuture<Document>;

    /// Replaces the whole document stored under `id`.
    ///
    /// The stored `_id` is forced to `id`. Returns `None` if no such document
    /// exists.
    fn replace_one(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StoreFuture<Option<Document>>;

    /// Applies `edit` to the document stored under `id` as one atomic
    /// read-modify-write. Concurrent edits of the same document are applied
    /// one after the other.
    ///
    /// Returns `None` if no such document exists, otherwise whether the edit
    /// changed (and saved) the document.
    fn update_one(
        &self,
        collection: Collection,
        id: &str,
        edit: DocumentEdit,
    ) -> StoreFuture<Option<bool>>;

    /// Merges `patch` into every document whose id is in `ids` and returns the
    /// number of documents updated. Unknown ids are skipped.
    fn update_many(
        &self,
        collection: Collection,
        ids: Vec<String>,
        patch: Document,
    ) -> StoreFuture<u64>;

    /// Deletes a document and returns its last state, or `None` if absent.
    fn delete_one(&self, collection: Collection, id: &str) -> StoreFuture<Option<Document>>;
}

// =============================================================================
// Insert Helpers
// =============================================================================

/// Generates a new document id: a time-ordered UUID (v7) in simple hex form.
#[must_use]
pub fn generate_document_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Assigns `_id` and `dateCreated` to a document about to be inserted and
/// returns its id. A caller-supplied string `_id` is kept.
#[must_use]
pub fn stamp_new_document(document: &mut Document) -> String {
    let id = match document.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        _ => generate_document_id(),
    };
    document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

    if !document.contains_key(DATE_CREATED_FIELD) {
        document.insert(
            DATE_CREATED_FIELD.to_string(),
            Value::String(timestamp::format(&Utc::now())),
        );
    }

    id
}
