//! Domain module for tasks, users and their assignment relationship.
//!
//! This module contains the stored record types and the pure decision logic
//! that tells the synchronizer which secondary edits to issue.

pub mod assignment;
pub mod task;
pub mod timestamp;
pub mod user;

pub use assignment::{
    AssignmentConflict, AssignmentSnapshot, PendingListEdit, PendingTasksDiff, find_conflict,
};
pub use task::{DeadlineError, Task, TaskDraft, UNASSIGNED_USER_NAME, parse_deadline};
pub use user::{User, UserDraft};

/// A stored document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Field holding the store-assigned identifier of every document.
pub const ID_FIELD: &str = "_id";

/// Field holding the store-assigned creation timestamp of every document.
pub const DATE_CREATED_FIELD: &str = "dateCreated";

/// Converts a stored document into a typed record.
///
/// # Errors
///
/// Returns a `serde_json::Error` if the document does not have the record's shape.
pub fn from_document<T: serde::de::DeserializeOwned>(
    document: Document,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::Value::Object(document))
}

/// Converts a typed record into a document.
///
/// # Errors
///
/// Returns a `serde_json::Error` if the record does not serialize to a JSON object.
pub fn to_document<T: serde::Serialize>(record: &T) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(document) => Ok(document),
        _ => Err(serde::ser::Error::custom("record did not serialize to an object")),
    }
}
