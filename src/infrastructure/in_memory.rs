//! In-memory document store.
//!
//! This module provides an in-memory implementation of [`DocumentStore`]
//! suitable for development and tests.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Insertion-ordered collections with an id index
//! - Unique field enforcement as declared by [`Collection::unique_fields`]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::query::{Filter, FindQuery, Projection};
use super::store::{
    Collection, DocumentEdit, DocumentStore, StoreError, StoreFuture, stamp_new_document,
};
use crate::domain::{Document, ID_FIELD};

// =============================================================================
// Collection Data
// =============================================================================

/// Documents of one collection, kept in insertion order.
#[derive(Debug, Default)]
struct CollectionData {
    next_sequence: u64,
    /// Documents keyed by insertion sequence.
    documents: BTreeMap<u64, Document>,
    /// Document id to insertion sequence.
    index: HashMap<String, u64>,
}

impl CollectionData {
    fn get(&self, id: &str) -> Option<&Document> {
        self.index
            .get(id)
            .and_then(|sequence| self.documents.get(sequence))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        let sequence = self.index.get(id)?;
        self.documents.get_mut(sequence)
    }

    fn insert(&mut self, id: String, document: Document) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.documents.insert(sequence, document);
        self.index.insert(id, sequence);
    }

    fn remove(&mut self, id: &str) -> Option<Document> {
        let sequence = self.index.remove(id)?;
        self.documents.remove(&sequence)
    }

    /// Fails if another document already holds a unique value of `candidate`.
    fn check_unique(
        &self,
        collection: Collection,
        id: &str,
        candidate: &Document,
    ) -> Result<(), StoreError> {
        for field in collection.unique_fields() {
            let Some(value) = candidate.get(*field).filter(|value| !value.is_null()) else {
                continue;
            };
            let duplicate = self.documents.values().any(|existing| {
                existing.get(ID_FIELD).and_then(Value::as_str) != Some(id)
                    && existing.get(*field) == Some(value)
            });
            if duplicate {
                return Err(StoreError::UniqueViolation {
                    collection,
                    field: (*field).to_string(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// In-Memory Document Store
// =============================================================================

/// In-memory implementation of `DocumentStore`.
///
/// # Example
///
/// ```ignore
/// use infrastructure::in_memory::InMemoryDocumentStore;
///
/// let store = InMemoryDocumentStore::new();
/// let saved = store.insert_one(Collection::Tasks, document).await?;
/// let found = store.find_by_id(Collection::Tasks, &id, Projection::All).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<Collection, CollectionData>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl DocumentStore for InMemoryDocumentStore {
    fn find(&self, collection: Collection, query: FindQuery) -> StoreFuture<Vec<Document>> {
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let matching: Vec<Document> = {
                let guard = collections.read().await;
                guard.get(&collection).map_or_else(Vec::new, |data| {
                    data.documents
                        .values()
                        .filter(|document| query.filter.matches(document))
                        .cloned()
                        .collect()
                })
            };
            Ok(query.arrange(matching))
        })
    }

    fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
        projection: Projection,
    ) -> StoreFuture<Option<Document>> {
        let collections = Arc::clone(&self.collections);
        let id = id.to_string();
        Box::pin(async move {
            let guard = collections.read().await;
            Ok(guard
                .get(&collection)
                .and_then(|data| data.get(&id))
                .cloned()
                .map(|document| projection.apply(document)))
        })
    }

    fn count(&self, collection: Collection, filter: Filter) -> StoreFuture<u64> {
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let guard = collections.read().await;
            let count = guard.get(&collection).map_or(0, |data| {
                data.documents
                    .values()
                    .filter(|document| filter.matches(document))
                    .count()
            });
            Ok(count as u64)
        })
    }

    fn insert_one(&self, collection: Collection, document: Document) -> StoreFuture<Document> {
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let mut document = document;
            let id = stamp_new_document(&mut document);

            let mut guard = collections.write().await;
            let data = guard.entry(collection).or_default();
            if data.get(&id).is_some() {
                return Err(StoreError::UniqueViolation {
                    collection,
                    field: ID_FIELD.to_string(),
                });
            }
            data.check_unique(collection, &id, &document)?;
            data.insert(id, document.clone());
            Ok(document)
        })
    }

    fn replace_one(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StoreFuture<Option<Document>> {
        let collections = Arc::clone(&self.collections);
        let id = id.to_string();
        Box::pin(async move {
            let mut document = document;
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));

            let mut guard = collections.write().await;
            let Some(data) = guard.get_mut(&collection) else {
                return Ok(None);
            };
            if data.get(&id).is_none() {
                return Ok(None);
            }
            data.check_unique(collection, &id, &document)?;
            if let Some(stored) = data.get_mut(&id) {
                stored.clone_from(&document);
            }
            Ok(Some(document))
        })
    }

    fn update_one(
        &self,
        collection: Collection,
        id: &str,
        edit: DocumentEdit,
    ) -> StoreFuture<Option<bool>> {
        let collections = Arc::clone(&self.collections);
        let id = id.to_string();
        Box::pin(async move {
            let mut guard = collections.write().await;
            let Some(data) = guard.get_mut(&collection) else {
                return Ok(None);
            };
            let Some(mut document) = data.get(&id).cloned() else {
                return Ok(None);
            };
            if !edit(&mut document)? {
                return Ok(Some(false));
            }
            document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            data.check_unique(collection, &id, &document)?;
            if let Some(stored) = data.get_mut(&id) {
                *stored = document;
            }
            Ok(Some(true))
        })
    }

    fn update_many(
        &self,
        collection: Collection,
        ids: Vec<String>,
        patch: Document,
    ) -> StoreFuture<u64> {
        let collections = Arc::clone(&self.collections);
        Box::pin(async move {
            let mut guard = collections.write().await;
            let Some(data) = guard.get_mut(&collection) else {
                return Ok(0);
            };

            let mut updated = 0_u64;
            for id in &ids {
                let Some(existing) = data.get(id) else {
                    continue;
                };
                let mut merged = existing.clone();
                for (field, value) in &patch {
                    merged.insert(field.clone(), value.clone());
                }
                data.check_unique(collection, id, &merged)?;
                if let Some(stored) = data.get_mut(id) {
                    *stored = merged;
                    updated += 1;
                }
            }
            Ok(updated)
        })
    }

    fn delete_one(&self, collection: Collection, id: &str) -> StoreFuture<Option<Document>> {
        let collections = Arc::clone(&self.collections);
        let id = id.to_string();
        Box::pin(async move {
            let mut guard = collections.write().await;
            Ok(guard.get_mut(&collection).and_then(|data| data.remove(&id)))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
