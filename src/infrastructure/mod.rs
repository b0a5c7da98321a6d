//! Infrastructure module for persistence and reference synchronization.
//!
//! This module contains the document store abstraction and its backends, the
//! query language they share, and the synchronizer that issues secondary
//! writes between collections.

pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod synchronizer;

pub use factory::{ConfigurationError, FactoryError, StorageMode, StoreConfig, StoreFactory};
pub use in_memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{FindQuery, QueryError};
pub use store::{Collection, DocumentEdit, DocumentStore, StoreError, StoreFuture};
pub use synchronizer::{EditOutcome, ReferenceSynchronizer};
