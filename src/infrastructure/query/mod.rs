//! Query documents understood by every document store.
//!
//! Clients send filters, sort orders and projections as JSON documents in the
//! `where`, `sort` and `select` query parameters. This module parses them into
//! typed values that the in-memory store evaluates directly and the
//! `PostgreSQL` store translates into SQL.

pub mod filter;
pub mod projection;
pub mod sort;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::domain::Document;

pub use filter::{Condition, Filter};
pub use projection::Projection;
pub use sort::{SortDirection, SortSpec};

// =============================================================================
// Query Error
// =============================================================================

/// A query document that cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The document is not a JSON object.
    #[error("{0} must be a JSON object")]
    NotAnObject(&'static str),

    /// An operator this store does not support.
    #[error("unsupported operator '{0}'")]
    UnknownOperator(String),

    /// An operator received an operand of the wrong shape.
    #[error("operator '{operator}' expects {expected}")]
    InvalidOperand {
        operator: String,
        expected: &'static str,
    },

    /// A field condition mixes operators with plain keys.
    #[error("cannot mix operators and fields in the condition for '{0}'")]
    MixedCondition(String),

    /// A field path with empty segments.
    #[error("invalid field path '{0}'")]
    InvalidFieldPath(String),

    /// A sort direction other than ascending or descending.
    #[error("invalid sort direction for '{0}'")]
    InvalidSortDirection(String),

    /// A projection flag that is neither truthy nor falsy.
    #[error("invalid projection value for '{0}'")]
    InvalidProjectionValue(String),

    /// A projection including some fields and excluding others.
    #[error("cannot mix inclusion and exclusion in a projection")]
    MixedProjection,
}

// =============================================================================
// Field Path
// =============================================================================

/// A dotted path into a document, such as `assignedUser` or `meta.owner`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidFieldPath` if the path or any segment is empty.
    pub fn parse(path: &str) -> Result<Self, QueryError> {
        let segments: Vec<String> = path.split('.').map(ToString::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(QueryError::InvalidFieldPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Looks the path up in a document.
    #[must_use]
    pub fn lookup<'a>(&self, document: &'a Document) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        rest.iter()
            .try_fold(document.get(first)?, |value, segment| match value {
                Value::Object(object) => object.get(segment),
                _ => None,
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.segments.join("."))
    }
}

// =============================================================================
// Find Query
// =============================================================================

/// Everything a `find` call needs besides the collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: SortSpec,
    pub projection: Projection,
    pub skip: usize,
    /// Maximum number of documents; `None` means unlimited.
    pub limit: Option<usize>,
}

impl FindQuery {
    /// Creates a query matching `filter` with no ordering or paging.
    #[must_use]
    pub fn matching(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Applies sort, skip, limit and projection to already-filtered documents.
    #[must_use]
    pub fn arrange(&self, mut documents: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            // stable: ties keep insertion order
            documents.sort_by(|left, right| self.sort.compare(left, right));
        }

        let page = documents.into_iter().skip(self.skip);
        let page: Vec<Document> = match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        };

        page.into_iter()
            .map(|document| self.projection.apply(document))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    #[rstest]
    #[case("name", true)]
    #[case("meta.owner", true)]
    #[case("", false)]
    #[case("meta.", false)]
    #[case(".owner", false)]
    fn test_field_path_parse(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(FieldPath::parse(input).is_ok(), valid);
    }

    #[rstest]
    fn test_field_path_lookup_nested() {
        let doc = document(json!({"meta": {"owner": "ada"}, "name": "x"}));
        let path = FieldPath::parse("meta.owner").unwrap();
        assert_eq!(path.lookup(&doc), Some(&json!("ada")));

        let missing = FieldPath::parse("name.first").unwrap();
        assert_eq!(missing.lookup(&doc), None);
    }

    #[rstest]
    fn test_arrange_sorts_pages_and_projects() {
        let documents: Vec<Document> = (0..5)
            .map(|index| document(json!({"_id": format!("d{index}"), "rank": 5 - index})))
            .collect();

        let query = FindQuery {
            filter: Filter::All,
            sort: SortSpec::parse(&json!({"rank": 1})).unwrap(),
            projection: Projection::parse(&json!({"_id": 1})).unwrap(),
            skip: 1,
            limit: Some(2),
        };

        let arranged = query.arrange(documents);
        assert_eq!(
            arranged,
            vec![document(json!({"_id": "d3"})), document(json!({"_id": "d2"}))]
        );
    }
}
