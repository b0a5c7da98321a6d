//! Sort documents: `{"deadline": 1, "name": -1}`.

use std::cmp::Ordering;

use serde_json::Value;

use super::{FieldPath, QueryError};
use crate::domain::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn parse(field: &str, value: &Value) -> Result<Self, QueryError> {
        let direction = match value {
            Value::Number(number) => match number.as_i64() {
                Some(1) => Some(Self::Ascending),
                Some(-1) => Some(Self::Descending),
                _ => None,
            },
            Value::String(text) => match text.to_lowercase().as_str() {
                "1" | "asc" | "ascending" => Some(Self::Ascending),
                "-1" | "desc" | "descending" => Some(Self::Descending),
                _ => None,
            },
            _ => None,
        };
        direction.ok_or_else(|| QueryError::InvalidSortDirection(field.to_string()))
    }

    const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// An ordered list of sort keys. Empty means store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(FieldPath, SortDirection)>,
}

impl SortSpec {
    /// Parses a sort document, keeping key order.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the document is not an object or a direction is
    /// not `1`, `-1`, `"asc"` or `"desc"`.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(object) = value else {
            return Err(QueryError::NotAnObject("sort"));
        };

        let keys = object
            .iter()
            .map(|(field, direction)| {
                Ok((FieldPath::parse(field)?, SortDirection::parse(field, direction)?))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        Ok(Self { keys })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> &[(FieldPath, SortDirection)] {
        &self.keys
    }

    /// Compares two documents key by key.
    #[must_use]
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        self.keys
            .iter()
            .map(|(path, direction)| {
                direction.apply(compare_values(path.lookup(left), path.lookup(right)))
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Total order over JSON values: absent/null, numbers, strings, objects,
/// arrays, booleans.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let rank = |value: Option<&Value>| match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    };

    match (left, right) {
        (Some(Value::Number(left)), Some(Value::Number(right))) => left
            .as_f64()
            .partial_cmp(&right.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(left)), Some(Value::String(right))) => left.cmp(right),
        (Some(Value::Bool(left)), Some(Value::Bool(right))) => left.cmp(right),
        _ => rank(left).cmp(&rank(right)),
    }
}
