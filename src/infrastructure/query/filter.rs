//! Filter documents.
//!
//! A filter is a JSON object whose keys are field paths or the logical
//! operators `$and`, `$or` and `$nor`:
//!
//! ```json
//! { "completed": false, "assignedUser": { "$in": ["u1", "u2"] } }
//! ```
//!
//! A literal field value means equality. Equality against an array field
//! matches when the whole array or any element equals the operand, so
//! `{"pendingTasks": "t1"}` finds every user with `t1` pending.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{FieldPath, QueryError};
use crate::domain::Document;

/// A parsed filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    /// A condition on one field.
    Field {
        path: FieldPath,
        condition: Condition,
    },
}

/// A condition on a single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

impl Filter {
    /// Parses a filter document.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the document is not an object, uses an
    /// unsupported operator, or gives an operator a malformed operand.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Object(object) => Self::parse_object(object),
            _ => Err(QueryError::NotAnObject("where")),
        }
    }

    /// Matches documents whose `_id` is one of `ids`.
    #[must_use]
    pub fn id_in(ids: &[String]) -> Self {
        Self::Field {
            path: FieldPath {
                segments: vec![crate::domain::ID_FIELD.to_string()],
            },
            condition: Condition::In(ids.iter().cloned().map(Value::String).collect()),
        }
    }

    fn parse_object(object: &Map<String, Value>) -> Result<Self, QueryError> {
        let mut clauses = Vec::with_capacity(object.len());

        for (key, operand) in object {
            let clause = match key.as_str() {
                "$and" => Self::And(parse_filter_list(key, operand)?),
                "$or" => Self::Or(parse_filter_list(key, operand)?),
                "$nor" => Self::Nor(parse_filter_list(key, operand)?),
                operator if operator.starts_with('$') => {
                    return Err(QueryError::UnknownOperator(operator.to_string()));
                }
                path => parse_field(FieldPath::parse(path)?, operand)?,
            };
            clauses.push(clause);
        }

        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.swap_remove(0),
            _ => Self::And(clauses),
        })
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(|filter| filter.matches(document)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(document)),
            Self::Nor(filters) => !filters.iter().any(|filter| filter.matches(document)),
            Self::Field { path, condition } => condition.matches(path.lookup(document)),
        }
    }
}

fn parse_filter_list(operator: &str, operand: &Value) -> Result<Vec<Filter>, QueryError> {
    let invalid = || QueryError::InvalidOperand {
        operator: operator.to_string(),
        expected: "a non-empty array of filter objects",
    };

    match operand {
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::Object(object) => Filter::parse_object(object),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn parse_field(path: FieldPath, operand: &Value) -> Result<Filter, QueryError> {
    let Value::Object(object) = operand else {
        return Ok(Filter::Field {
            path,
            condition: Condition::Eq(operand.clone()),
        });
    };

    let operator_count = object.keys().filter(|key| key.starts_with('$')).count();
    if operator_count == 0 {
        return Ok(Filter::Field {
            path,
            condition: Condition::Eq(operand.clone()),
        });
    }
    if operator_count != object.len() {
        return Err(QueryError::MixedCondition(path.to_string()));
    }

    let mut clauses = object
        .iter()
        .map(|(operator, value)| {
            Ok(Filter::Field {
                path: path.clone(),
                condition: Condition::parse(operator, value)?,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(if clauses.len() == 1 {
        clauses.swap_remove(0)
    } else {
        Filter::And(clauses)
    })
}

impl Condition {
    fn parse(operator: &str, operand: &Value) -> Result<Self, QueryError> {
        let value = operand.clone();
        match operator {
            "$eq" => Ok(Self::Eq(value)),
            "$ne" => Ok(Self::Ne(value)),
            "$gt" => Ok(Self::Gt(value)),
            "$gte" => Ok(Self::Gte(value)),
            "$lt" => Ok(Self::Lt(value)),
            "$lte" => Ok(Self::Lte(value)),
            "$in" | "$nin" => {
                let Value::Array(values) = value else {
                    return Err(QueryError::InvalidOperand {
                        operator: operator.to_string(),
                        expected: "an array",
                    });
                };
                Ok(if operator == "$in" {
                    Self::In(values)
                } else {
                    Self::Nin(values)
                })
            }
            "$exists" => match operand {
                Value::Bool(flag) => Ok(Self::Exists(*flag)),
                Value::Number(number) => Ok(Self::Exists(number.as_f64() != Some(0.0))),
                _ => Err(QueryError::InvalidOperand {
                    operator: operator.to_string(),
                    expected: "a boolean",
                }),
            },
            other => Err(QueryError::UnknownOperator(other.to_string())),
        }
    }

    /// Evaluates the condition against a field value (`None` when absent).
    #[must_use]
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => field_equals(field, expected),
            Self::Ne(expected) => !field_equals(field, expected),
            Self::Gt(bound) => compare_scalar(field, bound).is_some_and(Ordering::is_gt),
            Self::Gte(bound) => compare_scalar(field, bound).is_some_and(Ordering::is_ge),
            Self::Lt(bound) => compare_scalar(field, bound).is_some_and(Ordering::is_lt),
            Self::Lte(bound) => compare_scalar(field, bound).is_some_and(Ordering::is_le),
            Self::In(candidates) => candidates
                .iter()
                .any(|candidate| field_equals(field, candidate)),
            Self::Nin(candidates) => !candidates
                .iter()
                .any(|candidate| field_equals(field, candidate)),
            Self::Exists(expected) => field.is_some() == *expected,
        }
    }
}

/// Equality with array-contains semantics; an absent field equals `null`.
fn field_equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(actual) => {
            values_equal(actual, expected)
                || matches!(actual, Value::Array(items) if items.iter().any(|item| values_equal(item, expected)))
        }
    }
}

#[allow(clippy::float_cmp)]
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

/// Orders two scalars of the same JSON type; other pairs are incomparable.
fn compare_scalar(field: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (field?, bound) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(object) => object,
            _ => panic!("expected object"),
        }
    }

    fn task_document() -> Document {
        document(json!({
            "_id": "t1",
            "name": "Write report",
            "completed": false,
            "assignedUser": "u1",
            "priority": 3,
            "tags": ["work", "urgent"],
            "meta": {"owner": "ada"}
        }))
    }

    #[rstest]
    #[case(json!({}), true)]
    #[case(json!({"completed": false}), true)]
    #[case(json!({"completed": true}), false)]
    #[case(json!({"tags": "urgent"}), true)]
    #[case(json!({"tags": ["work", "urgent"]}), true)]
    #[case(json!({"tags": "home"}), false)]
    #[case(json!({"meta.owner": "ada"}), true)]
    #[case(json!({"meta": {"owner": "ada"}}), true)]
    #[case(json!({"priority": 3.0}), true)]
    #[case(json!({"missing": null}), true)]
    #[case(json!({"assignedUser": {"$ne": "u2"}}), true)]
    #[case(json!({"assignedUser": {"$in": ["u2", "u1"]}}), true)]
    #[case(json!({"assignedUser": {"$nin": ["u1"]}}), false)]
    #[case(json!({"priority": {"$gt": 2, "$lte": 3}}), true)]
    #[case(json!({"priority": {"$lt": 3}}), false)]
    #[case(json!({"priority": {"$gt": "2"}}), false)]
    #[case(json!({"name": {"$gte": "Write"}}), true)]
    #[case(json!({"missing": {"$exists": false}}), true)]
    #[case(json!({"name": {"$exists": true}}), true)]
    #[case(json!({"$or": [{"completed": true}, {"assignedUser": "u1"}]}), true)]
    #[case(json!({"$and": [{"completed": false}, {"assignedUser": "u2"}]}), false)]
    #[case(json!({"$nor": [{"completed": true}]}), true)]
    fn test_filter_matches(#[case] filter: Value, #[case] expected: bool) {
        let filter = Filter::parse(&filter).unwrap();
        assert_eq!(filter.matches(&task_document()), expected);
    }

    #[rstest]
    #[case(json!("not an object"))]
    #[case(json!([{"completed": true}]))]
    #[case(json!({"$where": "1 == 1"}))]
    #[case(json!({"name": {"$regex": "^W"}}))]
    #[case(json!({"name": {"$in": "Write report"}}))]
    #[case(json!({"name": {"$exists": "yes"}}))]
    #[case(json!({"name": {"$eq": "x", "first": "y"}}))]
    #[case(json!({"$or": []}))]
    #[case(json!({"$and": {"completed": true}}))]
    #[case(json!({"meta..owner": "ada"}))]
    fn test_filter_parse_rejects(#[case] filter: Value) {
        assert!(Filter::parse(&filter).is_err());
    }

    #[rstest]
    fn test_filter_parse_single_clause_is_not_wrapped() {
        let filter = Filter::parse(&json!({"completed": true})).unwrap();
        assert!(matches!(filter, Filter::Field { .. }));
    }

    #[rstest]
    fn test_id_in() {
        let filter = Filter::id_in(&["t2".to_string(), "t1".to_string()]);
        assert!(filter.matches(&task_document()));
        assert!(!Filter::id_in(&[]).matches(&task_document()));
    }

    proptest! {
        #[test]
        fn prop_ne_is_negation_of_eq(value in 0_i64..5, field in 0_i64..5) {
            let doc = document(json!({ "n": field }));
            let eq = Filter::parse(&json!({ "n": value })).unwrap();
            let ne = Filter::parse(&json!({ "n": { "$ne": value } })).unwrap();
            prop_assert_eq!(eq.matches(&doc), !ne.matches(&doc));
        }

        #[test]
        fn prop_nin_is_negation_of_in(values in proptest::collection::vec(0_i64..5, 0..4), field in 0_i64..5) {
            let doc = document(json!({ "n": field }));
            let included = Filter::parse(&json!({ "n": { "$in": values.clone() } })).unwrap();
            let excluded = Filter::parse(&json!({ "n": { "$nin": values } })).unwrap();
            prop_assert_eq!(included.matches(&doc), !excluded.matches(&doc));
        }
    }
}
