//! Projection documents: `{"name": 1, "email": 1}` or `{"pendingTasks": 0}`.
//!
//! Inclusion keeps `_id` unless it is explicitly excluded; exclusion removes
//! the listed fields. The two styles cannot be mixed, `_id` aside.

use serde_json::{Map, Value};

use super::{FieldPath, QueryError};
use crate::domain::{Document, ID_FIELD};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Return documents unchanged.
    #[default]
    All,
    /// Keep only the listed fields (and `_id` when `include_id`).
    Include {
        fields: Vec<FieldPath>,
        include_id: bool,
    },
    /// Drop the listed fields.
    Exclude { fields: Vec<FieldPath> },
}

impl Projection {
    /// Parses a projection document.
    ///
    /// # Errors
    ///
    /// Returns `QueryError` if the document is not an object, a flag is not a
    /// boolean or number, or inclusion and exclusion are mixed.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(object) = value else {
            return Err(QueryError::NotAnObject("select"));
        };

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut id_flag = None;

        for (field, flag) in object {
            let keep = match flag {
                Value::Bool(keep) => *keep,
                Value::Number(number) => number.as_f64() != Some(0.0),
                _ => return Err(QueryError::InvalidProjectionValue(field.clone())),
            };
            if field == ID_FIELD {
                id_flag = Some(keep);
                continue;
            }
            let path = FieldPath::parse(field)?;
            if keep {
                included.push(path);
            } else {
                excluded.push(path);
            }
        }

        match (included.is_empty(), excluded.is_empty(), id_flag) {
            (false, false, _) => Err(QueryError::MixedProjection),
            (false, true, id_flag) => Ok(Self::Include {
                fields: included,
                include_id: id_flag.unwrap_or(true),
            }),
            (true, false, Some(true) | None) => Ok(Self::Exclude { fields: excluded }),
            (true, false, Some(false)) => {
                excluded.push(id_path());
                Ok(Self::Exclude { fields: excluded })
            }
            (true, true, Some(true) | None) => Ok(if id_flag.is_some() {
                Self::Include {
                    fields: Vec::new(),
                    include_id: true,
                }
            } else {
                Self::All
            }),
            (true, true, Some(false)) => Ok(Self::Exclude {
                fields: vec![id_path()],
            }),
        }
    }

    /// Applies the projection to a document.
    #[must_use]
    pub fn apply(&self, mut document: Document) -> Document {
        match self {
            Self::All => document,
            Self::Include { fields, include_id } => {
                let mut projected = Map::new();
                if *include_id && let Some(id) = document.remove(ID_FIELD) {
                    projected.insert(ID_FIELD.to_string(), id);
                }
                for path in fields {
                    if let Some(value) = path.lookup(&document) {
                        insert_path(&mut projected, path.segments(), value.clone());
                    }
                }
                projected
            }
            Self::Exclude { fields } => {
                for path in fields {
                    remove_path(&mut document, path.segments());
                }
                document
            }
        }
    }
}

fn id_path() -> FieldPath {
    FieldPath {
        segments: vec![ID_FIELD.to_string()],
    }
}

fn insert_path(target: &mut Document, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let child = target
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

fn remove_path(target: &mut Document, segments: &[String]) {
    match segments {
        [] => {}
        [last] => {
            target.shift_remove(last);
        }
        [first, rest @ ..] => {
            if let Some(Value::Object(child)) = target.get_mut(first) {
                remove_path(child, rest);
            }
        }
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

    fn user_document() -> Document {
        document(json!({
            "_id": "u1",
            "name": "Ada",
            "email": "ada@example.com",
            "pendingTasks": ["t1"],
            "meta": {"team": "core", "level": 3}
        }))
    }

    #[rstest]
    #[case(json!({}), json!({"_id": "u1", "name": "Ada", "email": "ada@example.com", "pendingTasks": ["t1"], "meta": {"team": "core", "level": 3}}))]
    #[case(json!({"name": 1}), json!({"_id": "u1", "name": "Ada"}))]
    #[case(json!({"name": true, "_id": 0}), json!({"name": "Ada"}))]
    #[case(json!({"_id": 1}), json!({"_id": "u1"}))]
    #[case(json!({"meta.team": 1}), json!({"_id": "u1", "meta": {"team": "core"}}))]
    #[case(json!({"pendingTasks": 0, "meta": 0}), json!({"_id": "u1", "name": "Ada", "email": "ada@example.com"}))]
    #[case(json!({"_id": 0}), json!({"name": "Ada", "email": "ada@example.com", "pendingTasks": ["t1"], "meta": {"team": "core", "level": 3}}))]
    #[case(json!({"meta.level": 0, "_id": 0, "email": 0, "pendingTasks": 0}), json!({"name": "Ada", "meta": {"team": "core"}}))]
    fn test_projection_apply(#[case] projection: Value, #[case] expected: Value) {
        let projection = Projection::parse(&projection).unwrap();
        assert_eq!(
            Value::Object(projection.apply(user_document())),
            expected
        );
    }

    #[rstest]
    #[case(json!({"name": 1, "email": 0}))]
    #[case(json!({"name": "yes"}))]
    #[case(json!("name"))]
    fn test_projection_parse_rejects(#[case] projection: Value) {
        assert!(Projection::parse(&projection).is_err());
    }
}
