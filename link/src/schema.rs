//! Structural result schemas.
//!
//! A [`Schema`] describes the JSON shape a statement is expected to produce.
//! The batch executor checks every row of a statement's result against it and
//! reports each mismatch with a dotted path rooted at the row index.

use crate::error::ValidationIssue;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Accepts every value unchanged.
    Any,
    Null,
    Bool,
    Number,
    String,
    Array(Box<Schema>),
    /// An object with known fields. Unknown keys are stripped from the
    /// output unless `passthrough` is set.
    Object {
        fields: Vec<(String, Schema)>,
        passthrough: bool,
    },
    /// Accepts null or a missing field, otherwise the inner schema.
    Optional(Box<Schema>),
}

impl Schema {
    pub fn any() -> Self {
        Schema::Any
    }

    pub fn number() -> Self {
        Schema::Number
    }

    pub fn string() -> Self {
        Schema::String
    }

    pub fn boolean() -> Self {
        Schema::Bool
    }

    pub fn array(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    pub fn optional(inner: Schema) -> Self {
        Schema::Optional(Box::new(inner))
    }

    /// Strict object: only the listed fields survive parsing.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Schema::Object {
            fields: fields.into_iter().map(|(k, s)| (k.into(), s)).collect(),
            passthrough: false,
        }
    }

    /// Keep keys that are not part of the schema.
    pub fn passthrough(self) -> Self {
        match self {
            Schema::Object { fields, .. } => Schema::Object {
                fields,
                passthrough: true,
            },
            other => other,
        }
    }

    /// Add (or replace) a field on an object schema.
    pub fn extend(self, key: impl Into<String>, schema: Schema) -> Self {
        match self {
            Schema::Object {
                mut fields,
                passthrough,
            } => {
                let key = key.into();
                fields.retain(|(k, _)| *k != key);
                fields.push((key, schema));
                Schema::Object {
                    fields,
                    passthrough,
                }
            },
            other => other,
        }
    }

    /// `{ id: string }`
    pub fn record() -> Self {
        Schema::object([("id", Schema::String)])
    }

    /// `{ id: string, in: string, out: string }`
    pub fn edge() -> Self {
        Schema::object([
            ("id", Schema::String),
            ("in", Schema::String),
            ("out", Schema::String),
        ])
    }

    /// Validate each row of a statement result, returning the parsed rows or
    /// every issue found.
    pub fn validate_array(&self, rows: Vec<Value>) -> Result<Vec<Value>, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let parsed: Vec<Value> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| self.parse_at(row, &i.to_string(), &mut issues))
            .collect();

        if issues.is_empty() {
            Ok(parsed)
        } else {
            Err(issues)
        }
    }

    /// Validate a single value.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let parsed = self.parse_at(value, "", &mut issues);
        if issues.is_empty() {
            Ok(parsed)
        } else {
            Err(issues)
        }
    }

    fn parse_at(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Value {
        match (self, value) {
            (Schema::Any, v) => v.clone(),
            (Schema::Optional(_), Value::Null) => Value::Null,
            (Schema::Optional(inner), v) => inner.parse_at(v, path, issues),
            (Schema::Null, Value::Null)
            | (Schema::Bool, Value::Bool(_))
            | (Schema::Number, Value::Number(_))
            | (Schema::String, Value::String(_)) => value.clone(),
            (Schema::Array(item), Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| item.parse_at(v, &join_path(path, &i.to_string()), issues))
                    .collect(),
            ),
            (
                Schema::Object {
                    fields,
                    passthrough,
                },
                Value::Object(map),
            ) => {
                let mut out = if *passthrough { map.clone() } else { Map::new() };
                for (key, schema) in fields {
                    let field_path = join_path(path, key);
                    match map.get(key) {
                        Some(v) => {
                            out.insert(key.clone(), schema.parse_at(v, &field_path, issues));
                        },
                        None if schema.accepts_missing() => {},
                        None => issues.push(ValidationIssue {
                            path: field_path,
                            message: "Required".to_string(),
                        }),
                    }
                }
                Value::Object(out)
            },
            (schema, v) => {
                issues.push(ValidationIssue {
                    path: path.to_string(),
                    message: format!(
                        "Expected {}, received {}",
                        schema.type_name(),
                        value_type_name(v)
                    ),
                });
                v.clone()
            },
        }
    }

    fn accepts_missing(&self) -> bool {
        matches!(self, Schema::Any | Schema::Optional(_))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Schema::Any => "any",
            Schema::Null => "null",
            Schema::Bool => "boolean",
            Schema::Number => "number",
            Schema::String => "string",
            Schema::Array(_) => "array",
            Schema::Object { .. } => "object",
            Schema::Optional(inner) => inner.type_name(),
        }
    }
}

fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", base, segment)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
