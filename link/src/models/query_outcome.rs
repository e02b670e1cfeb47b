use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Reconciled result of one statement, shaped by its quantity.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Quantity `zero`: the statement's result is discarded.
    Absent,
    /// Quantity `one` or `maybe`. `None` only for `maybe` with no rows.
    Single(Option<JsonValue>),
    /// Quantity `many`.
    Many(Vec<JsonValue>),
}

impl QueryOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, QueryOutcome::Absent | QueryOutcome::Single(None))
    }

    /// Collapse into a plain JSON value; absent results become `null`.
    pub fn into_value(self) -> JsonValue {
        match self {
            QueryOutcome::Absent | QueryOutcome::Single(None) => JsonValue::Null,
            QueryOutcome::Single(Some(value)) => value,
            QueryOutcome::Many(rows) => JsonValue::Array(rows),
        }
    }

    /// Deserialize into a caller type: `T` for `one`, `Option<T>` for
    /// `maybe`, `Vec<T>` for `many`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.into_value())?)
    }

    pub fn as_single(&self) -> Option<&JsonValue> {
        match self {
            QueryOutcome::Single(value) => value.as_ref(),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[JsonValue]> {
        match self {
            QueryOutcome::Many(rows) => Some(rows),
            _ => None,
        }
    }
}
