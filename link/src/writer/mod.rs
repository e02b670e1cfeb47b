//! Query writers.
//!
//! Every statement kind is an immutable value: each builder method borrows
//! the current writer and returns a new one, so a partially built writer can
//! be reused as a template for several statements.
//!
//! ```rust
//! use quarry_link::writer::{select, QueryWriter, Where};
//!
//! let base = select(["name", "age"]).from(["person"]);
//! let adults = base.where_clause(Where::new().field("adult", true));
//! let first = base.limit(1);
//!
//! assert_eq!(base.to_query().unwrap(), "SELECT name, age FROM person");
//! assert_eq!(adults.to_query().unwrap(), "SELECT name, age FROM person WHERE adult = true");
//! assert_eq!(first.to_query().unwrap(), "SELECT name, age FROM person LIMIT BY 1");
//! ```

mod count;
mod create;
mod delete;
mod fields;
mod let_value;
pub mod operators;
mod raw_query;
mod relate;
mod relation;
mod select;
mod update;
pub mod value;
mod where_clause;

pub use count::{count, count_record, count_relation, CountQueryWriter};
pub use create::{create, create_record, CreateQueryWriter};
pub use delete::{del, del_record, del_relation, DeleteQueryWriter};
pub use let_value::{let_value, LetQueryWriter};
pub use operators::*;
pub use raw_query::{query, RawQueryWriter};
pub use relate::{relate, relate_relation, RelateQueryWriter};
pub use relation::RecordRelation;
pub use select::{select, Order, SelectQueryWriter};
pub use update::{update, update_record, update_relation, UpdateQueryWriter};
pub use value::{param, raw, thing, Raw, SqlValue};
pub use where_clause::{Condition, Where};

use crate::error::{QuarryError, Result};
use crate::models::QueryRequest;
use crate::schema::Schema;
use serde_json::Value;
use std::fmt;

/// Declared cardinality of a statement's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// The result is discarded.
    Zero,
    /// Exactly one row (or the writer's fallback).
    One,
    /// Zero or one row.
    Maybe,
    /// Any number of rows.
    Many,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quantity::Zero => "zero",
            Quantity::One => "one",
            Quantity::Maybe => "maybe",
            Quantity::Many => "many",
        };
        f.write_str(name)
    }
}

/// A single statement that can be sent through the batch executor.
pub trait QueryWriter: Send + Sync {
    /// Compile the statement. Fails when required clauses are missing or a
    /// builder call was invalid.
    fn to_query(&self) -> Result<String>;

    fn quantity(&self) -> Quantity;

    /// A schema fixed by the writer itself. Takes precedence over a schema
    /// supplied on the request.
    fn schema(&self) -> Option<&Schema> {
        None
    }

    /// Reshape the raw statement result before validation.
    fn transform(&self, rows: Value) -> Value {
        rows
    }

    /// Value used when a `one` statement returns no rows.
    fn fallback(&self) -> Option<Value> {
        None
    }
}

/// What a data-modifying statement hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnMode {
    None,
    Before,
    After,
    Diff,
    Fields(Vec<String>),
}

/// `RETURN`, `TIMEOUT` and `PARALLEL` clauses shared by the mutating writers.
#[derive(Debug, Clone, Default)]
pub(crate) struct Modifiers {
    pub return_mode: Option<ReturnMode>,
    pub timeout: Option<u64>,
    pub parallel: bool,
}

impl Modifiers {
    pub fn render_into(&self, out: &mut String) {
        match &self.return_mode {
            Some(ReturnMode::Fields(fields)) => {
                out.push_str(" RETURN ");
                out.push_str(&fields.join(", "));
            },
            Some(ReturnMode::None) => out.push_str(" RETURN NONE"),
            Some(ReturnMode::Before) => out.push_str(" RETURN BEFORE"),
            Some(ReturnMode::After) => out.push_str(" RETURN AFTER"),
            Some(ReturnMode::Diff) => out.push_str(" RETURN DIFF"),
            None => {},
        }
        render_timeout_parallel(self.timeout, self.parallel, out);
    }
}

pub(crate) fn render_timeout_parallel(timeout: Option<u64>, parallel: bool, out: &mut String) {
    if let Some(secs) = timeout.filter(|s| *s > 0) {
        out.push_str(&format!(" TIMEOUT {}s", secs));
    }
    if parallel {
        out.push_str(" PARALLEL");
    }
}

/// Record the first builder error; later ones are ignored.
pub(crate) fn fail(slot: &mut Option<String>, message: impl Into<String>) {
    if slot.is_none() {
        *slot = Some(message.into());
    }
}

pub(crate) fn check_valid(slot: &Option<String>) -> Result<()> {
    match slot {
        Some(message) => Err(QuarryError::InvalidQuery(message.clone())),
        None => Ok(()),
    }
}

/// Split a `;`-separated script into individual requests. Each statement is
/// executed with quantity `many` and accepts any result shape.
pub fn parse_queries(script: &str) -> Vec<QueryRequest> {
    script
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(|statement| QueryRequest::new(query(statement).with_any()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queries_splits_statements() {
        let requests = parse_queries("SELECT * FROM a;\n  UPDATE b SET x = 1 ;; ");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].query.to_query().unwrap(), "SELECT * FROM a");
        assert_eq!(requests[1].query.to_query().unwrap(), "UPDATE b SET x = 1");
        assert!(requests.iter().all(|r| r.query.quantity() == Quantity::Many));
        assert_eq!(requests[0].query.schema(), Some(&Schema::Any));
    }

    #[test]
    fn test_modifiers_render_in_order() {
        let mut out = String::from("DELETE a");
        Modifiers {
            return_mode: Some(ReturnMode::Fields(vec!["id".into(), "name".into()])),
            timeout: Some(5),
            parallel: true,
        }
        .render_into(&mut out);
        assert_eq!(out, "DELETE a RETURN id, name TIMEOUT 5s PARALLEL");
    }
}
