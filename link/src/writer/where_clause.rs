//! Boolean where-clause compiler.
//!
//! A [`Where`] is an ordered list of entries joined with `AND`. Field entries
//! compile to `field = <escaped>` (or `field <raw>` for operator values),
//! `AND`/`OR` groups recurse and parenthesise each child, and a `QUERY` entry
//! compares the result of a subquery. Groups whose children are all empty
//! disappear from the output entirely.

use crate::error::{QuarryError, Result};
use crate::writer::value::{escape, Raw, SqlValue};
use crate::writer::QueryWriter;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum WhereEntry {
    Field(String, SqlValue),
    And(Vec<Where>),
    Or(Vec<Where>),
    Query(SqlValue, Raw),
}

/// A structured where clause.
///
/// ```rust
/// use quarry_link::writer::{gt, Where};
///
/// let clause = Where::new()
///     .field("age", gt(18))
///     .or(vec![Where::new().field("role", "admin"), Where::new().field("role", "owner")]);
///
/// assert_eq!(
///     clause.compile().unwrap(),
///     r#"age > 18 AND ((role = "admin") OR (role = "owner"))"#
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Where {
    entries: Vec<WhereEntry>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match `key` against a plain value (`key = value`) or an operator.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.entries.push(WhereEntry::Field(key.into(), value.into()));
        self
    }

    pub fn and(mut self, clauses: Vec<Where>) -> Self {
        self.entries.push(WhereEntry::And(clauses));
        self
    }

    pub fn or(mut self, clauses: Vec<Where>) -> Self {
        self.entries.push(WhereEntry::Or(clauses));
        self
    }

    /// Compare the result of a subquery, rendered as `(subquery) <raw>`.
    pub fn query<W: QueryWriter + 'static>(mut self, writer: W, condition: Raw) -> Self {
        self.entries
            .push(WhereEntry::Query(SqlValue::Writer(Arc::new(writer)), condition));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compile into query text. An empty or fully degenerate clause compiles
    /// to an empty string.
    pub fn compile(&self) -> Result<String> {
        let mut parts = Vec::with_capacity(self.entries.len());
        let mut grouped = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            match entry {
                WhereEntry::Field(key, SqlValue::Raw(raw)) => {
                    parts.push(format!("{} {}", key, raw.render()?));
                    grouped.push(false);
                },
                WhereEntry::Field(key, value) => {
                    parts.push(format!("{} = {}", key, escape(value)?));
                    grouped.push(false);
                },
                WhereEntry::Query(writer, condition) => {
                    parts.push(format!("{} {}", escape(writer)?, condition.render()?));
                    grouped.push(false);
                },
                WhereEntry::And(children) => {
                    if let Some((text, multi)) = compile_group(children, "AND")? {
                        parts.push(text);
                        grouped.push(multi);
                    }
                },
                WhereEntry::Or(children) => {
                    if let Some((text, multi)) = compile_group(children, "OR")? {
                        parts.push(text);
                        grouped.push(multi);
                    }
                },
            }
        }

        // A lone group needs no wrapper; next to siblings it must be
        // parenthesised to keep its own precedence.
        if parts.len() > 1 {
            for (part, multi) in parts.iter_mut().zip(grouped) {
                if multi {
                    *part = format!("({})", part);
                }
            }
        }

        Ok(parts.join(" AND "))
    }
}

/// Returns the group text and whether it joins more than one child.
fn compile_group(children: &[Where], keyword: &str) -> Result<Option<(String, bool)>> {
    let mut compiled = Vec::with_capacity(children.len());
    for child in children {
        let text = child.compile()?;
        if !text.is_empty() {
            compiled.push(text);
        }
    }

    match compiled.len() {
        0 => Ok(None),
        1 => Ok(compiled.pop().map(|text| (text, false))),
        _ => {
            let joined = compiled
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", keyword));
            Ok(Some((joined, true)))
        },
    }
}

/// A where clause given either as structured [`Where`] or as literal text.
#[derive(Debug, Clone)]
pub enum Condition {
    Text(String),
    Clause(Where),
}

impl Condition {
    /// Compiled text, or `None` when nothing remains after compilation.
    pub(crate) fn compile(&self) -> Result<Option<String>> {
        let text = match self {
            Condition::Text(text) => text.trim().to_string(),
            Condition::Clause(clause) => clause.compile()?,
        };
        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

impl From<Where> for Condition {
    fn from(value: Where) -> Self {
        Condition::Clause(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Condition::Text(value.to_string())
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Condition::Text(value)
    }
}

impl TryFrom<&Value> for Where {
    type Error = QuarryError;

    /// Build from an object-shaped clause such as
    /// `{"name": "x", "OR": [{"a": 1}, {"b": 2}]}`.
    fn try_from(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            QuarryError::InvalidRequest("Where clause must be an object".to_string())
        })?;

        let mut clause = Where::new();
        for (key, value) in object {
            match key.as_str() {
                "AND" | "OR" => {
                    let children = value
                        .as_array()
                        .ok_or_else(|| {
                            QuarryError::InvalidRequest(format!(
                                "Expected an array for {} in where clause",
                                key
                            ))
                        })?
                        .iter()
                        .map(Where::try_from)
                        .collect::<Result<Vec<_>>>()?;

                    clause = if key == "AND" {
                        clause.and(children)
                    } else {
                        clause.or(children)
                    };
                },
                _ => clause = clause.field(key.clone(), value.clone()),
            }
        }
        Ok(clause)
    }
}

impl TryFrom<Value> for Where {
    type Error = QuarryError;

    fn try_from(value: Value) -> Result<Self> {
        Where::try_from(&value)
    }
}
