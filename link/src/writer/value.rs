//! Values embedded into generated query text.
//!
//! Plain JSON values are escaped through `serde_json`, `null` becomes `NONE`,
//! raw fragments are inserted verbatim and nested writers are parenthesised.

use crate::error::{QuarryError, Result};
use crate::writer::QueryWriter;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A pre-escaped query fragment, optionally followed by an operand that is
/// escaped when the surrounding statement is rendered.
///
/// ```rust
/// use quarry_link::writer::{gt, raw};
///
/// assert_eq!(raw("time::now()").render().unwrap(), "time::now()");
/// assert_eq!(gt(18).render().unwrap(), "> 18");
/// ```
#[derive(Clone, Debug)]
pub struct Raw {
    text: String,
    operand: Option<Box<SqlValue>>,
}

impl Raw {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            operand: None,
        }
    }

    /// `<op> <escaped operand>`, e.g. `= "alice"`.
    pub fn operator(op: &str, operand: impl Into<SqlValue>) -> Self {
        Self {
            text: op.to_string(),
            operand: Some(Box::new(operand.into())),
        }
    }

    pub fn render(&self) -> Result<String> {
        match &self.operand {
            None => Ok(self.text.clone()),
            Some(operand) => Ok(format!("{} {}", self.text, escape(operand)?)),
        }
    }
}

/// Insert `text` into a query without any escaping.
pub fn raw(text: impl Into<String>) -> Raw {
    Raw::new(text)
}

/// Reference a query parameter, rendered as `$name`.
pub fn param(name: &str) -> Raw {
    Raw::new(format!("${}", name))
}

/// Build a record pointer for `table` and `id` that cannot be spoofed into a
/// different table.
pub fn thing(table: &str, id: &str) -> Raw {
    Raw::new(thing_literal(table, id))
}

pub(crate) fn thing_literal(table: &str, id: &str) -> String {
    format!("type::thing({}, {})", json_string(table), json_string(id))
}

pub(crate) fn json_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Anything that may appear where the query language expects a value.
#[derive(Clone)]
pub enum SqlValue {
    Json(Value),
    Raw(Raw),
    Writer(Arc<dyn QueryWriter>),
}

impl SqlValue {
    pub fn writer<W: QueryWriter + 'static>(writer: W) -> Self {
        SqlValue::Writer(Arc::new(writer))
    }
}

impl fmt::Debug for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Json(v) => f.debug_tuple("Json").field(v).finish(),
            SqlValue::Raw(r) => f.debug_tuple("Raw").field(r).finish(),
            SqlValue::Writer(w) => f
                .debug_tuple("Writer")
                .field(&w.to_query().unwrap_or_else(|e| e.to_string()))
                .finish(),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

impl From<Raw> for SqlValue {
    fn from(value: Raw) -> Self {
        SqlValue::Raw(value)
    }
}

impl From<Arc<dyn QueryWriter>> for SqlValue {
    fn from(value: Arc<dyn QueryWriter>) -> Self {
        SqlValue::Writer(value)
    }
}

macro_rules! json_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Json(Value::from(value))
                }
            }
        )*
    };
}

json_value_from!(&str, String, bool, i32, i64, u32, u64, f64);

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Json(Value::Null))
    }
}

/// Escape a value for use inside a statement.
pub fn escape(value: &SqlValue) -> Result<String> {
    match value {
        SqlValue::Raw(raw) => raw.render(),
        SqlValue::Writer(writer) => Ok(format!("({})", writer.to_query()?)),
        SqlValue::Json(Value::Null) => Ok("NONE".to_string()),
        SqlValue::Json(v) => Ok(serde_json::to_string(v)?),
    }
}

/// Render a statement target. Plain strings are table names or record ids
/// and go in verbatim; raw fragments are optionally parenthesised.
pub(crate) fn render_target(value: &SqlValue, wrap_raw: bool) -> Result<String> {
    match value {
        SqlValue::Json(Value::String(name)) => Ok(name.clone()),
        SqlValue::Raw(raw) if wrap_raw => Ok(format!("({})", raw.render()?)),
        other => escape(other),
    }
}

/// Reject strings that would smuggle several targets into one slot.
pub(crate) fn check_single(values: &[SqlValue], what: &str) -> Result<()> {
    let multiple = values
        .iter()
        .any(|v| matches!(v, SqlValue::Json(Value::String(s)) if s.contains(',')));

    if multiple {
        return Err(QuarryError::InvalidQuery(format!(
            "Multiple {} must be specified separately",
            what
        )));
    }
    Ok(())
}
