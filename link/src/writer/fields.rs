use crate::error::{QuarryError, Result};
use crate::writer::value::{escape, SqlValue};
use serde_json::Value;

/// Ordered `SET` assignments. Setting a key twice replaces the earlier value.
#[derive(Debug, Clone, Default)]
pub(crate) struct SetFields {
    entries: Vec<(String, SqlValue)>,
}

impl SetFields {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: String, value: SqlValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Merge every top-level key of a JSON object.
    pub fn insert_all(&mut self, fields: Value) -> Result<()> {
        match fields {
            Value::Object(map) => {
                for (key, value) in map {
                    self.insert(key, SqlValue::Json(value));
                }
                Ok(())
            },
            _ => Err(QuarryError::InvalidQuery(
                "Fields must be provided as an object".to_string(),
            )),
        }
    }

    /// Render as `a = 1, b.c = "x", d += 2`. Nested objects flatten into
    /// dotted paths.
    pub fn compile(&self) -> Result<String> {
        let mut out = Vec::new();
        for (key, value) in &self.entries {
            push_field(&mut out, key, value)?;
        }
        Ok(out.join(", "))
    }
}

fn push_field(out: &mut Vec<String>, path: &str, value: &SqlValue) -> Result<()> {
    match value {
        SqlValue::Raw(raw) => out.push(format!("{} {}", path, raw.render()?)),
        SqlValue::Json(Value::Object(map)) => {
            for (key, nested) in map {
                push_field(out, &format!("{}.{}", path, key), &SqlValue::Json(nested.clone()))?;
            }
        },
        other => out.push(format!("{} = {}", path, escape(other)?)),
    }
    Ok(())
}
