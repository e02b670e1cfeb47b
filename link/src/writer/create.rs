use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::fields::SetFields;
use crate::writer::value::{check_single, render_target, thing, SqlValue};
use crate::writer::{check_valid, fail, Modifiers, Quantity, QueryWriter, ReturnMode};
use serde_json::Value;

/// Writer for `CREATE` statements.
#[derive(Debug, Clone)]
pub struct CreateQueryWriter {
    schema: Option<Schema>,
    quantity: Quantity,
    targets: Vec<SqlValue>,
    set_fields: SetFields,
    content: Option<Value>,
    modifiers: Modifiers,
    invalid: Option<String>,
}

/// Start a `CREATE` for the given targets. A single target yields one record;
/// several yield a list.
pub fn create<I, V>(targets: I) -> CreateQueryWriter
where
    I: IntoIterator<Item = V>,
    V: Into<SqlValue>,
{
    let targets: Vec<SqlValue> = targets.into_iter().map(Into::into).collect();
    let mut invalid = None;
    if targets.is_empty() {
        fail(&mut invalid, "At least one target must be specified");
    }
    if let Err(err) = check_single(&targets, "targets") {
        fail(&mut invalid, err.to_string());
    }

    CreateQueryWriter {
        schema: None,
        quantity: if targets.len() == 1 {
            Quantity::One
        } else {
            Quantity::Many
        },
        targets,
        set_fields: SetFields::default(),
        content: None,
        modifiers: Modifiers::default(),
        invalid,
    }
}

/// Start a `CREATE` for one record of a known table.
pub fn create_record(table: &str, id: &str) -> CreateQueryWriter {
    create([thing(table, id)])
}

impl CreateQueryWriter {
    fn push(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    pub fn with_schema(&self, schema: Schema) -> Self {
        self.push(|w| w.schema = Some(schema))
    }

    pub fn with_any(&self) -> Self {
        self.with_schema(Schema::Any)
    }

    /// Set one field. Values may be plain JSON, raw fragments or writers.
    pub fn set(&self, key: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.push(|w| {
            if w.content.is_some() {
                fail(&mut w.invalid, "Cannot set field when content is set");
            } else {
                w.set_fields.insert(key, value);
            }
        })
    }

    /// Set every field of `fields`. Nested objects become dotted paths.
    pub fn set_all(&self, fields: Value) -> Self {
        self.push(|w| {
            if w.content.is_some() {
                fail(&mut w.invalid, "Cannot set fields when content is set");
            } else if let Err(err) = w.set_fields.insert_all(fields) {
                fail(&mut w.invalid, err.to_string());
            }
        })
    }

    /// Use `content` as the whole record body.
    pub fn content(&self, content: Value) -> Self {
        self.push(|w| {
            if !w.set_fields.is_empty() {
                fail(&mut w.invalid, "Cannot set content when fields are set");
            } else {
                w.content = Some(content);
            }
        })
    }

    pub fn return_mode(&self, mode: ReturnMode) -> Self {
        self.push(|w| w.modifiers.return_mode = Some(mode))
    }

    pub fn return_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_mode(ReturnMode::Fields(fields.into_iter().map(Into::into).collect()))
    }

    pub fn timeout(&self, seconds: u64) -> Self {
        self.push(|w| w.modifiers.timeout = Some(seconds))
    }

    pub fn parallel(&self) -> Self {
        self.push(|w| w.modifiers.parallel = true)
    }
}

impl QueryWriter for CreateQueryWriter {
    fn to_query(&self) -> Result<String> {
        check_valid(&self.invalid)?;

        if self.targets.is_empty() {
            return Err(QuarryError::InvalidQuery("No targets specified".to_string()));
        }

        let targets = self
            .targets
            .iter()
            .map(|t| render_target(t, false))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let mut builder = format!("CREATE {}", targets);

        if !self.set_fields.is_empty() {
            let fields = self.set_fields.compile()?;
            if !fields.is_empty() {
                builder.push_str(&format!(" SET {}", fields));
            }
        } else if let Some(content) = &self.content {
            builder.push_str(&format!(" CONTENT {}", serde_json::to_string(content)?));
        }

        self.modifiers.render_into(&mut builder);
        Ok(builder)
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }
}
