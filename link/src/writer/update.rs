use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::fields::SetFields;
use crate::writer::relation::RecordRelation;
use crate::writer::value::{check_single, render_target, thing, SqlValue};
use crate::writer::{
    check_valid, fail, Condition, Modifiers, Quantity, QueryWriter, ReturnMode,
};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentMode {
    Replace,
    Merge,
}

/// Writer for `UPDATE` statements.
#[derive(Debug, Clone)]
pub struct UpdateQueryWriter {
    schema: Option<Schema>,
    quantity: Quantity,
    targets: Vec<SqlValue>,
    relation: bool,
    set_fields: SetFields,
    content: Option<(ContentMode, Value)>,
    condition: Option<Condition>,
    modifiers: Modifiers,
    invalid: Option<String>,
}

pub fn update<I, V>(targets: I) -> UpdateQueryWriter
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

    UpdateQueryWriter {
        schema: None,
        quantity: Quantity::Many,
        targets,
        relation: false,
        set_fields: SetFields::default(),
        content: None,
        condition: None,
        modifiers: Modifiers::default(),
        invalid,
    }
}

/// Update one record of a known table.
pub fn update_record(table: &str, id: &str) -> UpdateQueryWriter {
    let mut writer = update([thing(table, id)]);
    writer.quantity = Quantity::Maybe;
    writer
}

/// Update the edge record between two records.
pub fn update_relation(relation: &RecordRelation) -> UpdateQueryWriter {
    let mut writer = update([relation.edge.as_str()]);
    writer.quantity = Quantity::Maybe;
    writer.relation = true;
    writer.condition = Some(relation.where_clause().into());
    writer
}

impl UpdateQueryWriter {
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

    pub fn set_all(&self, fields: Value) -> Self {
        self.push(|w| {
            if w.content.is_some() {
                fail(&mut w.invalid, "Cannot set fields when content is set");
            } else if let Err(err) = w.set_fields.insert_all(fields) {
                fail(&mut w.invalid, err.to_string());
            }
        })
    }

    /// Replace the record body (`CONTENT`).
    pub fn content(&self, content: Value) -> Self {
        self.with_content(ContentMode::Replace, content)
    }

    /// Merge into the record body (`MERGE`).
    pub fn merge(&self, content: Value) -> Self {
        self.with_content(ContentMode::Merge, content)
    }

    fn with_content(&self, mode: ContentMode, content: Value) -> Self {
        self.push(|w| {
            if !w.set_fields.is_empty() {
                fail(&mut w.invalid, "Cannot set content when fields are set");
            } else {
                w.content = Some((mode, content));
            }
        })
    }

    pub fn where_clause(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        self.push(|w| {
            if w.relation {
                fail(&mut w.invalid, "Cannot use where clause with updateRelation");
            } else {
                w.condition = Some(condition);
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

impl QueryWriter for UpdateQueryWriter {
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
        let mut builder = format!("UPDATE {}", targets);

        if !self.set_fields.is_empty() {
            let fields = self.set_fields.compile()?;
            if !fields.is_empty() {
                builder.push_str(&format!(" SET {}", fields));
            }
        } else if let Some((mode, content)) = &self.content {
            let keyword = match mode {
                ContentMode::Replace => "CONTENT",
                ContentMode::Merge => "MERGE",
            };
            builder.push_str(&format!(" {} {}", keyword, serde_json::to_string(content)?));
        }

        if let Some(condition) = &self.condition {
            if let Some(text) = condition.compile()? {
                builder.push_str(&format!(" WHERE {}", text));
            }
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
