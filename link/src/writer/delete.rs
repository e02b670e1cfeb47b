use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::relation::RecordRelation;
use crate::writer::value::{check_single, render_target, thing, SqlValue};
use crate::writer::{
    check_valid, fail, Condition, Modifiers, Quantity, QueryWriter, ReturnMode,
};

/// Writer for `DELETE` statements. Returns the deleted records
/// (`RETURN BEFORE`) unless told otherwise.
#[derive(Debug, Clone)]
pub struct DeleteQueryWriter {
    schema: Option<Schema>,
    quantity: Quantity,
    targets: Vec<SqlValue>,
    relation: bool,
    condition: Option<Condition>,
    modifiers: Modifiers,
    invalid: Option<String>,
}

pub fn del<I, V>(targets: I) -> DeleteQueryWriter
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

    DeleteQueryWriter {
        schema: None,
        quantity: Quantity::Many,
        targets,
        relation: false,
        condition: None,
        modifiers: Modifiers {
            return_mode: Some(ReturnMode::Before),
            ..Modifiers::default()
        },
        invalid,
    }
}

pub fn del_record(table: &str, id: &str) -> DeleteQueryWriter {
    let mut writer = del([thing(table, id)]);
    writer.quantity = Quantity::Maybe;
    writer
}

pub fn del_relation(relation: &RecordRelation) -> DeleteQueryWriter {
    let mut writer = del([relation.edge.as_str()]);
    writer.quantity = Quantity::Maybe;
    writer.relation = true;
    writer.condition = Some(relation.where_clause().into());
    writer
}

impl DeleteQueryWriter {
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

    pub fn where_clause(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        self.push(|w| {
            if w.relation {
                fail(&mut w.invalid, "Cannot use where clause with delRelation");
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

impl QueryWriter for DeleteQueryWriter {
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
        let mut builder = format!("DELETE {}", targets);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::operators::lt;
    use crate::writer::Where;

    #[test]
    fn test_delete_returns_before_by_default() {
        let q = del(["session"]).where_clause(Where::new().field("expires", lt(100)));
        assert_eq!(q.to_query().unwrap(), "DELETE session WHERE expires < 100 RETURN BEFORE");
        assert_eq!(q.quantity(), Quantity::Many);
    }

    #[test]
    fn test_delete_record_and_relation() {
        let q = del_record("person", "tobie").return_mode(ReturnMode::None);
        assert_eq!(q.to_query().unwrap(), r#"DELETE type::thing("person", "tobie") RETURN NONE"#);
        assert_eq!(q.quantity(), Quantity::Maybe);

        let rel = RecordRelation::new("person", "1", "likes", "post", "2");
        let q = del_relation(&rel);
        assert_eq!(
            q.to_query().unwrap(),
            r#"DELETE likes WHERE in = type::thing("person", "1") AND out = type::thing("post", "2") RETURN BEFORE"#
        );
        assert!(q.where_clause("x = 1").to_query().is_err());
    }
}
