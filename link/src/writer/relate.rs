use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::fields::SetFields;
use crate::writer::relation::RecordRelation;
use crate::writer::value::{check_single, render_target, SqlValue};
use crate::writer::{check_valid, fail, Modifiers, Quantity, QueryWriter, ReturnMode};
use serde_json::Value;

/// Writer for `RELATE from->edge->to` statements.
#[derive(Debug, Clone)]
pub struct RelateQueryWriter {
    schema: Option<Schema>,
    from: SqlValue,
    edge: String,
    to: SqlValue,
    set_fields: SetFields,
    content: Option<Value>,
    modifiers: Modifiers,
    invalid: Option<String>,
}

/// Relate `from` to `to` through `edge`. Raw fragments and writers used as
/// endpoints are parenthesised.
pub fn relate(
    from: impl Into<SqlValue>,
    edge: impl Into<String>,
    to: impl Into<SqlValue>,
) -> RelateQueryWriter {
    let (from, edge, to) = (from.into(), edge.into(), to.into());
    let mut invalid = None;
    if let Err(err) = check_single(&[from.clone(), to.clone()], "records") {
        fail(&mut invalid, err.to_string());
    }
    if edge.trim().is_empty() {
        fail(&mut invalid, "From, edge, and to must be defined");
    }

    RelateQueryWriter {
        schema: None,
        from,
        edge,
        to,
        set_fields: SetFields::default(),
        content: None,
        modifiers: Modifiers::default(),
        invalid,
    }
}

/// Relate the two records described by `relation`.
pub fn relate_relation(relation: &RecordRelation) -> RelateQueryWriter {
    relate(
        relation.from_pointer(),
        relation.edge.clone(),
        relation.to_pointer(),
    )
}

impl RelateQueryWriter {
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

impl QueryWriter for RelateQueryWriter {
    fn to_query(&self) -> Result<String> {
        check_valid(&self.invalid)?;

        let from = render_target(&self.from, true)?;
        let to = render_target(&self.to, true)?;
        if from.is_empty() || to.is_empty() {
            return Err(QuarryError::InvalidQuery(
                "From, edge, and to must be defined".to_string(),
            ));
        }

        let mut builder = format!("RELATE {}->{}->{}", from, self.edge, to);

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
        Quantity::One
    }

    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::value::{param, thing};
    use serde_json::json;

    #[test]
    fn test_relate_plain_ids() {
        let q = relate("person:tobie", "likes", "post:1").set("weight", 3);
        assert_eq!(q.to_query().unwrap(), "RELATE person:tobie->likes->post:1 SET weight = 3");
        assert_eq!(q.quantity(), Quantity::One);
    }

    #[test]
    fn test_relate_raw_endpoints_are_wrapped() {
        let q = relate(param("from"), "likes", thing("post", "1"))
            .content(json!({"at": "today"}))
            .return_mode(ReturnMode::After);
        assert_eq!(
            q.to_query().unwrap(),
            r#"RELATE ($from)->likes->(type::thing("post", "1")) CONTENT {"at":"today"} RETURN AFTER"#
        );
    }

    #[test]
    fn test_relate_relation() {
        let rel = RecordRelation::new("person", "tobie", "likes", "post", "1");
        assert_eq!(
            relate_relation(&rel).to_query().unwrap(),
            r#"RELATE (type::thing("person", "tobie"))->likes->(type::thing("post", "1"))"#
        );
    }

    #[test]
    fn test_relate_rejects_multiple_records() {
        assert!(relate("a:1, a:2", "likes", "b:1").to_query().is_err());
        assert!(relate("a:1", "", "b:1").to_query().is_err());
    }
}
