use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::relation::RecordRelation;
use crate::writer::value::{check_single, render_target, thing, SqlValue};
use crate::writer::{check_valid, fail, Condition, Quantity, QueryWriter};
use serde_json::Value;

/// Writer counting the rows of a target. Always yields a single number,
/// falling back to `0` when nothing matched.
#[derive(Debug, Clone)]
pub struct CountQueryWriter {
    target: SqlValue,
    relation: bool,
    condition: Option<Condition>,
    schema: Schema,
    invalid: Option<String>,
}

pub fn count(target: impl Into<SqlValue>) -> CountQueryWriter {
    let target = target.into();
    let mut invalid = None;
    if let Err(err) = check_single(std::slice::from_ref(&target), "targets") {
        fail(&mut invalid, err.to_string());
    }

    CountQueryWriter {
        target,
        relation: false,
        condition: None,
        schema: Schema::Number,
        invalid,
    }
}

pub fn count_record(table: &str, id: &str) -> CountQueryWriter {
    count(thing(table, id))
}

pub fn count_relation(relation: &RecordRelation) -> CountQueryWriter {
    let mut writer = count(relation.edge.as_str());
    writer.relation = true;
    writer.condition = Some(relation.where_clause().into());
    writer
}

impl CountQueryWriter {
    pub fn where_clause(&self, condition: impl Into<Condition>) -> Self {
        let mut next = self.clone();
        if next.relation {
            fail(&mut next.invalid, "Cannot use where clause with countRelation");
        } else {
            next.condition = Some(condition.into());
        }
        next
    }
}

impl QueryWriter for CountQueryWriter {
    fn to_query(&self) -> Result<String> {
        check_valid(&self.invalid)?;

        let target = render_target(&self.target, false)?;
        if target.is_empty() {
            return Err(QuarryError::InvalidQuery("No target specified".to_string()));
        }

        let mut builder = format!("SELECT count() FROM {}", target);
        if let Some(condition) = &self.condition {
            if let Some(text) = condition.compile()? {
                builder.push_str(&format!(" WHERE {}", text));
            }
        }
        builder.push_str(" GROUP ALL");
        Ok(builder)
    }

    fn quantity(&self) -> Quantity {
        Quantity::One
    }

    fn schema(&self) -> Option<&Schema> {
        Some(&self.schema)
    }

    /// `[{count: n}]` becomes `[n]`.
    fn transform(&self, rows: Value) -> Value {
        match rows {
            Value::Array(rows) => Value::Array(
                rows.into_iter()
                    .map(|row| row.get("count").cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
            other => other,
        }
    }

    fn fallback(&self) -> Option<Value> {
        Some(Value::from(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::operators::gte;
    use crate::writer::Where;
    use serde_json::json;

    #[test]
    fn test_count_query() {
        let q = count("person").where_clause(Where::new().field("age", gte(18)));
        assert_eq!(q.to_query().unwrap(), "SELECT count() FROM person WHERE age >= 18 GROUP ALL");
        assert_eq!(q.quantity(), Quantity::One);
        assert_eq!(q.schema(), Some(&Schema::Number));
        assert_eq!(q.fallback(), Some(json!(0)));
    }

    #[test]
    fn test_count_transform_extracts_counts() {
        let q = count("person");
        assert_eq!(q.transform(json!([{"count": 3}])), json!([3]));
        assert_eq!(q.transform(json!([])), json!([]));
    }

    #[test]
    fn test_count_record_and_relation() {
        assert_eq!(
            count_record("person", "tobie").to_query().unwrap(),
            r#"SELECT count() FROM type::thing("person", "tobie") GROUP ALL"#
        );

        let rel = RecordRelation::new("person", "1", "likes", "post", "2");
        let q = count_relation(&rel);
        assert_eq!(
            q.to_query().unwrap(),
            concat!(
                r#"SELECT count() FROM likes WHERE in = type::thing("person", "1") "#,
                r#"AND out = type::thing("post", "2") GROUP ALL"#
            )
        );
        assert!(q.where_clause("a = 1").to_query().is_err());
    }
}
