use crate::error::{QuarryError, Result};
use crate::schema::Schema;
use crate::writer::relation::RecordRelation;
use crate::writer::value::{check_single, render_target, thing, SqlValue};
use crate::writer::{
    check_valid, fail, render_timeout_parallel, Condition, Quantity, QueryWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Group {
    None,
    All,
    By(Vec<String>),
}

/// Writer for `SELECT` statements.
#[derive(Debug, Clone)]
pub struct SelectQueryWriter {
    schema: Option<Schema>,
    quantity: Quantity,
    projections: Vec<String>,
    targets: Vec<SqlValue>,
    relation: bool,
    condition: Option<Condition>,
    split: Vec<String>,
    group: Group,
    order: Vec<(String, Order)>,
    limit: Option<u64>,
    start: Option<u64>,
    fetch: Vec<String>,
    timeout: Option<u64>,
    parallel: bool,
    invalid: Option<String>,
}

/// Start a `SELECT` with the given projections. No projections selects `*`.
pub fn select<I, S>(projections: I) -> SelectQueryWriter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let projections: Vec<String> = projections.into_iter().map(Into::into).collect();
    let mut invalid = None;
    if projections.iter().any(|p| p.contains(',')) {
        fail(&mut invalid, "Multiple projections must be specified separately");
    }

    SelectQueryWriter {
        schema: None,
        quantity: Quantity::Many,
        projections,
        targets: Vec::new(),
        relation: false,
        condition: None,
        split: Vec::new(),
        group: Group::None,
        order: Vec::new(),
        limit: None,
        start: None,
        fetch: Vec::new(),
        timeout: None,
        parallel: false,
        invalid,
    }
}

impl SelectQueryWriter {
    fn push(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    pub fn with_schema(&self, schema: Schema) -> Self {
        self.push(|w| w.schema = Some(schema))
    }

    /// Accept any result shape.
    pub fn with_any(&self) -> Self {
        self.with_schema(Schema::Any)
    }

    /// Append another projection.
    pub fn and(&self, projection: impl Into<String>) -> Self {
        let projection = projection.into();
        self.push(|w| {
            if projection.contains(',') {
                fail(&mut w.invalid, "Multiple projections must be specified separately");
            }
            w.projections.push(projection);
        })
    }

    /// Append a subquery projection aliased as `alias`.
    pub fn and_query<W: QueryWriter>(&self, alias: &str, query: &W) -> Self {
        match query.to_query() {
            Ok(text) => self.push(|w| w.projections.push(format!("({}) AS {}", text, alias))),
            Err(err) => self.push(|w| fail(&mut w.invalid, err.to_string())),
        }
    }

    /// Table names, record ids, raw fragments or subqueries to read from.
    pub fn from<I, V>(&self, targets: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let targets: Vec<SqlValue> = targets.into_iter().map(Into::into).collect();
        self.push(|w| {
            if let Err(err) = check_single(&targets, "targets") {
                fail(&mut w.invalid, err.to_string());
            }
            w.targets = targets;
        })
    }

    /// Read a single record of a known table. Expects at most one row.
    pub fn from_record(&self, table: &str, id: &str) -> Self {
        let target = thing(table, id);
        self.push(|w| {
            w.targets = vec![target.into()];
            w.quantity = Quantity::Maybe;
            w.limit = Some(1);
        })
    }

    /// Read the edge record between two records. Installs its own where
    /// clause, so `where_clause` may not be combined with it.
    pub fn from_relation(&self, relation: &RecordRelation) -> Self {
        let edge = relation.edge.clone();
        let clause = relation.where_clause();
        self.push(|w| {
            w.targets = vec![SqlValue::from(edge)];
            w.condition = Some(clause.into());
            w.relation = true;
            w.quantity = Quantity::Maybe;
        })
    }

    pub fn where_clause(&self, condition: impl Into<Condition>) -> Self {
        let condition = condition.into();
        self.push(|w| {
            if w.relation {
                fail(&mut w.invalid, "Cannot use where clause with fromRelation");
            } else {
                w.condition = Some(condition);
            }
        })
    }

    pub fn split<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();
        self.push(|w| w.split = fields)
    }

    /// Group by the given fields. Use [`group_all`](Self::group_all) to
    /// aggregate the whole result.
    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();
        self.push(|w| w.group = Group::By(fields))
    }

    pub fn group_all(&self) -> Self {
        self.push(|w| w.group = Group::All)
    }

    /// Append an ordering. Calling it again for the same field replaces the
    /// direction.
    pub fn order_by(&self, field: impl Into<String>, order: Order) -> Self {
        let field = field.into();
        self.push(|w| match w.order.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = order,
            None => w.order.push((field, order)),
        })
    }

    /// Limit the number of rows. The statement then yields a list.
    pub fn limit(&self, limit: u64) -> Self {
        self.push(|w| {
            w.limit = Some(limit);
            w.quantity = Quantity::Many;
        })
    }

    /// Expect at most one row (`LIMIT BY 1`).
    pub fn one(&self) -> Self {
        self.push(|w| {
            w.limit = Some(1);
            w.quantity = Quantity::Maybe;
        })
    }

    pub fn start(&self, start: u64) -> Self {
        self.push(|w| w.start = Some(start))
    }

    pub fn fetch<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields.into_iter().map(Into::into).collect();
        self.push(|w| w.fetch = fields)
    }

    /// Server-side timeout in seconds.
    pub fn timeout(&self, seconds: u64) -> Self {
        self.push(|w| w.timeout = Some(seconds))
    }

    pub fn parallel(&self) -> Self {
        self.push(|w| w.parallel = true)
    }
}

impl QueryWriter for SelectQueryWriter {
    fn to_query(&self) -> Result<String> {
        check_valid(&self.invalid)?;

        if self.targets.is_empty() {
            return Err(QuarryError::InvalidQuery("No targets specified".to_string()));
        }

        let projections = if self.projections.is_empty() {
            "*".to_string()
        } else {
            self.projections.join(", ")
        };
        let targets = self
            .targets
            .iter()
            .map(|t| render_target(t, false))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let mut builder = format!("SELECT {} FROM {}", projections, targets);

        if let Some(condition) = &self.condition {
            if let Some(text) = condition.compile()? {
                builder.push_str(&format!(" WHERE {}", text));
            }
        }

        if !self.split.is_empty() {
            builder.push_str(&format!(" SPLIT {}", self.split.join(", ")));
        }

        match &self.group {
            Group::All => builder.push_str(" GROUP ALL"),
            Group::By(fields) if !fields.is_empty() => {
                builder.push_str(&format!(" GROUP BY {}", fields.join(", ")))
            },
            _ => {},
        }

        if !self.order.is_empty() {
            let orders = self
                .order
                .iter()
                .map(|(field, dir)| format!("{} {}", field, dir.keyword()))
                .collect::<Vec<_>>();
            builder.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            builder.push_str(&format!(" LIMIT BY {}", limit));
        }

        if let Some(start) = self.start.filter(|s| *s > 0) {
            builder.push_str(&format!(" START AT {}", start));
        }

        if !self.fetch.is_empty() {
            builder.push_str(&format!(" FETCH {}", self.fetch.join(", ")));
        }

        render_timeout_parallel(self.timeout, self.parallel, &mut builder);
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
    use crate::writer::value::raw;
    use crate::writer::{query, Where};

    #[test]
    fn test_defaults_to_star() {
        let q = select(Vec::<String>::new()).from(["example"]);
        assert_eq!(q.to_query().unwrap(), "SELECT * FROM example");
        assert_eq!(q.quantity(), Quantity::Many);
    }

    #[test]
    fn test_one_limits_by_one() {
        let q = select(["*"]).from(["example"]).one();
        assert_eq!(q.to_query().unwrap(), "SELECT * FROM example LIMIT BY 1");
        assert_eq!(q.quantity(), Quantity::Maybe);
    }

    #[test]
    fn test_from_record() {
        let q = select(["*"]).from_record("example", "test");
        assert_eq!(
            q.to_query().unwrap(),
            r#"SELECT * FROM type::thing("example", "test") LIMIT BY 1"#
        );
        assert_eq!(q.quantity(), Quantity::Maybe);
    }

    #[test]
    fn test_full_clause_order() {
        let q = select(["name", "count() AS total"])
            .from(["person", "admin"])
            .where_clause(Where::new().field("active", true))
            .split(["emails"])
            .group_by(["name"])
            .order_by("name", Order::Asc)
            .order_by("total", Order::Desc)
            .limit(10)
            .start(20)
            .fetch(["friends"])
            .timeout(3)
            .parallel();

        assert_eq!(
            q.to_query().unwrap(),
            "SELECT name, count() AS total FROM person, admin WHERE active = true \
             SPLIT emails GROUP BY name ORDER BY name ASC, total DESC LIMIT BY 10 \
             START AT 20 FETCH friends TIMEOUT 3s PARALLEL"
        );
    }

    #[test]
    fn test_group_all_and_text_where() {
        let q = select(["count()"]).from(["person"]).where_clause("age > 3").group_all();
        assert_eq!(q.to_query().unwrap(), "SELECT count() FROM person WHERE age > 3 GROUP ALL");
    }

    #[test]
    fn test_subquery_targets_and_projections() {
        let inner = select(["id"]).from(["post"]);
        let q = select(["*"])
            .and_query("posts", &inner)
            .from([SqlValue::writer(query("SELECT * FROM person")), raw("$table").into()]);
        assert_eq!(
            q.to_query().unwrap(),
            "SELECT *, (SELECT id FROM post) AS posts FROM (SELECT * FROM person), $table"
        );
    }

    #[test]
    fn test_builders_do_not_mutate_the_template() {
        let base = select(["*"]).from(["a"]);
        let limited = base.limit(5);
        assert_eq!(base.to_query().unwrap(), "SELECT * FROM a");
        assert_eq!(limited.to_query().unwrap(), "SELECT * FROM a LIMIT BY 5");
    }

    #[test]
    fn test_rejects_comma_targets_and_missing_targets() {
        let err = select(["*"]).from(["a, b"]).to_query().unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_query");
        assert!(err.to_string().contains("Multiple targets"));

        let err = select(["a, b"]).from(["t"]).to_query().unwrap_err();
        assert!(err.to_string().contains("Multiple projections"));

        assert!(select(["*"]).to_query().is_err());
    }

    #[test]
    fn test_relation_forbids_where() {
        let rel = RecordRelation::new("person", "1", "likes", "post", "2");
        let q = select(["*"]).from_relation(&rel);
        assert_eq!(
            q.to_query().unwrap(),
            r#"SELECT * FROM likes WHERE in = type::thing("person", "1") AND out = type::thing("post", "2")"#
        );
        assert_eq!(q.quantity(), Quantity::Maybe);

        let err = q.where_clause("x = 1").to_query().unwrap_err();
        assert!(err.to_string().contains("Cannot use where clause"));
    }

    #[test]
    fn test_empty_where_clause_is_omitted() {
        let q = select(["*"]).from(["a"]).where_clause(Where::new().or(vec![]));
        assert_eq!(q.to_query().unwrap(), "SELECT * FROM a");
    }
}
