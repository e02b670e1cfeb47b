use crate::schema::Schema;
use crate::writer::QueryWriter;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

/// Named query parameters, referenced as `$name` in query text.
pub type Params = Map<String, JsonValue>;

/// One statement of a batch together with how to check its result.
///
/// # Examples
///
/// ```rust
/// use quarry_link::writer::{select, Where, param};
/// use quarry_link::{QueryRequest, Schema};
/// use serde_json::json;
///
/// let request = QueryRequest::new(
///     select(["*"]).from(["person"]).where_clause(Where::new().field("age", param("age"))),
/// )
/// .with_schema(Schema::record())
/// .with_param("age", json!(30));
/// ```
#[derive(Clone)]
pub struct QueryRequest {
    pub query: Arc<dyn QueryWriter>,

    /// Result schema for writers that do not fix their own. Supplying both
    /// is rejected by the executor.
    pub schema: Option<Schema>,

    pub params: Params,

    /// `Some(false)` skips schema validation for this statement.
    pub validate: Option<bool>,
}

impl QueryRequest {
    pub fn new<W: QueryWriter + 'static>(query: W) -> Self {
        Self::from_writer(Arc::new(query))
    }

    pub fn from_writer(query: Arc<dyn QueryWriter>) -> Self {
        Self {
            query,
            schema: None,
            params: Params::new(),
            validate: None,
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Use the (transformed) rows as returned, without schema checks.
    pub fn without_validation(mut self) -> Self {
        self.validate = Some(false);
        self
    }
}

impl fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("query", &self.query.to_query().unwrap_or_else(|e| e.to_string()))
            .field("quantity", &self.query.quantity())
            .field("schema", &self.schema)
            .field("params", &self.params)
            .field("validate", &self.validate)
            .finish()
    }
}
