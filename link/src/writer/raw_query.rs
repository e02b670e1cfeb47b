use crate::error::Result;
use crate::schema::Schema;
use crate::writer::{Quantity, QueryWriter};

/// A hand-written statement. Prefer query parameters over formatting
/// untrusted input into the text.
#[derive(Debug, Clone)]
pub struct RawQueryWriter {
    query: String,
    quantity: Quantity,
    schema: Option<Schema>,
}

pub fn query(text: impl Into<String>) -> RawQueryWriter {
    RawQueryWriter {
        query: text.into(),
        quantity: Quantity::Many,
        schema: None,
    }
}

impl RawQueryWriter {
    /// Expect at most one row.
    pub fn single(&self) -> Self {
        Self {
            quantity: Quantity::Maybe,
            ..self.clone()
        }
    }

    pub fn with_schema(&self, schema: Schema) -> Self {
        Self {
            schema: Some(schema),
            ..self.clone()
        }
    }

    pub fn with_any(&self) -> Self {
        self.with_schema(Schema::Any)
    }
}

impl QueryWriter for RawQueryWriter {
    fn to_query(&self) -> Result<String> {
        Ok(self.query.clone())
    }

    fn quantity(&self) -> Quantity {
        self.quantity
    }

    fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }
}
