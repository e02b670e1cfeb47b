use super::QueryRequest;

pub const BEGIN_TRANSACTION: &str = "BEGIN TRANSACTION";
pub const COMMIT_TRANSACTION: &str = "COMMIT TRANSACTION";

/// An ordered set of statements sent in one round trip, optionally wrapped
/// in transaction markers.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub queries: Vec<QueryRequest>,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl BatchOptions {
    pub fn new(queries: Vec<QueryRequest>) -> Self {
        Self {
            queries,
            prefix: None,
            suffix: None,
        }
    }

    /// Wrap the statements in `BEGIN TRANSACTION` / `COMMIT TRANSACTION`.
    pub fn transaction(queries: Vec<QueryRequest>) -> Self {
        Self::wrapped(queries, BEGIN_TRANSACTION, COMMIT_TRANSACTION)
    }

    /// Wrap the statements in custom leading and trailing statements.
    pub fn wrapped(
        queries: Vec<QueryRequest>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            queries,
            prefix: Some(prefix.into()),
            suffix: Some(suffix.into()),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn is_transaction(&self) -> bool {
        self.prefix.is_some()
    }

    /// Number of server result entries the combined payload produces.
    pub(crate) fn expected_responses(&self) -> usize {
        self.queries.len() + usize::from(self.prefix.is_some()) + usize::from(self.suffix.is_some())
    }
}
