//! Data models for quarry-link.
//!
//! Defines the request and result structures that cross the batch executor
//! boundary, plus the session configuration.

pub mod batch_options;
pub mod query_outcome;
pub mod query_request;
pub mod session_options;
pub mod statement_response;

#[cfg(test)]
mod tests;

pub use batch_options::{BatchOptions, BEGIN_TRANSACTION, COMMIT_TRANSACTION};
pub use query_outcome::QueryOutcome;
pub use query_request::{Params, QueryRequest};
pub use session_options::{ConnectionDetails, SessionOptions};
pub use statement_response::StatementResponse;
