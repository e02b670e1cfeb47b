//! quarry-link: typed query composition and batched RPC execution for
//! document/graph databases.
//!
//! - [`writer`]: immutable query writers and the where-clause compiler
//! - [`Session`]: long-lived WebSocket session with automatic reconnection
//! - [`StatelessClient`]: one HTTP request per batch, no socket
//! - [`BatchExecutor`]: merges requests into one round trip and reconciles
//!   the per-statement results against each writer's quantity and schema

pub mod auth;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod event_handlers;
pub mod executor;
pub mod models;
pub mod schema;
pub mod session;
pub mod stateless;
pub mod timeouts;
pub mod writer;

// Re-export commonly used types
pub use auth::AuthProvider;
pub use connection::{Connection, ConnectionState};
pub use credentials::{Credentials, Registration};
pub use error::{ErrorKind, QuarryError, Result, StatementFailure, ValidationIssue};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers, SessionEvent};
pub use executor::{BatchExecutor, LogPrinter, QueryTransport};
pub use models::{
    BatchOptions, ConnectionDetails, Params, QueryOutcome, QueryRequest, SessionOptions,
    StatementResponse,
};
pub use schema::Schema;
pub use session::{Session, SessionBuilder};
pub use stateless::StatelessClient;
pub use timeouts::{Timeouts, TimeoutsBuilder};
pub use writer::{parse_queries, Quantity, QueryWriter};
