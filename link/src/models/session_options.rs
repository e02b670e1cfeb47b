use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;

/// Where the server lives and which namespace/database to select after
/// connecting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// HTTP(S) endpoint, e.g. `http://localhost:8000`. The socket URL is
    /// derived from it.
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ConnectionDetails {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: None,
            database: None,
        }
    }
}

/// Options for a long-lived [`Session`](crate::Session).
///
/// # Example
///
/// ```rust
/// use quarry_link::{Credentials, SessionOptions};
///
/// let options = SessionOptions::new("http://localhost:8000")
///     .with_namespace("test")
///     .with_database("test")
///     .with_credentials(Credentials::root("root", "root"))
///     .with_retry_count(-1)
///     .with_retry_delay_ms(500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOptions {
    pub connection: ConnectionDetails,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Start connecting as soon as the session is built.
    /// Default: true
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,

    /// Reconnect attempts after an unexpected close. Negative retries
    /// forever, 0 never retries.
    /// Default: 10
    #[serde(default = "default_retry_count")]
    pub retry_count: i32,

    /// Fixed delay before each reconnect attempt.
    /// Default: 2000ms
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Pass every combined query and its parameters to the log printer
    /// before sending.
    /// Default: false
    #[serde(default)]
    pub logging: bool,
}

fn default_auto_connect() -> bool {
    true
}

fn default_retry_count() -> i32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl SessionOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            connection: ConnectionDetails::new(endpoint),
            credentials: None,
            auto_connect: default_auto_connect(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            logging: false,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.connection.namespace = Some(namespace.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.connection.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    /// Negative for unlimited retries, 0 to disable reconnecting.
    pub fn with_retry_count(mut self, count: i32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    /// Whether another reconnect may be scheduled after `attempts` retries.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.retry_count < 0 || (self.retry_count > 0 && attempts < self.retry_count as u32)
    }
}
