//! Stateless HTTP transport.
//!
//! Every call is an independent `POST` to `sql`, resolved against the
//! endpoint, carrying the combined query text as the body. Authentication
//! travels in each request, so there is no sign-in state to manage.

use crate::{
    auth::AuthProvider,
    connection::protocol::endpoint_url,
    credentials::Credentials,
    error::{QuarryError, Result},
    executor::{default_log_printer, BatchExecutor, LogPrinter, QueryTransport},
    models::{Params, QueryOutcome, QueryRequest, SessionOptions},
    timeouts::Timeouts,
};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;

const USER_AGENT: &str = concat!("quarry-link/", env!("CARGO_PKG_VERSION"));

struct HttpTransport {
    http_client: reqwest::Client,
    url: String,
    auth: Option<AuthProvider>,
    namespace: Option<String>,
    database: Option<String>,
    scope: Option<String>,
}

impl HttpTransport {
    fn build_request(&self, query: &str, params: &Params) -> Result<reqwest::RequestBuilder> {
        let auth = self.auth.as_ref().ok_or_else(|| {
            QuarryError::InvalidRequest("Missing username & password or token".to_string())
        })?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(query.to_string());
        request = auth.apply_to_request(request);

        if let Some(namespace) = &self.namespace {
            request = request.header("NS", namespace);
        }
        if let Some(database) = &self.database {
            request = request.header("DB", database);
        }
        if let Some(scope) = &self.scope {
            request = request.header("SC", scope);
        }

        if !params.is_empty() {
            let pairs: Vec<(String, String)> = params
                .iter()
                .map(|(name, value)| (name.clone(), query_param_value(value)))
                .collect();
            request = request.query(&pairs);
        }

        Ok(request)
    }
}

/// Strings travel as-is; everything else as its JSON text.
fn query_param_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn send_query(&self, query: &str, params: &Params) -> Result<JsonValue> {
        let request = self.build_request(query, params)?;

        debug!("[QUARRY_HTTP] Sending POST to {}", self.url);
        let started = Instant::now();

        let response = request.send().await?;
        let status = response.status();
        debug!(
            "[QUARRY_HTTP] Response received: status={} duration_ms={}",
            status,
            started.elapsed().as_millis()
        );

        if status.is_success() {
            return Ok(response.json::<JsonValue>().await?);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<JsonValue>(&body)
            .ok()
            .and_then(|json| {
                json.get("information")
                    .or_else(|| json.get("details"))
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
            })
            .unwrap_or(body);

        warn!(
            "[QUARRY_HTTP] Server error: status={} message=\"{}\"",
            status, message
        );
        Err(QuarryError::ServerError(format!("HTTP {}: {}", status.as_u16(), message)))
    }
}

/// Query client without a persistent socket.
///
/// Shares the batch pipeline with [`Session`](crate::Session), so results are
/// reconciled the same way; only the transport differs.
///
/// # Examples
///
/// ```rust,no_run
/// use quarry_link::writer::count;
/// use quarry_link::{Credentials, QueryRequest, SessionOptions, StatelessClient};
///
/// # async fn example() -> quarry_link::Result<()> {
/// let client = StatelessClient::new(
///     SessionOptions::new("http://localhost:8000")
///         .with_namespace("test")
///         .with_database("test")
///         .with_credentials(Credentials::root("root", "root")),
/// )?;
/// let people: u64 = client.execute_as(QueryRequest::new(count("person"))).await?;
/// # Ok(())
/// # }
/// ```
pub struct StatelessClient {
    transport: Arc<HttpTransport>,
    executor: BatchExecutor,
}

impl std::fmt::Debug for StatelessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatelessClient")
            .field("url", &self.transport.url)
            .field("namespace", &self.transport.namespace)
            .field("database", &self.transport.database)
            .finish_non_exhaustive()
    }
}

impl StatelessClient {
    pub fn new(options: SessionOptions) -> Result<Self> {
        Self::with_timeouts(options, Timeouts::default(), None)
    }

    /// Build with explicit timeouts and an optional log printer (used when
    /// `options.logging` is set).
    pub fn with_timeouts(
        options: SessionOptions,
        timeouts: Timeouts,
        log_printer: Option<LogPrinter>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if !Timeouts::is_no_timeout(timeouts.connection_timeout) {
            builder = builder.connect_timeout(timeouts.connection_timeout);
        }
        if !Timeouts::is_no_timeout(timeouts.request_timeout) {
            builder = builder.timeout(timeouts.request_timeout);
        }
        let http_client = builder.build()?;

        let credentials = options.credentials.as_ref();
        let auth = credentials.map(AuthProvider::from_credentials).transpose()?;

        let transport = Arc::new(HttpTransport {
            http_client,
            url: sql_url(&options.connection.endpoint)?,
            auth,
            namespace: options
                .connection
                .namespace
                .clone()
                .or_else(|| credentials.and_then(Credentials::namespace_name).map(str::to_string)),
            database: options
                .connection
                .database
                .clone()
                .or_else(|| credentials.and_then(Credentials::database_name).map(str::to_string)),
            scope: credentials.and_then(Credentials::scope_name).map(str::to_string),
        });

        let mut executor = BatchExecutor::new(transport.clone());
        if options.logging {
            executor = executor.with_log_printer(log_printer.unwrap_or_else(default_log_printer));
        }

        Ok(Self {
            transport,
            executor,
        })
    }

    pub async fn execute(&self, request: QueryRequest) -> Result<QueryOutcome> {
        self.executor.execute(request).await
    }

    pub async fn execute_as<T: DeserializeOwned>(&self, request: QueryRequest) -> Result<T> {
        self.execute(request).await?.deserialize()
    }

    pub async fn batch(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.executor.batch(requests).await
    }

    pub async fn transaction(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.executor.transaction(requests).await
    }

    pub async fn sign_in(&self, _credentials: Credentials) -> Result<Option<String>> {
        Err(unsupported("sign in"))
    }

    pub async fn sign_up(
        &self,
        _registration: &crate::credentials::Registration,
    ) -> Result<Option<String>> {
        Err(unsupported("sign up"))
    }

    pub async fn sign_out(&self) -> Result<()> {
        Err(unsupported("sign out"))
    }
}

fn unsupported(operation: &str) -> QuarryError {
    QuarryError::InvalidRequest(format!(
        "Cannot {} with a stateless client; pass credentials in the options instead",
        operation
    ))
}

/// `sql` resolved against the endpoint, on the same path prefix the socket
/// uses for `rpc`.
fn sql_url(endpoint: &str) -> Result<String> {
    let url = endpoint_url(endpoint, "sql")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(QuarryError::ConfigurationError(format!(
            "Stateless endpoint must be http(s): {}",
            endpoint
        )));
    }
    Ok(url.into())
}
