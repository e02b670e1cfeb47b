//! Batch execution and result reconciliation.
//!
//! [`BatchExecutor`] merges an ordered list of [`QueryRequest`]s into one
//! multi-statement payload, sends it through a [`QueryTransport`] in a single
//! round trip and walks the per-statement results in lock-step with the
//! requests: first every status is checked, then each result is transformed,
//! validated and coerced to the writer's declared [`Quantity`].

use crate::error::{QuarryError, Result, StatementFailure};
use crate::models::{BatchOptions, Params, QueryOutcome, QueryRequest, StatementResponse};
use crate::writer::Quantity;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Separator placed between statements of a combined payload.
const STATEMENT_SEPARATOR: &str = ";\n";

/// Something that can run a combined query text with its parameters and
/// return the raw per-statement result array.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Whether a call may be issued right now.
    fn is_ready(&self) -> bool {
        true
    }

    async fn send_query(&self, query: &str, params: &Params) -> Result<JsonValue>;
}

/// Observability hook receiving the final query text and parameters before
/// every send.
pub type LogPrinter = Arc<dyn Fn(&str, &Params) + Send + Sync>;

/// Printer used when logging is enabled without a custom printer.
pub fn default_log_printer() -> LogPrinter {
    Arc::new(|query: &str, params: &Params| {
        info!(
            "[QUARRY_QUERY] {}\n[QUARRY_QUERY] params: {}",
            query,
            JsonValue::Object(params.clone())
        );
    })
}

/// Turns batches of query requests into single round trips.
#[derive(Clone)]
pub struct BatchExecutor {
    transport: Arc<dyn QueryTransport>,
    log_printer: Option<LogPrinter>,
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("logging", &self.log_printer.is_some())
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self {
            transport,
            log_printer: None,
        }
    }

    /// Invoke `printer` with every combined payload before it is sent.
    pub fn with_log_printer(mut self, printer: LogPrinter) -> Self {
        self.log_printer = Some(printer);
        self
    }

    /// Run a single statement.
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryOutcome> {
        let mut results = self.run(BatchOptions::new(vec![request])).await?;
        results.pop().ok_or_else(|| {
            QuarryError::InvalidResponse("The response from the database was invalid".to_string())
        })
    }

    /// Run several statements in one round trip.
    pub async fn batch(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.run(BatchOptions::new(requests)).await
    }

    /// Run several statements atomically in one round trip.
    pub async fn transaction(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.run(BatchOptions::transaction(requests)).await
    }

    pub async fn run(&self, options: BatchOptions) -> Result<Vec<QueryOutcome>> {
        if options.queries.is_empty() {
            return Ok(Vec::new());
        }

        if !self.transport.is_ready() {
            return Err(QuarryError::NoConnection(
                "There is no active connection to the database".to_string(),
            ));
        }

        let params = merge_params(&options.queries)?;
        let query = build_query(&options)?;

        if let Some(printer) = &self.log_printer {
            printer(&query, &params);
        }

        debug!(
            "[QUARRY_QUERY] Sending batch: statements={} transaction={} params={}",
            options.queries.len(),
            options.is_transaction(),
            params.len()
        );
        let started = Instant::now();

        let response = self.transport.send_query(&query, &params).await?;
        let responses = split_responses(response, &options)?;
        let results = reconcile(&options.queries, responses)?;

        debug!(
            "[QUARRY_QUERY] Batch complete: statements={} total_ms={}",
            results.len(),
            started.elapsed().as_millis()
        );
        Ok(results)
    }
}

/// Merge every request's parameters. Names must be unique across the batch.
fn merge_params(requests: &[QueryRequest]) -> Result<Params> {
    let mut merged = Params::new();
    for request in requests {
        for (name, value) in &request.params {
            if merged.contains_key(name) {
                return Err(QuarryError::InvalidQuery(format!(
                    "The parameter \"{}\" was defined multiple times",
                    name
                )));
            }
            merged.insert(name.clone(), value.clone());
        }
    }
    Ok(merged)
}

fn build_query(options: &BatchOptions) -> Result<String> {
    let mut statements = Vec::with_capacity(options.expected_responses());

    if let Some(prefix) = options.prefix() {
        statements.push(prefix.to_string());
    }

    for (index, request) in options.queries.iter().enumerate() {
        if request.schema.is_some() && request.query.schema().is_some() {
            return Err(QuarryError::InvalidRequest(format!(
                "Query {} defines a schema on both the writer and the request",
                index + 1
            )));
        }
        statements.push(request.query.to_query()?);
    }

    if let Some(suffix) = options.suffix() {
        statements.push(suffix.to_string());
    }

    Ok(statements.join(STATEMENT_SEPARATOR))
}

/// Check the envelope shape, drop the marker entries and surface every
/// failed statement at once.
fn split_responses(response: JsonValue, options: &BatchOptions) -> Result<Vec<StatementResponse>> {
    let invalid =
        || QuarryError::InvalidResponse("The response from the database was invalid".to_string());

    let entries = match response {
        JsonValue::Array(entries) if entries.len() == options.expected_responses() => entries,
        JsonValue::Array(entries) => {
            warn!(
                "[QUARRY_QUERY] Expected {} statement results, got {}",
                options.expected_responses(),
                entries.len()
            );
            return Err(invalid());
        },
        _ => return Err(invalid()),
    };

    let mut responses = entries
        .into_iter()
        .map(serde_json::from_value::<StatementResponse>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let suffix = options
        .suffix()
        .and_then(|label| responses.pop().map(|r| (label, r)));
    let prefix = if options.prefix().is_some() {
        Some(responses.remove(0))
    } else {
        None
    };

    let mut failures: Vec<StatementFailure> = responses
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_ok())
        .map(|(i, r)| StatementFailure {
            index: i + 1,
            message: r.failure_message(),
        })
        .collect();

    // Marker statements only matter when no real statement explains the
    // failure.
    if failures.is_empty() {
        if let (Some(label), Some(r)) = (options.prefix(), prefix.as_ref()) {
            if !r.is_ok() {
                failures.push(StatementFailure {
                    index: 0,
                    message: format!("{}: {}", label, r.failure_message()),
                });
            }
        }
        if let Some((label, r)) = &suffix {
            if !r.is_ok() {
                failures.push(StatementFailure {
                    index: responses.len() + 1,
                    message: format!("{}: {}", label, r.failure_message()),
                });
            }
        }
    }

    if !failures.is_empty() {
        return Err(QuarryError::QueryFailure(failures));
    }

    Ok(responses)
}

fn reconcile(
    requests: &[QueryRequest],
    responses: Vec<StatementResponse>,
) -> Result<Vec<QueryOutcome>> {
    requests
        .iter()
        .zip(responses)
        .enumerate()
        .map(|(index, (request, response))| reconcile_one(index + 1, request, response))
        .collect()
}

fn reconcile_one(
    ordinal: usize,
    request: &QueryRequest,
    response: StatementResponse,
) -> Result<QueryOutcome> {
    let writer = &request.query;
    let quantity = writer.quantity();

    if quantity == Quantity::Zero {
        return Ok(QueryOutcome::Absent);
    }

    let rows = match writer.transform(response.result) {
        JsonValue::Array(rows) => rows,
        single => vec![single],
    };

    let rows = if request.validate == Some(false) {
        rows
    } else {
        let schema = writer
            .schema()
            .or(request.schema.as_ref())
            .ok_or_else(|| {
                QuarryError::InvalidRequest(format!("No schema provided for query {}", ordinal))
            })?;

        schema
            .validate_array(rows)
            .map_err(|issues| QuarryError::ParseFailure {
                statement: ordinal,
                issues,
            })?
    };

    match quantity {
        Quantity::Zero => Ok(QueryOutcome::Absent),
        Quantity::Many => Ok(QueryOutcome::Many(rows)),
        Quantity::One | Quantity::Maybe if rows.len() > 1 => Err(QuarryError::TooManyResults(
            format!(
                "Query {} expected at most one result but got {}",
                ordinal,
                rows.len()
            ),
        )),
        Quantity::One => match rows.into_iter().next() {
            Some(row) => Ok(QueryOutcome::Single(Some(row))),
            None => match writer.fallback() {
                Some(fallback) => Ok(QueryOutcome::Single(Some(fallback))),
                None => Err(QuarryError::InvalidResponse(format!(
                    "Query {} expected at least one result but got 0",
                    ordinal
                ))),
            },
        },
        Quantity::Maybe => Ok(QueryOutcome::Single(rows.into_iter().next())),
    }
}
