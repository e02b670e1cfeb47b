use serde_json::json;

use super::*;
use crate::credentials::Credentials;
use crate::schema::Schema;
use crate::writer::{count, query, QueryWriter};

// ==================== SessionOptions Tests ====================

#[test]
fn test_session_options_default() {
    let opts = SessionOptions::new("http://localhost:8000");

    assert!(opts.auto_connect, "auto_connect should default to true");
    assert_eq!(opts.retry_count, 10, "retry_count should default to 10");
    assert_eq!(opts.retry_delay_ms, 2000, "retry_delay_ms should default to 2000");
    assert!(!opts.logging, "logging should default to false");
    assert!(opts.credentials.is_none());
}

#[test]
fn test_session_options_builder_pattern() {
    let opts = SessionOptions::new("http://db:8000")
        .with_namespace("ns")
        .with_database("db")
        .with_credentials(Credentials::root("root", "root"))
        .with_auto_connect(false)
        .with_retry_count(3)
        .with_retry_delay_ms(10)
        .with_logging(true);

    assert_eq!(opts.connection.namespace.as_deref(), Some("ns"));
    assert_eq!(opts.connection.database.as_deref(), Some("db"));
    assert!(!opts.auto_connect);
    assert_eq!(opts.retry_count, 3);
    assert_eq!(opts.retry_delay_ms, 10);
    assert!(opts.logging);
}

#[test]
fn test_session_options_deserialize_fills_defaults() {
    let opts: SessionOptions =
        serde_json::from_value(json!({"connection": {"endpoint": "http://localhost:8000"}}))
            .unwrap();

    assert_eq!(opts, SessionOptions::new("http://localhost:8000"));
}

#[test]
fn test_retry_policy() {
    let bounded = SessionOptions::new("x").with_retry_count(3);
    assert!(bounded.should_retry(0));
    assert!(bounded.should_retry(2));
    assert!(!bounded.should_retry(3));

    let never = SessionOptions::new("x").with_retry_count(0);
    assert!(!never.should_retry(0));

    let unlimited = SessionOptions::new("x").with_retry_count(-1);
    assert!(unlimited.should_retry(10_000));
}

// ==================== StatementResponse Tests ====================

#[test]
fn test_statement_response_parse() {
    let ok: StatementResponse =
        serde_json::from_value(json!({"status": "OK", "time": "1ms", "result": [{"a": 1}]}))
            .unwrap();
    assert!(ok.is_ok());
    assert_eq!(ok.result, json!([{"a": 1}]));

    let err: StatementResponse =
        serde_json::from_value(json!({"status": "ERR", "detail": "Table not found"})).unwrap();
    assert!(!err.is_ok());
    assert_eq!(err.failure_message(), "Table not found");

    let legacy: StatementResponse =
        serde_json::from_value(json!({"status": "ERR", "result": "Parse error"})).unwrap();
    assert_eq!(legacy.failure_message(), "Parse error");
}

// ==================== QueryRequest / BatchOptions Tests ====================

#[test]
fn test_query_request_builders() {
    let request = QueryRequest::new(query("SELECT * FROM a WHERE b = $b"))
        .with_schema(Schema::any())
        .with_param("b", 1)
        .without_validation();

    assert_eq!(request.params.get("b"), Some(&json!(1)));
    assert_eq!(request.validate, Some(false));
    assert_eq!(request.schema, Some(Schema::Any));
    assert_eq!(request.query.to_query().unwrap(), "SELECT * FROM a WHERE b = $b");
}

#[test]
fn test_batch_options_markers() {
    let plain = BatchOptions::new(vec![QueryRequest::new(count("a"))]);
    assert!(!plain.is_transaction());
    assert_eq!(plain.expected_responses(), 1);

    let tx = BatchOptions::transaction(vec![QueryRequest::new(count("a"))]);
    assert_eq!(tx.prefix(), Some(BEGIN_TRANSACTION));
    assert_eq!(tx.suffix(), Some(COMMIT_TRANSACTION));
    assert_eq!(tx.expected_responses(), 3);
}

// ==================== QueryOutcome Tests ====================

#[test]
fn test_query_outcome_deserialize() {
    let one = QueryOutcome::Single(Some(json!(3)));
    assert_eq!(one.deserialize::<i64>().unwrap(), 3);

    let maybe = QueryOutcome::Single(None);
    assert!(maybe.is_absent());
    assert_eq!(maybe.deserialize::<Option<i64>>().unwrap(), None);

    let many = QueryOutcome::Many(vec![json!({"a": 1}), json!({"a": 2})]);
    assert_eq!(many.as_many().map(|r| r.len()), Some(2));
    assert_eq!(many.into_value(), json!([{"a": 1}, {"a": 2}]));

    assert_eq!(QueryOutcome::Absent.into_value(), json!(null));
}
