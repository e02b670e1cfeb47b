//! RPC connection tests against the in-process mock server.

mod common;

use common::*;
use quarry_link::{
    Connection, ConnectionDetails, ConnectionState, Credentials, EventHandlers, Params,
    Registration, Timeouts,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn details(endpoint: &str) -> ConnectionDetails {
    ConnectionDetails {
        endpoint: endpoint.to_string(),
        namespace: Some("test".to_string()),
        database: Some("app".to_string()),
    }
}

fn quick_timeouts() -> Timeouts {
    Timeouts::builder()
        .connection_timeout(Duration::from_secs(2))
        .request_timeout(Duration::from_millis(200))
        .keepalive_interval(Duration::ZERO)
        .build()
}

#[tokio::test]
async fn test_handshake_signs_in_then_selects_database() {
    init_logging();
    let server = MockServer::serving(answering(json!([]))).await;

    let connection = Connection::open(
        &details(&server.endpoint),
        Some(&Credentials::root("root", "secret")),
        &quick_timeouts(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    assert_eq!(connection.state(), ConnectionState::Open);

    let calls = server.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].method, "signin");
    assert_eq!(calls[0].params, vec![json!({"user": "root", "pass": "secret"})]);
    assert_eq!(calls[1].method, "use");
    assert_eq!(calls[1].params, vec![json!("test"), json!("app")]);
    assert_eq!(calls[0].id.len(), 7);
    assert_ne!(calls[0].id, calls[1].id);
}

#[tokio::test]
async fn test_token_credentials_use_authenticate() {
    let server = MockServer::serving(answering(json!([]))).await;

    let connection = Connection::open(
        &ConnectionDetails::new(server.endpoint.clone()),
        Some(&Credentials::token("jwt-token")),
        &quick_timeouts(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    assert!(connection.is_open());
    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "authenticate");
    assert_eq!(calls[0].params, vec![json!("jwt-token")]);
}

#[tokio::test]
async fn test_rejected_sign_in_is_auth_failure() {
    let server = MockServer::serving(Arc::new(|call: &RpcCall| match call.method.as_str() {
        "signin" => vec![error_frame(&call.id, "There was a problem with authentication")],
        _ => vec![result_frame(&call.id, Value::Null)],
    }))
    .await;

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = EventHandlers::new().on_error(move |error| sink.lock().unwrap().push(error));

    let err = Connection::open(
        &details(&server.endpoint),
        Some(&Credentials::root("root", "wrong")),
        &quick_timeouts(),
        handlers,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind().as_str(), "auth_failure");
    assert_eq!(
        err.to_string(),
        "Authentication failed: There was a problem with authentication"
    );
    assert!(server.calls_for("use").is_empty());

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].recoverable);
}

#[tokio::test]
async fn test_query_round_trip_ignores_notify_and_unknown_ids() {
    let server = MockServer::serving(responder(|call| {
        vec![
            json!({"method": "notify", "params": [{"action": "CREATE"}]}).to_string(),
            result_frame("zzzzzzz", json!("stray")),
            result_frame(&call.id, json!([{"status": "OK", "result": [{"id": "person:1"}]}])),
        ]
    }))
    .await;

    let connection = Connection::open(
        &details(&server.endpoint),
        None,
        &quick_timeouts(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    let mut params = Params::new();
    params.insert("name".to_string(), json!("tobie"));
    let reply = connection
        .query("SELECT * FROM person WHERE name = $name", &params)
        .await
        .unwrap();

    assert_eq!(reply, json!([{"status": "OK", "result": [{"id": "person:1"}]}]));

    let query = &server.calls_for("query")[0];
    assert_eq!(
        query.params,
        vec![json!("SELECT * FROM person WHERE name = $name"), json!({"name": "tobie"})]
    );
    assert!(connection.is_open());
}

#[tokio::test]
async fn test_unanswered_call_times_out_without_closing() {
    let server = MockServer::serving(responder(|call| {
        if call.params[0] == json!("SLOW") {
            Vec::new()
        } else {
            vec![result_frame(&call.id, json!([]))]
        }
    }))
    .await;

    let connection = Connection::open(
        &details(&server.endpoint),
        None,
        &quick_timeouts(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    let started = std::time::Instant::now();
    let err = connection.query("SLOW", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "timeout");
    assert!(started.elapsed() >= Duration::from_millis(200));

    assert!(connection.is_open());
    assert_eq!(connection.query("FAST", &Params::new()).await.unwrap(), json!([]));
}

#[tokio::test]
async fn test_client_close_is_marked_by_client() {
    let server = MockServer::serving(answering(json!([]))).await;

    let disconnects = Arc::new(Mutex::new(Vec::new()));
    let sink = disconnects.clone();
    let handlers =
        EventHandlers::new().on_disconnect(move |reason| sink.lock().unwrap().push(reason));

    let connection = Connection::open(
        &details(&server.endpoint),
        None,
        &quick_timeouts(),
        handlers,
    )
    .await
    .unwrap();

    connection.close().await;
    let reason = connection.closed().await;
    assert!(reason.by_client);
    assert_eq!(reason.code, Some(1000));
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    let err = connection.query("INFO FOR DB", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "no_connection");
    assert_eq!(disconnects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_drop_fails_pending_calls() {
    let server = MockServer::serving(responder(|_| vec![DROP.to_string()])).await;

    let connection = Connection::open(
        &ConnectionDetails::new(server.endpoint.clone()),
        None,
        &Timeouts::builder().request_timeout_secs(30).keepalive_interval(Duration::ZERO).build(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    let started = std::time::Instant::now();
    let err = connection.query("SELECT * FROM t", &Params::new()).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "no_connection");
    assert!(started.elapsed() < Duration::from_secs(5));

    let reason = connection.closed().await;
    assert!(!reason.by_client);
    assert_eq!(reason.code, Some(1006));
}

#[tokio::test]
async fn test_keepalive_pings_are_sent() {
    let server = MockServer::serving(answering(json!([]))).await;

    let _connection = Connection::open(
        &ConnectionDetails::new(server.endpoint.clone()),
        None,
        &Timeouts::builder()
            .request_timeout(Duration::from_millis(500))
            .keepalive_interval(Duration::from_millis(30))
            .build(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    assert!(wait_until(Duration::from_secs(2), || server.calls_for("ping").len() >= 2).await);
    assert!(server.calls_for("ping").iter().all(|call| call.params.is_empty()));
}

#[tokio::test]
async fn test_sign_up_and_sign_out() {
    let server = MockServer::serving(Arc::new(|call: &RpcCall| match call.method.as_str() {
        "signup" => vec![result_frame(&call.id, json!("new-token"))],
        "invalidate" => vec![error_frame(&call.id, "not signed in")],
        _ => vec![result_frame(&call.id, Value::Null)],
    }))
    .await;

    let connection = Connection::open(
        &details(&server.endpoint),
        None,
        &quick_timeouts(),
        EventHandlers::new(),
    )
    .await
    .unwrap();

    let registration = Registration::new("test", "app", "user")
        .with_field("email", "info@example.com")
        .with_field("pass", "123456");
    let token = connection.sign_up(&registration).await.unwrap();
    assert_eq!(token.as_deref(), Some("new-token"));
    assert_eq!(
        server.calls_for("signup")[0].params,
        vec![json!({
            "NS": "test",
            "DB": "app",
            "SC": "user",
            "email": "info@example.com",
            "pass": "123456"
        })]
    );

    let err = connection.sign_out().await.unwrap_err();
    assert_eq!(err.kind().as_str(), "auth_failure");
    assert_eq!(err.to_string(), "Sign out failed: not signed in");
}

#[tokio::test]
async fn test_unreachable_endpoint_reports_connection_error() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let handlers = EventHandlers::new().on_error(move |error| sink.lock().unwrap().push(error));

    let server = MockServer::start(vec![Behaviour::Reject]).await;
    let err = Connection::open(
        &ConnectionDetails::new(server.endpoint.clone()),
        None,
        &quick_timeouts(),
        handlers,
    )
    .await
    .unwrap_err();

    assert!(err.is_connection_error());
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].recoverable);
}
