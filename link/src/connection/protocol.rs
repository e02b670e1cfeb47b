//! JSON-RPC envelopes exchanged over the session socket, plus URL and
//! correlation-id helpers.

use crate::error::{QuarryError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Length of generated correlation ids.
pub(crate) const ID_LENGTH: usize = 7;

/// Out-of-band push frames carry this method and no caller to resolve.
pub(crate) const NOTIFY_METHOD: &str = "notify";

/// Outbound call: `{ "id": "...", "method": "...", "params": [...] }`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    pub params: Vec<JsonValue>,
}

impl RpcRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Vec<JsonValue>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Inbound frame: a reply `{ id, result | error }` or a `notify` push.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub result: Option<JsonValue>,

    /// Either `{ "code": .., "message": ".." }` or a bare string.
    #[serde(default)]
    pub error: Option<JsonValue>,
}

impl RpcResponse {
    pub fn is_notify(&self) -> bool {
        self.method.as_deref() == Some(NOTIFY_METHOD)
    }

    /// Turn the reply into the call's outcome. Server-side rejections become
    /// [`QuarryError::ServerError`].
    pub fn into_result(self) -> Result<JsonValue> {
        match self.error {
            Some(error) => Err(QuarryError::ServerError(error_message(&error))),
            None => Ok(self.result.unwrap_or(JsonValue::Null)),
        }
    }
}

fn error_message(error: &JsonValue) -> String {
    match error {
        JsonValue::String(message) => message.clone(),
        JsonValue::Object(map) => match map.get("message") {
            Some(JsonValue::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

/// Parse an endpoint and resolve `path` relative to it, the way a browser
/// resolves a relative link. Query and fragment never survive the join.
///
/// `http://db.example.com/v1` joined with `sql` is `http://db.example.com/sql`;
/// `http://db.example.com/v1/` joined with `sql` is `http://db.example.com/v1/sql`.
pub(crate) fn endpoint_url(endpoint: &str, path: &str) -> Result<Url> {
    let base = Url::parse(endpoint.trim()).map_err(|e| {
        QuarryError::ConfigurationError(format!("Invalid endpoint URL '{}': {}", endpoint, e))
    })?;

    match base.scheme() {
        "http" | "https" | "ws" | "wss" => {},
        other => {
            return Err(QuarryError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    }

    base.join(path).map_err(|e| {
        QuarryError::ConfigurationError(format!(
            "Cannot resolve '{}' against endpoint '{}': {}",
            path, endpoint, e
        ))
    })
}

/// Derive the socket URL from an HTTP(S) endpoint: `rpc` resolved relative
/// to the endpoint, with `http` swapped for `ws` and `https` for `wss`.
///
/// `http://localhost:8000` becomes `ws://localhost:8000/rpc`;
/// `https://db.example.com/v1/` becomes `wss://db.example.com/v1/rpc`.
pub fn resolve_rpc_url(endpoint: &str) -> Result<String> {
    let mut url = endpoint_url(endpoint, "rpc")?;
    let socket_scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };

    url.set_scheme(socket_scheme).map_err(|_| {
        QuarryError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    Ok(url.into())
}

/// Fresh random correlation id.
pub fn next_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_rpc_url() {
        assert_eq!(resolve_rpc_url("http://localhost:8000").unwrap(), "ws://localhost:8000/rpc");
        assert_eq!(resolve_rpc_url("http://localhost:8000/").unwrap(), "ws://localhost:8000/rpc");
        assert_eq!(
            resolve_rpc_url("https://db.example.com/v1/").unwrap(),
            "wss://db.example.com/v1/rpc"
        );
        assert_eq!(
            resolve_rpc_url("https://db.example.com/v1/sql?x=1").unwrap(),
            "wss://db.example.com/v1/rpc"
        );
        assert_eq!(resolve_rpc_url("ws://127.0.0.1:9").unwrap(), "ws://127.0.0.1:9/rpc");
        assert_eq!(
            resolve_rpc_url("https://db.example.com/v1").unwrap(),
            "wss://db.example.com/rpc"
        );
    }

    #[test]
    fn test_endpoint_url_resolves_like_a_relative_link() {
        let join = |endpoint: &str, path: &str| endpoint_url(endpoint, path).unwrap().to_string();

        assert_eq!(join("http://db.example.com/v1", "sql"), "http://db.example.com/sql");
        assert_eq!(join("http://db.example.com/v1/", "sql"), "http://db.example.com/v1/sql");
        assert_eq!(join("http://db.example.com/v1/#frag", "rpc"), "http://db.example.com/v1/rpc");

        let err = endpoint_url("mailto:someone@example.com", "rpc").unwrap_err();
        assert_eq!(err.kind().as_str(), "configuration");
    }

    #[test]
    fn test_resolve_rpc_url_rejects_bad_endpoints() {
        assert!(resolve_rpc_url("localhost:8000").is_err());
        assert!(resolve_rpc_url("ftp://localhost").is_err());
        assert!(resolve_rpc_url("http://").is_err());
    }

    #[test]
    fn test_next_id_shape() {
        let id = next_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(next_id(), next_id());
    }

    #[test]
    fn test_request_serialization() {
        let request = RpcRequest::new("abc1234", "use", vec![json!("ns"), json!("db")]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": "abc1234", "method": "use", "params": ["ns", "db"]})
        );
    }

    #[test]
    fn test_response_outcomes() {
        let ok: RpcResponse = serde_json::from_value(json!({"id": "a", "result": [1]})).unwrap();
        assert_eq!(ok.into_result().unwrap(), json!([1]));

        let err: RpcResponse = serde_json::from_value(
            json!({"id": "a", "error": {"code": -32000, "message": "There was a problem"}}),
        )
        .unwrap();
        let err = err.into_result().unwrap_err();
        assert_eq!(err.kind().as_str(), "server_error");
        assert!(err.to_string().contains("There was a problem"));

        let notify: RpcResponse =
            serde_json::from_value(json!({"method": "notify", "params": []})).unwrap();
        assert!(notify.is_notify());
        assert!(notify.id.is_none());
    }
}
