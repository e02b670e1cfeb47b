use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Per-statement entry of a `query` RPC result.
///
/// ```json
/// {"status": "OK", "time": "1.2ms", "result": [{"id": "person:1"}]}
/// {"status": "ERR", "time": "0.3ms", "detail": "Table not found"}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(default)]
    pub result: JsonValue,

    /// Error description on failure. Some server versions put it in
    /// `result` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatementResponse {
    pub fn ok(result: JsonValue) -> Self {
        Self {
            status: "OK".to_string(),
            time: None,
            result,
            detail: None,
        }
    }

    pub fn err(detail: impl Into<String>) -> Self {
        Self {
            status: "ERR".to_string(),
            time: None,
            result: JsonValue::Null,
            detail: Some(detail.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// Human-readable reason for a failed statement.
    pub fn failure_message(&self) -> String {
        if let Some(detail) = &self.detail {
            return detail.clone();
        }
        match &self.result {
            JsonValue::String(text) => text.clone(),
            JsonValue::Null => format!("status {}", self.status),
            other => other.to_string(),
        }
    }
}
