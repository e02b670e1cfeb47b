#![allow(dead_code)]
//! In-process JSON-RPC WebSocket server for integration tests.
//!
//! Each accepted TCP connection is handled by the next [`Behaviour`] in the
//! script (the last one repeats). A serving connection answers every call
//! with the frames its responder returns; returning [`DROP`] among them cuts
//! the TCP stream without a close frame.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Sentinel frame: drop the connection abruptly instead of sending.
pub const DROP: &str = "__drop__";

#[derive(Debug, Clone)]
pub struct RpcCall {
    pub connection: usize,
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

pub type Responder = Arc<dyn Fn(&RpcCall) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
pub enum Behaviour {
    /// Complete the WebSocket upgrade and answer calls.
    Serve(Responder),
    /// Close the TCP stream before the upgrade.
    Reject,
}

#[derive(Default)]
struct ServerLog {
    accepted: Vec<Instant>,
    calls: Vec<RpcCall>,
}

pub struct MockServer {
    pub endpoint: String,
    log: Arc<Mutex<ServerLog>>,
    _task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(script: Vec<Behaviour>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let log = Arc::new(Mutex::new(ServerLog::default()));
        let task = tokio::spawn(accept_loop(listener, script, log.clone()));

        Self {
            endpoint: format!("http://{}", addr),
            log,
            _task: task,
        }
    }

    /// Serve every connection with `responder`.
    pub async fn serving(responder: Responder) -> Self {
        Self::start(vec![Behaviour::Serve(responder)]).await
    }

    /// Accept times of every TCP connection, in order.
    pub fn accepted(&self) -> Vec<Instant> {
        self.log.lock().unwrap().accepted.clone()
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, method: &str) -> Vec<RpcCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }
}

async fn accept_loop(listener: TcpListener, script: Vec<Behaviour>, log: Arc<Mutex<ServerLog>>) {
    let mut index = 0;
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        log.lock().unwrap().accepted.push(Instant::now());

        let behaviour = script
            .get(index)
            .or(script.last())
            .cloned()
            .unwrap_or(Behaviour::Reject);
        let connection = index;
        index += 1;

        let log = log.clone();
        tokio::spawn(async move {
            match behaviour {
                Behaviour::Reject => drop(stream),
                Behaviour::Serve(responder) => serve(stream, connection, responder, log).await,
            }
        });
    }
}

async fn serve(
    stream: TcpStream,
    connection: usize,
    responder: Responder,
    log: Arc<Mutex<ServerLog>>,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(message)) = ws.next().await {
        let text = match message {
            Message::Text(text) => text.as_str().to_string(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let call = RpcCall {
            connection,
            id: request["id"].as_str().unwrap_or_default().to_string(),
            method: request["method"].as_str().unwrap_or_default().to_string(),
            params: request["params"].as_array().cloned().unwrap_or_default(),
        };
        log.lock().unwrap().calls.push(call.clone());

        for frame in responder(&call) {
            if frame == DROP {
                return;
            }
            if ws.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
    }
}

pub fn result_frame(id: &str, result: Value) -> String {
    json!({"id": id, "result": result}).to_string()
}

pub fn error_frame(id: &str, message: &str) -> String {
    json!({"id": id, "error": {"code": -32000, "message": message}}).to_string()
}

pub fn ok_statement(result: Value) -> Value {
    json!({"status": "OK", "time": "10µs", "result": result})
}

pub fn err_statement(detail: &str) -> Value {
    json!({"status": "ERR", "time": "10µs", "detail": detail})
}

/// Answers the handshake and housekeeping methods, and hands `query` calls
/// to `on_query`.
pub fn responder<F>(on_query: F) -> Responder
where
    F: Fn(&RpcCall) -> Vec<String> + Send + Sync + 'static,
{
    Arc::new(move |call: &RpcCall| match call.method.as_str() {
        "query" => on_query(call),
        "signin" | "signup" => vec![result_frame(&call.id, json!("token-abc"))],
        _ => vec![result_frame(&call.id, Value::Null)],
    })
}

/// A responder answering every query with `statements`.
pub fn answering(statements: Value) -> Responder {
    responder(move |call| vec![result_frame(&call.id, statements.clone())])
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
