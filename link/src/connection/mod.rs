//! WebSocket RPC connection.
//!
//! This module contains:
//! - [`protocol`]: JSON-RPC envelopes, socket URL resolution and correlation ids
//! - `task`: the background task owning the socket and the pending-call table
//!
//! [`Connection`] is the handle: it dials the socket, runs the sign-in and
//! `use` handshake, and exposes the RPC operations. It knows nothing about
//! retry policy; the [`Session`](crate::Session) decides whether to open a new
//! one after a close.

pub mod protocol;
mod task;

use crate::{
    credentials::{Credentials, Registration},
    error::{QuarryError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    executor::QueryTransport,
    models::{ConnectionDetails, Params},
    timeouts::Timeouts,
};
use async_trait::async_trait;
use protocol::{next_id, resolve_rpc_url, RpcRequest};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use task::{connection_task, ConnCmd, TaskContext};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::MaybeTlsStream;

pub(crate) type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the command channel between handles and the socket task.
pub(crate) const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);

/// Lifecycle of a connection as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// One live socket to the server.
pub struct Connection {
    cmd_tx: mpsc::Sender<ConnCmd>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    closed_rx: watch::Receiver<Option<DisconnectReason>>,
    _task: JoinHandle<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dial the endpoint and run the handshake: `signin`/`authenticate` when
    /// credentials are given, then `use` when both namespace and database are
    /// configured. A failed handshake closes the socket before returning.
    ///
    /// `on_open` fires once the handshake has succeeded.
    pub async fn open(
        details: &ConnectionDetails,
        credentials: Option<&Credentials>,
        timeouts: &Timeouts,
        handlers: EventHandlers,
    ) -> Result<Self> {
        let connection = Self::establish(details, credentials, timeouts, handlers.clone()).await?;
        handlers.emit_open();
        Ok(connection)
    }

    /// Same as [`open`](Self::open) without firing `on_open`, for owners that
    /// publish the connection somewhere before announcing it.
    pub(crate) async fn establish(
        details: &ConnectionDetails,
        credentials: Option<&Credentials>,
        timeouts: &Timeouts,
        handlers: EventHandlers,
    ) -> Result<Self> {
        let url = resolve_rpc_url(&details.endpoint)?;

        handlers.emit_connect();
        log::debug!("[quarry-link] Connecting to {}", url);

        let dial = tokio_tungstenite::connect_async(url.as_str());
        let dialed = if Timeouts::is_no_timeout(timeouts.connection_timeout) {
            Ok(dial.await)
        } else {
            tokio::time::timeout(timeouts.connection_timeout, dial).await
        };

        let ws = match dialed {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                let message = format!("Connection failed: {}", e);
                handlers.emit_error(ConnectionError::new(&message, true));
                return Err(QuarryError::WebSocketError(message));
            },
            Err(_) => {
                let message = format!("Connection timeout ({:?})", timeouts.connection_timeout);
                handlers.emit_error(ConnectionError::new(&message, true));
                return Err(QuarryError::TimeoutError(message));
            },
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);
        let (closed_tx, closed_rx) = watch::channel(None);

        let task = tokio::spawn(connection_task(
            ws,
            cmd_rx,
            TaskContext {
                timeouts: timeouts.clone(),
                handlers: handlers.clone(),
                state_tx: state_tx.clone(),
                closed_tx,
            },
        ));

        let connection = Self {
            cmd_tx,
            state_tx,
            closed_rx,
            _task: task,
        };

        if let Err(e) = connection.handshake(details, credentials).await {
            log::warn!("[quarry-link] Handshake failed: {}", e);
            handlers.emit_error(ConnectionError::new(
                e.to_string(),
                !matches!(e, QuarryError::AuthFailure(_)),
            ));
            connection.close().await;
            return Err(e);
        }

        connection.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        if !connection.is_open() {
            return Err(QuarryError::NoConnection(
                "The connection closed during the handshake".to_string(),
            ));
        }

        log::info!("[quarry-link] Connection open: {}", url);
        Ok(connection)
    }

    async fn handshake(
        &self,
        details: &ConnectionDetails,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        if let Some(credentials) = credentials {
            self.sign_in(credentials).await?;
        }

        if let (Some(namespace), Some(database)) = (&details.namespace, &details.database) {
            self.call("use", vec![json!(namespace), json!(database)]).await?;
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Issue one RPC call and wait for its reply or its timeout.
    pub async fn call(&self, method: &str, params: Vec<JsonValue>) -> Result<JsonValue> {
        if self.state() == ConnectionState::Disconnected {
            return Err(QuarryError::NoConnection(
                "There is no active connection to the database".to_string(),
            ));
        }

        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(ConnCmd::Call {
                request: RpcRequest::new(next_id(), method, params),
                reply,
            })
            .await
            .map_err(|_| QuarryError::NoConnection("Connection task is not running".to_string()))?;

        response.await.map_err(|_| {
            QuarryError::NoConnection("Connection task exited before responding".to_string())
        })?
    }

    /// Run a (possibly multi-statement) query. The reply is the server's
    /// per-statement result array.
    pub async fn query(&self, text: &str, params: &Params) -> Result<JsonValue> {
        self.call("query", vec![json!(text), JsonValue::Object(params.clone())])
            .await
    }

    /// Sign in with credentials, or authenticate with a token. Returns the
    /// session token when the server issues one.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Option<String>> {
        let outcome = match credentials {
            Credentials::Token { token } => self.call("authenticate", vec![json!(token)]).await,
            other => {
                let params = serde_json::to_value(other)?;
                self.call("signin", vec![params]).await
            },
        };

        outcome
            .map(token_from)
            .map_err(|e| auth_error("Authentication failed", e))
    }

    pub async fn sign_up(&self, registration: &Registration) -> Result<Option<String>> {
        let params = serde_json::to_value(registration)?;
        self.call("signup", vec![params])
            .await
            .map(token_from)
            .map_err(|e| auth_error("Registration failed", e))
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.call("invalidate", Vec::new())
            .await
            .map(|_| ())
            .map_err(|e| auth_error("Sign out failed", e))
    }

    /// Close the socket as the caller. The resulting close is marked
    /// `by_client` so a session never retries it.
    ///
    /// Calls still awaiting a reply fail at once with `no_connection`; they
    /// do not wait out their request timeout.
    pub async fn close(&self) {
        if self.cmd_tx.send(ConnCmd::Close).await.is_ok() {
            self.closed().await;
        }
    }

    /// Wait until the socket has closed, for whatever reason. By the time
    /// this resolves every call that was in flight has already failed with
    /// `no_connection`.
    pub async fn closed(&self) -> DisconnectReason {
        let mut closed_rx = self.closed_rx.clone();
        loop {
            if let Some(reason) = closed_rx.borrow_and_update().clone() {
                return reason;
            }
            if closed_rx.changed().await.is_err() {
                return closed_rx
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| DisconnectReason::abnormal("Connection task exited"));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ConnCmd::Close);
    }
}

#[async_trait]
impl QueryTransport for Connection {
    fn is_ready(&self) -> bool {
        self.is_open()
    }

    async fn send_query(&self, query: &str, params: &Params) -> Result<JsonValue> {
        self.query(query, params).await
    }
}

fn token_from(result: JsonValue) -> Option<String> {
    match result {
        JsonValue::String(token) => Some(token),
        _ => None,
    }
}

/// Server rejections become `auth_failure`; transport errors keep their kind
/// so callers can tell bad credentials from a dead network.
fn auth_error(context: &str, error: QuarryError) -> QuarryError {
    match error {
        QuarryError::ServerError(message) => {
            QuarryError::AuthFailure(format!("{}: {}", context, message))
        },
        other => other,
    }
}
