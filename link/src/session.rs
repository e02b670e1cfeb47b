//! Long-lived session with automatic reconnection.
//!
//! A [`Session`] owns at most one [`Connection`] at a time. A supervisor task
//! dials it, waits for it to close and, unless the close was requested by the
//! application, schedules the next attempt after a fixed delay while the
//! retry budget lasts. Query calls are forwarded to a [`BatchExecutor`] that
//! talks to whichever connection is current.

use crate::{
    connection::{protocol::resolve_rpc_url, Connection, ConnectionState},
    credentials::{Credentials, Registration},
    error::{QuarryError, Result},
    event_handlers::{EventHandlers, SessionEvent},
    executor::{default_log_printer, BatchExecutor, LogPrinter, QueryTransport},
    models::{Params, QueryOutcome, QueryRequest, SessionOptions},
    timeouts::Timeouts,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Capacity of the lifecycle event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

type ConnectionSlot = watch::Sender<Option<Arc<Connection>>>;

struct SessionInner {
    options: SessionOptions,
    timeouts: Timeouts,
    handlers: EventHandlers,
    events_tx: broadcast::Sender<SessionEvent>,
    state_tx: watch::Sender<ConnectionState>,
    connection: Arc<ConnectionSlot>,
    credentials: std::sync::RwLock<Option<Credentials>>,
    retries: AtomicU32,
    manual_close: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection.borrow().clone()
    }

    fn current_credentials(&self) -> Option<Credentials> {
        match self.credentials.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_credentials(&self, credentials: Option<Credentials>) {
        match self.credentials.write() {
            Ok(mut guard) => *guard = credentials,
            Err(poisoned) => *poisoned.into_inner() = credentials,
        }
    }
}

/// Routes executor calls to the session's current connection.
struct SessionTransport {
    connection: watch::Receiver<Option<Arc<Connection>>>,
}

#[async_trait]
impl QueryTransport for SessionTransport {
    fn is_ready(&self) -> bool {
        self.connection
            .borrow()
            .as_ref()
            .is_some_and(|connection| connection.is_open())
    }

    async fn send_query(&self, query: &str, params: &Params) -> Result<JsonValue> {
        let connection = self.connection.borrow().clone().ok_or_else(|| {
            QuarryError::NoConnection("There is no active connection to the database".to_string())
        })?;
        connection.query(query, params).await
    }
}

/// The object applications hold on to.
///
/// # Examples
///
/// ```rust,no_run
/// use quarry_link::writer::select;
/// use quarry_link::{Credentials, QueryRequest, Schema, Session, SessionOptions};
///
/// # async fn example() -> quarry_link::Result<()> {
/// let session = Session::builder(
///     SessionOptions::new("http://localhost:8000")
///         .with_namespace("test")
///         .with_database("test")
///         .with_credentials(Credentials::root("root", "root")),
/// )
/// .build()?;
/// session.ready().await?;
///
/// let people = session
///     .execute(QueryRequest::new(select(["*"]).from(["person"])).with_schema(Schema::record()))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    inner: Arc<SessionInner>,
    executor: BatchExecutor,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.options.connection.endpoint)
            .field("state", &self.state())
            .field("retry_attempts", &self.retry_attempts())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn builder(options: SessionOptions) -> SessionBuilder {
        SessionBuilder::new(options)
    }

    /// Start the supervisor if it is not already running. Clears a previous
    /// [`disconnect`](Self::disconnect) so unexpected closes are retried again.
    pub async fn connect(&self) {
        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        self.inner.manual_close.store(false, Ordering::SeqCst);
        self.inner.retries.store(0, Ordering::SeqCst);
        *supervisor = Some(spawn_supervisor(self.inner.clone()));
    }

    /// Close the current connection and stop reconnecting.
    pub async fn disconnect(&self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);

        if let Some(connection) = self.inner.current_connection() {
            connection.close().await;
        }

        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            handle.abort();
        }
        self.inner.connection.send_replace(None);
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Resolve once the session is open; fail if an error event fires first.
    pub async fn ready(&self) -> Result<()> {
        let mut events = self.inner.events_tx.subscribe();
        let mut state = self.inner.state_tx.subscribe();

        loop {
            if *state.borrow_and_update() == ConnectionState::Open {
                return Ok(());
            }

            tokio::select! {
                event = events.recv() => match event {
                    Ok(SessionEvent::Error(error)) => {
                        return Err(QuarryError::NoConnection(error.message));
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("[quarry-link] ready() skipped {} lifecycle events", skipped);
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(session_dropped());
                    },
                },
                changed = state.changed() => {
                    if changed.is_err() {
                        return Err(session_dropped());
                    }
                },
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Reconnect attempts made since the last successful open.
    pub fn retry_attempts(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.inner.timeouts
    }

    pub async fn execute(&self, request: QueryRequest) -> Result<QueryOutcome> {
        self.executor.execute(request).await
    }

    /// Run one statement and deserialize its reconciled result.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: QueryRequest) -> Result<T> {
        self.execute(request).await?.deserialize()
    }

    pub async fn batch(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.executor.batch(requests).await
    }

    pub async fn transaction(&self, requests: Vec<QueryRequest>) -> Result<Vec<QueryOutcome>> {
        self.executor.transaction(requests).await
    }

    /// Sign in on the current connection. The credentials are reused for
    /// later reconnects.
    pub async fn sign_in(&self, credentials: Credentials) -> Result<Option<String>> {
        let token = self.require_connection()?.sign_in(&credentials).await?;
        self.inner.store_credentials(Some(credentials));
        Ok(token)
    }

    pub async fn sign_up(&self, registration: &Registration) -> Result<Option<String>> {
        let token = self.require_connection()?.sign_up(registration).await?;
        if let Some(token) = &token {
            self.inner
                .store_credentials(Some(Credentials::token(token.clone())));
        }
        Ok(token)
    }

    /// Invalidate the current authentication. Later reconnects are anonymous.
    pub async fn sign_out(&self) -> Result<()> {
        self.require_connection()?.sign_out().await?;
        self.inner.store_credentials(None);
        Ok(())
    }

    fn require_connection(&self) -> Result<Arc<Connection>> {
        self.inner.current_connection().ok_or_else(|| {
            QuarryError::NoConnection("There is no active connection to the database".to_string())
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);
        if let Ok(mut supervisor) = self.inner.supervisor.try_lock() {
            if let Some(handle) = supervisor.take() {
                handle.abort();
            }
        }
        self.inner.connection.send_replace(None);
    }
}

fn session_dropped() -> QuarryError {
    QuarryError::NoConnection("The session was dropped".to_string())
}

fn spawn_supervisor(inner: Arc<SessionInner>) -> JoinHandle<()> {
    tokio::spawn(async move {
        supervise(inner).await;
    })
}

async fn supervise(inner: Arc<SessionInner>) {
    let retry_delay = Duration::from_millis(inner.options.retry_delay_ms);

    loop {
        inner.set_state(ConnectionState::Connecting);
        let credentials = inner.current_credentials();

        match Connection::establish(
            &inner.options.connection,
            credentials.as_ref(),
            &inner.timeouts,
            inner.handlers.clone(),
        )
        .await
        {
            Ok(connection) => {
                inner.retries.store(0, Ordering::SeqCst);
                let connection = Arc::new(connection);
                inner.connection.send_replace(Some(connection.clone()));
                inner.set_state(ConnectionState::Open);
                inner.handlers.emit_open();

                let reason = connection.closed().await;
                inner.connection.send_replace(None);
                inner.set_state(ConnectionState::Disconnected);

                if reason.by_client || inner.manual_close.load(Ordering::SeqCst) {
                    log::debug!("[quarry-link] Closed by client, not reconnecting");
                    return;
                }
            },
            Err(e) => {
                inner.set_state(ConnectionState::Disconnected);
                log::warn!("[quarry-link] Connection attempt failed: {}", e);
                if inner.manual_close.load(Ordering::SeqCst) {
                    return;
                }
            },
        }

        let attempts = inner.retries.load(Ordering::SeqCst);
        if !inner.options.should_retry(attempts) {
            log::warn!(
                "[quarry-link] Giving up after {} reconnect attempt(s)",
                attempts
            );
            return;
        }

        let attempt = inner.retries.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "[quarry-link] Attempting reconnection in {}ms (attempt {})",
            inner.options.retry_delay_ms,
            attempt
        );
        tokio::time::sleep(retry_delay).await;

        if inner.manual_close.load(Ordering::SeqCst) {
            return;
        }
    }
}

/// Fans lifecycle callbacks out to the application's handlers and the
/// session's broadcast channel.
fn session_handlers(
    user: EventHandlers,
    events_tx: broadcast::Sender<SessionEvent>,
) -> EventHandlers {
    let mut handlers = EventHandlers::new();

    let (hooks, tx) = (user.clone(), events_tx.clone());
    handlers = handlers.on_connect(move || {
        hooks.emit_connect();
        let _ = tx.send(SessionEvent::Connect);
    });

    let (hooks, tx) = (user.clone(), events_tx.clone());
    handlers = handlers.on_open(move || {
        hooks.emit_open();
        let _ = tx.send(SessionEvent::Open);
    });

    let (hooks, tx) = (user.clone(), events_tx.clone());
    handlers = handlers.on_disconnect(move |reason| {
        hooks.emit_disconnect(reason.clone());
        let _ = tx.send(SessionEvent::Close(reason));
    });

    let (hooks, tx) = (user.clone(), events_tx);
    handlers = handlers.on_error(move |error| {
        hooks.emit_error(error.clone());
        let _ = tx.send(SessionEvent::Error(error));
    });

    if user.on_receive.is_some() {
        let hooks = user.clone();
        handlers = handlers.on_receive(move |raw| hooks.emit_receive(raw));
    }
    if user.on_send.is_some() {
        let hooks = user;
        handlers = handlers.on_send(move |raw| hooks.emit_send(raw));
    }

    handlers
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    options: SessionOptions,
    timeouts: Timeouts,
    event_handlers: EventHandlers,
    log_printer: Option<LogPrinter>,
}

impl SessionBuilder {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            timeouts: Timeouts::default(),
            event_handlers: EventHandlers::new(),
            log_printer: None,
        }
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Custom printer for the `logging` option. Implies `logging = true`.
    pub fn log_printer(mut self, printer: impl Fn(&str, &Params) + Send + Sync + 'static) -> Self {
        self.log_printer = Some(Arc::new(printer));
        self.options.logging = true;
        self
    }

    /// Build the session. With `auto_connect` the first dial starts right
    /// away, so this must run inside a Tokio runtime.
    pub fn build(self) -> Result<Session> {
        resolve_rpc_url(&self.options.connection.endpoint)?;

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (connection_tx, connection_rx) = watch::channel(None);

        let handlers = session_handlers(self.event_handlers, events_tx.clone());
        let credentials = self.options.credentials.clone();
        let auto_connect = self.options.auto_connect;

        let mut executor = BatchExecutor::new(Arc::new(SessionTransport {
            connection: connection_rx,
        }));
        if self.options.logging {
            executor =
                executor.with_log_printer(self.log_printer.unwrap_or_else(default_log_printer));
        }

        let inner = Arc::new(SessionInner {
            options: self.options,
            timeouts: self.timeouts,
            handlers,
            events_tx,
            state_tx,
            connection: Arc::new(connection_tx),
            credentials: std::sync::RwLock::new(credentials),
            retries: AtomicU32::new(0),
            manual_close: AtomicBool::new(false),
            supervisor: Mutex::new(None),
        });

        if auto_connect {
            let handle = spawn_supervisor(inner.clone());
            if let Ok(mut supervisor) = inner.supervisor.try_lock() {
                *supervisor = Some(handle);
            }
        }

        Ok(Session { inner, executor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_handlers::{ConnectionError, DisconnectReason};
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn test_build_rejects_bad_endpoint() {
        let err = Session::builder(SessionOptions::new("not a url")).build().unwrap_err();
        assert_eq!(err.kind().as_str(), "configuration");
    }

    #[tokio::test]
    async fn test_calls_without_connection() {
        let session = Session::builder(
            SessionOptions::new("http://127.0.0.1:9").with_auto_connect(false),
        )
        .build()
        .unwrap();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        let err = session
            .execute(QueryRequest::new(crate::writer::query("INFO FOR DB").with_any()))
            .await
            .unwrap_err();
        assert_eq!(err.kind().as_str(), "no_connection");

        let err = session.sign_out().await.unwrap_err();
        assert_eq!(err.kind().as_str(), "no_connection");

        assert!(session.batch(vec![]).await.unwrap().is_empty());
    }

    #[test]
    fn test_session_handlers_fan_out() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let user = EventHandlers::new().on_disconnect(move |reason| {
            sink.lock().unwrap().push(reason.message);
        });
        let (tx, mut rx) = broadcast::channel(8);
        let handlers = session_handlers(user, tx);

        handlers.emit_connect();
        handlers.emit_disconnect(DisconnectReason::with_code("abnormal", 1006));
        handlers.emit_error(ConnectionError::new("boom", true));

        assert_eq!(seen.lock().unwrap().as_slice(), ["abnormal".to_string()]);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Connect);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Close(DisconnectReason::with_code("abnormal", 1006))
        );
        assert!(matches!(rx.try_recv().unwrap(), SessionEvent::Error(_)));
    }
}
