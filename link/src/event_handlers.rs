//! Session lifecycle event handlers.
//!
//! Callback hooks fired by [`Session`](crate::Session) as its connection moves
//! through its lifecycle:
//!
//! - [`on_connect`](EventHandlers::on_connect): about to dial the server
//! - [`on_open`](EventHandlers::on_open): authenticated and usable
//! - [`on_disconnect`](EventHandlers::on_disconnect): socket closed, with code and reason
//! - [`on_error`](EventHandlers::on_error): dial, handshake or protocol error
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   raw frame tracing
//!
//! The same events are also published on a broadcast channel as
//! [`SessionEvent`] for callers that prefer to `await` them.
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry_link::{EventHandlers, Session, SessionOptions};
//!
//! # async fn example() -> quarry_link::Result<()> {
//! let handlers = EventHandlers::new()
//!     .on_open(|| println!("ready"))
//!     .on_disconnect(|reason| println!("closed: {}", reason))
//!     .on_error(|error| eprintln!("connection error: {}", error));
//!
//! let session = Session::builder(SessionOptions::new("http://localhost:8000"))
//!     .event_handlers(handlers)
//!     .build()?;
//! session.ready().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

/// Close code reported when the socket dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported for a caller-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
    /// `true` when the close was requested through `close()`/`disconnect()`.
    /// Such closes never trigger a reconnect.
    pub by_client: bool,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            by_client: false,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
            by_client: false,
        }
    }

    pub(crate) fn abnormal(message: impl Into<String>) -> Self {
        Self::with_code(message, ABNORMAL_CLOSURE)
    }

    pub(crate) fn terminated() -> Self {
        Self {
            message: "connection terminated".to_string(),
            code: Some(NORMAL_CLOSURE),
            by_client: true,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub message: String,
    /// Whether a reconnect might succeed. Authentication rejections are not
    /// recoverable; dropped sockets are.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Lifecycle event published on the session's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A dial attempt is starting.
    Connect,
    /// The handshake finished and calls may be issued.
    Open,
    /// The socket closed.
    Close(DisconnectReason),
    /// A dial or handshake attempt failed.
    Error(ConnectionError),
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

pub type OnOpenCallback = Arc<dyn Fn() + Send + Sync>;

pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Debug hook for every raw inbound frame.
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Debug hook for every raw outbound frame.
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional and `Send + Sync`; they are invoked from the
/// background connection and supervisor tasks, so they should return quickly.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_open: Option<OnOpenCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnReceiveCallback>,
    pub(crate) on_send: Option<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked right before each dial attempt.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked once the session is authenticated and the
    /// namespace/database have been selected.
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the socket closes, whether the server
    /// dropped it or the caller asked for it.
    ///
    /// ```rust
    /// use quarry_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_disconnect(|reason| println!("Disconnected: {}", reason));
    /// ```
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a tracing hook receiving every raw inbound JSON frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a tracing hook receiving every raw outbound JSON frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }

    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_open.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
            || self.on_send.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            cb();
        }
    }

    pub(crate) fn emit_open(&self) {
        if let Some(cb) = &self.on_open {
            cb();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_handlers() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect();
        handlers.emit_disconnect(DisconnectReason::new("noop"));
    }

    #[test]
    fn test_emit_invokes_registered_callbacks() {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let o = opens.clone();
        let c = closes.clone();
        let handlers = EventHandlers::new()
            .on_open(move || {
                o.fetch_add(1, Ordering::SeqCst);
            })
            .on_disconnect(move |reason| {
                assert_eq!(reason.code, Some(ABNORMAL_CLOSURE));
                c.fetch_add(1, Ordering::SeqCst);
            });

        assert!(handlers.has_any());
        handlers.emit_open();
        handlers.emit_open();
        handlers.emit_disconnect(DisconnectReason::abnormal("abnormal"));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::with_code("abnormal", 1006).to_string(),
            "abnormal (code: 1006)"
        );
        assert_eq!(DisconnectReason::new("gone").to_string(), "gone");
        assert!(DisconnectReason::terminated().by_client);
    }
}
