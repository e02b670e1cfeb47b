//! Background task owning the socket and the correlation table.
//!
//! Every RPC call goes through the command channel; the task writes the
//! envelope, records a pending entry with its own deadline and resolves the
//! caller when the matching reply arrives. Keepalive pings share the same
//! table so their replies are consumed silently.

use crate::{
    connection::{
        protocol::{next_id, RpcRequest, RpcResponse},
        ConnectionState, WebSocketStream, FAR_FUTURE,
    },
    error::{QuarryError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    timeouts::Timeouts,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message};

pub(crate) type CallReply = oneshot::Sender<Result<JsonValue>>;

/// Commands sent from [`Connection`](super::Connection) to the task.
pub(crate) enum ConnCmd {
    Call { request: RpcRequest, reply: CallReply },
    Close,
}

struct PendingCall {
    method: String,
    deadline: TokioInstant,
    /// `None` for fire-and-forget calls such as the keepalive ping.
    reply: Option<CallReply>,
}

pub(crate) struct TaskContext {
    pub timeouts: Timeouts,
    pub handlers: EventHandlers,
    pub state_tx: Arc<watch::Sender<ConnectionState>>,
    pub closed_tx: watch::Sender<Option<DisconnectReason>>,
}

async fn write_request(
    ws: &mut WebSocketStream,
    request: &RpcRequest,
    handlers: &EventHandlers,
) -> Result<()> {
    let payload = serde_json::to_string(request)?;
    handlers.emit_send(&payload);
    ws.send(Message::Text(payload.into())).await.map_err(|e| {
        QuarryError::WebSocketError(format!("Failed to send {}: {}", request.method, e))
    })
}

fn dispatch(text: &str, pending: &mut HashMap<String, PendingCall>) {
    let response: RpcResponse = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            log::warn!("[quarry-link] Failed to parse RPC frame: {}", e);
            return;
        },
    };

    if response.is_notify() {
        log::trace!("[quarry-link] Ignoring notify frame");
        return;
    }

    let Some(id) = response.id.clone() else {
        log::warn!("[quarry-link] Dropping RPC frame without id");
        return;
    };

    match pending.remove(&id) {
        Some(call) => {
            log::trace!("[quarry-link] Reply for {} ({})", id, call.method);
            if let Some(reply) = call.reply {
                let _ = reply.send(response.into_result());
            }
        },
        None => log::warn!("[quarry-link] Dropping reply for unknown id {}", id),
    }
}

fn expire_overdue(pending: &mut HashMap<String, PendingCall>, timeout: std::time::Duration) {
    let now = TokioInstant::now();
    let overdue: Vec<String> = pending
        .iter()
        .filter(|(_, call)| call.deadline <= now)
        .map(|(id, _)| id.clone())
        .collect();

    for id in overdue {
        if let Some(call) = pending.remove(&id) {
            log::debug!(
                "[quarry-link] Call {} ({}) timed out after {:?}",
                id,
                call.method,
                timeout
            );
            if let Some(reply) = call.reply {
                let _ = reply.send(Err(QuarryError::TimeoutError(format!(
                    "No response to {} within {:?}",
                    call.method, timeout
                ))));
            }
        }
    }
}

fn call_deadline(timeouts: &Timeouts) -> TokioInstant {
    if Timeouts::is_no_timeout(timeouts.request_timeout) {
        TokioInstant::now() + FAR_FUTURE
    } else {
        TokioInstant::now() + timeouts.request_timeout
    }
}

pub(crate) async fn connection_task(
    mut ws: WebSocketStream,
    mut cmd_rx: mpsc::Receiver<ConnCmd>,
    ctx: TaskContext,
) {
    let TaskContext {
        timeouts,
        handlers,
        state_tx,
        closed_tx,
    } = ctx;

    let mut pending: HashMap<String, PendingCall> = HashMap::new();

    let has_keepalive = !timeouts.keepalive_interval.is_zero();
    let keepalive_dur = if has_keepalive {
        timeouts.keepalive_interval
    } else {
        FAR_FUTURE
    };
    let mut ping_deadline = TokioInstant::now() + keepalive_dur;

    let reason = loop {
        let next_expiry = pending
            .values()
            .map(|call| call.deadline)
            .min()
            .unwrap_or_else(|| TokioInstant::now() + FAR_FUTURE);

        let expiry_sleep = tokio::time::sleep_until(next_expiry);
        tokio::pin!(expiry_sleep);

        let ping_sleep = tokio::time::sleep_until(ping_deadline);
        tokio::pin!(ping_sleep);

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ConnCmd::Call { request, reply }) => {
                        if pending.contains_key(&request.id) {
                            let _ = reply.send(Err(QuarryError::InvalidRequest(format!(
                                "Correlation id {} is already in flight",
                                request.id
                            ))));
                            continue;
                        }
                        if let Err(e) = write_request(&mut ws, &request, &handlers).await {
                            let message = e.to_string();
                            let _ = reply.send(Err(e));
                            break DisconnectReason::abnormal(message);
                        }
                        pending.insert(request.id, PendingCall {
                            method: request.method,
                            deadline: call_deadline(&timeouts),
                            reply: Some(reply),
                        });
                    },
                    Some(ConnCmd::Close) | None => {
                        let _ = ws
                            .close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "connection terminated".into(),
                            }))
                            .await;
                        break DisconnectReason::terminated();
                    },
                }
            }

            _ = &mut expiry_sleep, if !pending.is_empty() => {
                expire_overdue(&mut pending, timeouts.request_timeout);
            }

            _ = &mut ping_sleep, if has_keepalive => {
                ping_deadline = TokioInstant::now() + keepalive_dur;
                let request = RpcRequest::new(next_id(), "ping", Vec::new());
                if pending.contains_key(&request.id) {
                    continue;
                }
                if let Err(e) = write_request(&mut ws, &request, &handlers).await {
                    log::warn!("[quarry-link] Keepalive ping failed: {}", e);
                    break DisconnectReason::abnormal(format!("Keepalive ping failed: {}", e));
                }
                pending.insert(request.id, PendingCall {
                    method: request.method,
                    deadline: call_deadline(&timeouts),
                    reply: None,
                });
            }

            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handlers.emit_receive(&text);
                        dispatch(&text, &mut pending);
                    },
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            handlers.emit_receive(text);
                            dispatch(text, &mut pending);
                        },
                        Err(e) => {
                            log::warn!("[quarry-link] Dropping non-UTF-8 binary frame: {}", e)
                        },
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    },
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {},
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) if !f.reason.is_empty() => {
                                DisconnectReason::with_code(f.reason.as_str(), f.code.into())
                            },
                            Some(f) => DisconnectReason::with_code(
                                "Server closed connection",
                                f.code.into(),
                            ),
                            None => DisconnectReason::new("Server closed connection"),
                        };
                    },
                    Some(Err(e)) => {
                        let message = e.to_string();
                        handlers.emit_error(ConnectionError::new(&message, true));
                        break DisconnectReason::abnormal(format!("WebSocket error: {}", message));
                    },
                    None => break DisconnectReason::abnormal("WebSocket stream ended"),
                }
            }
        }
    };

    if !pending.is_empty() {
        log::debug!(
            "[quarry-link] Failing {} pending call(s) after close: {}",
            pending.len(),
            reason
        );
    }
    for (_, call) in pending.drain() {
        if let Some(reply) = call.reply {
            let _ = reply.send(Err(QuarryError::NoConnection(format!(
                "The connection closed before {} completed",
                call.method
            ))));
        }
    }

    log::info!("[quarry-link] Connection closed: {}", reason);
    state_tx.send_replace(ConnectionState::Disconnected);
    closed_tx.send_replace(Some(reason.clone()));
    handlers.emit_disconnect(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Accepts one socket and reads frames without ever answering.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            }
        });
        format!("ws://{}/rpc", addr)
    }

    fn call(id: &str, method: &str) -> (ConnCmd, oneshot::Receiver<Result<JsonValue>>) {
        let (reply, rx) = oneshot::channel();
        let request = RpcRequest::new(id, method, Vec::new());
        (ConnCmd::Call { request, reply }, rx)
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_is_rejected() {
        let url = silent_server().await;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, _) = watch::channel(ConnectionState::Open);
        let (closed_tx, closed_rx) = watch::channel(None);
        let task = tokio::spawn(connection_task(
            ws,
            cmd_rx,
            TaskContext {
                timeouts: Timeouts::builder()
                    .request_timeout(Duration::from_secs(30))
                    .keepalive_interval(Duration::ZERO)
                    .build(),
                handlers: EventHandlers::new(),
                state_tx: Arc::new(state_tx),
                closed_tx,
            },
        ));

        let (first, first_rx) = call("dupe123", "query");
        let (second, second_rx) = call("dupe123", "query");
        cmd_tx.send(first).await.unwrap();
        cmd_tx.send(second).await.unwrap();

        let err = second_rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid_request");
        assert!(err.to_string().contains("dupe123"));

        // The first call was not overwritten: it is still waiting and only
        // fails once the socket goes away.
        cmd_tx.send(ConnCmd::Close).await.unwrap();
        let err = first_rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind().as_str(), "no_connection");

        task.await.unwrap();
        let reason = closed_rx.borrow().clone().unwrap();
        assert!(reason.by_client);
    }
}
