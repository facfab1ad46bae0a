//! Per-socket state and the read/write loops.
//!
//! Each accepted socket gets one [`ConnectionHandle`] (shared with the
//! directory and every handler touching the session), one write task
//! draining the bounded outbound queue, and a read loop owned by the
//! upgrade task. Identity is the session id.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use {
    axum::extract::ws::{CloseFrame, Message, WebSocket},
    bytes::Bytes,
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use {
    whisper_config::GatewayConfig,
    whisper_protocol::{MAX_FRAME_BYTES, ServerMessage, error_codes},
};

/// Inbound work item: the originating connection and the raw text frame.
pub type Job = (Arc<ConnectionHandle>, String);

/// Close reasons recorded on the handle and sent in the close frame.
pub mod close_reasons {
    pub const PEER_CLOSED: &str = "peer_closed";
    pub const READ_TIMEOUT: &str = "read_timeout";
    pub const WRITE_TIMEOUT: &str = "write_timeout";
    pub const READ_ERROR: &str = "read_error";
    pub const PROTOCOL_ERROR: &str = "protocol_error";
    pub const SLOW_CONSUMER: &str = "slow_consumer";
    pub const BACKPRESSURE: &str = "backpressure";
    pub const SERVER_SHUTDOWN: &str = "server_shutdown";
}

/// Shared per-connection state. The socket itself lives in the loops; the
/// handle only carries what handlers and the directory need: the send
/// queue, the cancel token, and the close bookkeeping.
pub struct ConnectionHandle {
    sid: String,
    outbound: mpsc::Sender<ServerMessage>,
    cancel: CancellationToken,
    closed: AtomicBool,
    close_reason: std::sync::Mutex<Option<&'static str>>,
}

impl ConnectionHandle {
    /// Build the handle plus the receiving half of its outbound queue.
    pub fn new(sid: String, queue_depth: usize) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let handle = Arc::new(Self {
            sid,
            outbound: tx,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            close_reason: std::sync::Mutex::new(None),
        });
        (handle, rx)
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close_reason(&self) -> Option<&'static str> {
        self.close_reason.lock().ok().and_then(|r| *r)
    }

    /// Enqueue an outbound message. A full queue means the client cannot
    /// keep up; the connection is closed with `slow_consumer` rather than
    /// letting one socket hold memory hostage.
    pub fn write_message(&self, msg: ServerMessage) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(sid = %self.sid, "outbound queue overflow");
                self.close(close_reasons::SLOW_CONSUMER);
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Idempotent close: the first caller records the reason and cancels
    /// both loops; later calls are no-ops.
    pub fn close(&self, reason: &'static str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut slot) = self.close_reason.lock() {
            *slot = Some(reason);
        }
        self.cancel.cancel();
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Run a connection to completion: spawn the write loop, consume the read
/// side, and return once the socket is done. The caller owns registration
/// and the disconnect callback.
pub async fn run_connection(
    socket: WebSocket,
    handle: Arc<ConnectionHandle>,
    outbound_rx: mpsc::Receiver<ServerMessage>,
    jobs: flume::Sender<Job>,
    config: &GatewayConfig,
) {
    let (ws_tx, ws_rx) = socket.split();

    let write_handle = tokio::spawn(write_loop(
        ws_tx,
        handle.clone(),
        outbound_rx,
        config.ping_interval(),
        config.write_timeout(),
    ));

    read_loop(ws_rx, handle.clone(), jobs, config.read_timeout()).await;

    // Reader is done; make sure the writer unblocks and drains out.
    handle.close(close_reasons::PEER_CLOSED);
    let _ = write_handle.await;
}

async fn read_loop(
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    handle: Arc<ConnectionHandle>,
    jobs: flume::Sender<Job>,
    read_timeout: std::time::Duration,
) {
    loop {
        let frame = tokio::select! {
            _ = handle.cancelled() => break,
            frame = tokio::time::timeout(read_timeout, ws_rx.next()) => frame,
        };

        let msg = match frame {
            Err(_) => {
                debug!(sid = %handle.sid(), "read deadline elapsed");
                handle.close(close_reasons::READ_TIMEOUT);
                break;
            },
            Ok(None) => {
                handle.close(close_reasons::PEER_CLOSED);
                break;
            },
            Ok(Some(Err(e))) => {
                debug!(sid = %handle.sid(), error = %e, "read error");
                handle.close(close_reasons::READ_ERROR);
                break;
            },
            Ok(Some(Ok(msg))) => msg,
        };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => {
                handle.close(close_reasons::PEER_CLOSED);
                break;
            },
            // Ping/pong already refreshed the deadline by arriving.
            _ => continue,
        };

        if text.len() > MAX_FRAME_BYTES {
            warn!(sid = %handle.sid(), size = text.len(), "oversized frame");
            handle.close(close_reasons::PROTOCOL_ERROR);
            break;
        }

        // A full work queue back-pressures this socket; if the stall
        // outlives the read deadline the connection is shed.
        let enqueue = tokio::time::timeout(read_timeout, jobs.send_async((handle.clone(), text)));
        match enqueue.await {
            Ok(Ok(())) => {},
            Ok(Err(_)) => break, // pool shut down
            Err(_) => {
                warn!(sid = %handle.sid(), "work queue stalled past read deadline");
                handle.close(close_reasons::BACKPRESSURE);
                break;
            },
        }
    }
}

async fn write_loop(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    handle: Arc<ConnectionHandle>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
    ping_interval: std::time::Duration,
    write_timeout: std::time::Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.tick().await; // the first tick fires immediately

    loop {
        tokio::select! {
            _ = handle.cancelled() => break,
            _ = ping.tick() => {
                let send = tokio::time::timeout(write_timeout, ws_tx.send(Message::Ping(Bytes::new())));
                if !matches!(send.await, Ok(Ok(()))) {
                    handle.close(close_reasons::WRITE_TIMEOUT);
                    break;
                }
            },
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                let send = tokio::time::timeout(write_timeout, ws_tx.send(Message::Text(json.into())));
                if !matches!(send.await, Ok(Ok(()))) {
                    handle.close(close_reasons::WRITE_TIMEOUT);
                    break;
                }
            },
        }
    }

    // Best-effort close frame carrying the recorded reason.
    let reason = handle.close_reason().unwrap_or(close_reasons::PEER_CLOSED);
    let close = Message::Close(Some(CloseFrame {
        code: close_code(reason),
        reason: reason.into(),
    }));
    let _ = tokio::time::timeout(write_timeout, ws_tx.send(close)).await;
}

fn close_code(reason: &str) -> u16 {
    match reason {
        close_reasons::SERVER_SHUTDOWN => 1001,
        close_reasons::PROTOCOL_ERROR => 1008,
        close_reasons::SLOW_CONSUMER | close_reasons::BACKPRESSURE => 1013,
        _ => 1000,
    }
}

/// Convenience: enqueue an `error{code, message}` frame.
pub fn send_error(handle: &ConnectionHandle, code: &str, message: impl Into<String>) {
    handle.write_message(ServerMessage::error(code, message));
}

/// Enqueue a `bad_message` reply for a recognized-but-unusable frame.
pub fn send_bad_message(handle: &ConnectionHandle, detail: impl Into<String>) {
    send_error(handle, error_codes::BAD_MESSAGE, detail);
}
