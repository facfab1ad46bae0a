//! Bounded worker pool and the type-tag → handler registry.
//!
//! Read loops push `(connection, raw frame)` pairs into one shared bounded
//! queue; a fixed set of workers drains it and routes each frame through
//! the [`Dispatcher`]. Handlers may block on store or bus I/O — the pool is
//! sized for that — and frames from one connection may complete out of
//! order relative to each other.

use std::{collections::HashMap, sync::Arc};

use {
    futures::{FutureExt, future::BoxFuture},
    tracing::{debug, error, warn},
};

use whisper_protocol::{ClientMessage, DecodeError, decode_client};

use crate::connection::{ConnectionHandle, Job, close_reasons, send_bad_message};

/// A registered message handler. Handlers own their error reporting; the
/// dispatch layer only guarantees they run and that a panic stays inside
/// the worker.
pub type Handler =
    Box<dyn Fn(Arc<ConnectionHandle>, ClientMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Maps inbound `type` tags to handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a `type` tag. Later registrations replace
    /// earlier ones.
    pub fn register(&mut self, type_tag: &'static str, handler: Handler) {
        self.handlers.insert(type_tag, handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Decode and route one raw frame.
    pub async fn dispatch(&self, conn: Arc<ConnectionHandle>, raw: &str) {
        let msg = match decode_client(raw) {
            Ok(msg) => msg,
            Err(DecodeError::UnknownType(tag)) => {
                debug!(sid = %conn.sid(), %tag, "dropping unknown message type");
                return;
            },
            Err(DecodeError::BadPayload { type_tag, detail }) => {
                debug!(sid = %conn.sid(), %type_tag, %detail, "bad payload");
                send_bad_message(&conn, format!("bad `{type_tag}` payload"));
                return;
            },
            Err(DecodeError::Malformed(detail)) => {
                warn!(sid = %conn.sid(), %detail, "malformed frame, closing");
                conn.close(close_reasons::PROTOCOL_ERROR);
                return;
            },
        };

        let Some(handler) = self.handlers.get(msg.type_tag()) else {
            debug!(sid = %conn.sid(), tag = msg.type_tag(), "no handler registered");
            return;
        };

        // A panicking handler must not take the worker down with it.
        let sid = conn.sid().to_string();
        let fut = std::panic::AssertUnwindSafe(handler(conn, msg));
        if fut.catch_unwind().await.is_err() {
            error!(%sid, "handler panicked");
        }
    }
}

/// Fixed-size pool draining the shared inbound queue.
pub struct WorkerPool {
    jobs: flume::Sender<Job>,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue of the given depth.
    pub fn start(size: usize, queue_depth: usize, dispatcher: Arc<Dispatcher>) -> Self {
        let (tx, rx) = flume::bounded::<Job>(queue_depth);
        for _ in 0..size {
            let rx = rx.clone();
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                while let Ok((conn, raw)) = rx.recv_async().await {
                    dispatcher.dispatch(conn, &raw).await;
                }
            });
        }
        Self { jobs: tx }
    }

    /// The producer side handed to each connection's read loop. Workers
    /// exit once every sender (and the pool itself) is dropped.
    pub fn jobs(&self) -> flume::Sender<Job> {
        self.jobs.clone()
    }
}
