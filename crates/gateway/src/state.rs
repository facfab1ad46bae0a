//! Shared gateway runtime state: the connection directory and the
//! disconnect callback. Only the server mutates the directory; handlers
//! and bus callbacks read it through [`GatewayState::send_message`].

use std::{collections::HashMap, sync::Arc};

use {
    futures::future::BoxFuture,
    tokio::sync::RwLock,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use {whisper_config::GatewayConfig, whisper_protocol::ServerMessage};

use crate::connection::ConnectionHandle;

/// Invoked exactly once per connection after its loops exit.
pub type DisconnectHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    /// The session has no socket on this instance. It may be live on
    /// another edge — callers needing cross-instance delivery go through
    /// the bus instead.
    #[error("session {0} is not connected to this instance")]
    NotConnected(String),
    /// The connection exists but its queue is gone or full; the socket is
    /// closing.
    #[error("session {0} is closing")]
    Closing(String),
}

pub struct GatewayState {
    pub config: GatewayConfig,
    /// Edge-instance identity written to every owned session record.
    pub server_name: String,
    connections: RwLock<HashMap<String, Arc<ConnectionHandle>>>,
    on_disconnect: RwLock<Option<DisconnectHandler>>,
    /// Cancelled when the process begins graceful shutdown.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let server_name = config.resolved_server_name();
        Arc::new(Self {
            config,
            server_name,
            connections: RwLock::new(HashMap::new()),
            on_disconnect: RwLock::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    /// Register a freshly accepted connection under its session id.
    pub async fn register_connection(&self, conn: Arc<ConnectionHandle>) {
        let sid = conn.sid().to_string();
        self.connections.write().await.insert(sid, conn);
    }

    /// Remove a connection; returns it if it was present.
    pub async fn remove_connection(&self, sid: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.write().await.remove(sid)
    }

    pub async fn connection(&self, sid: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.read().await.get(sid).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Enqueue a message for a locally attached session.
    pub async fn send_message(&self, sid: &str, msg: ServerMessage) -> Result<(), SendError> {
        let Some(conn) = self.connection(sid).await else {
            return Err(SendError::NotConnected(sid.to_string()));
        };
        if conn.write_message(msg) {
            Ok(())
        } else {
            Err(SendError::Closing(sid.to_string()))
        }
    }

    /// Every live connection handle; used by shutdown to fan out the
    /// close.
    pub async fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Install the single disconnect callback. Replaces any earlier one.
    pub async fn set_on_disconnect(&self, handler: DisconnectHandler) {
        *self.on_disconnect.write().await = Some(handler);
    }

    /// Fire the disconnect callback for a session. Called by the server
    /// exactly once per connection, after the directory entry is gone.
    pub(crate) async fn notify_disconnect(&self, sid: &str) {
        let handler = self.on_disconnect.read().await.clone();
        match handler {
            Some(handler) => handler(sid.to_string()).await,
            None => debug!(%sid, "no disconnect handler installed"),
        }
    }
}
