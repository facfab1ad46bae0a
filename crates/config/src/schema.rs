//! Gateway configuration schema. Every field has a default so a bare
//! `whisper.toml` (or none at all) yields a runnable edge instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket address the WebSocket listener binds to.
    pub listen_addr: String,
    /// Number of workers draining the inbound frame queue.
    pub worker_pool_size: usize,
    /// Admission cap; sockets beyond this are refused with 503.
    pub max_connections: usize,
    /// Seconds without any inbound frame before a socket is closed.
    pub read_timeout_secs: u64,
    /// Per-frame outbound write deadline in seconds.
    pub write_timeout_secs: u64,
    /// Seconds between server-initiated WebSocket pings.
    pub ping_interval_secs: u64,
    /// Edge-instance identity stored on each session record. Empty means
    /// "use the machine hostname".
    pub server_name: String,
    /// NATS endpoint for cross-instance event fan-out.
    pub bus_url: String,
    /// Redis endpoint holding session and chat records.
    pub kv_addr: String,
    /// Per-connection outbound queue depth; overflow closes the socket.
    pub outbound_queue: usize,
    /// Shared inbound work queue depth; overflow back-pressures read loops.
    pub inbound_queue: usize,
    /// Seconds to drain live connections on shutdown before hard-closing.
    pub shutdown_grace_secs: u64,
    /// Deadline in seconds for individual store operations.
    pub store_op_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            worker_pool_size: 256,
            max_connections: 100_000,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            ping_interval_secs: 25,
            server_name: String::new(),
            bus_url: "nats://127.0.0.1:4222".into(),
            kv_addr: "redis://127.0.0.1:6379".into(),
            outbound_queue: 64,
            inbound_queue: 4096,
            shutdown_grace_secs: 30,
            store_op_timeout_secs: 5,
        }
    }
}

impl GatewayConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn store_op_timeout(&self) -> Duration {
        Duration::from_secs(self.store_op_timeout_secs)
    }

    /// The identity written to `session.server`: the configured name, or
    /// the machine hostname when unset.
    pub fn resolved_server_name(&self) -> String {
        if !self.server_name.is_empty() {
            return self.server_name.clone();
        }
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "whisper-edge".into())
    }
}
