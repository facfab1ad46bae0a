//! The whisper edge gateway: WebSocket termination, per-connection loops,
//! bounded frame dispatch, and the protocol state machine that walks a
//! session from idle through matching and acceptance into a live chat.

pub mod connection;
pub mod dispatch;
pub mod orchestrator;
pub mod server;
pub mod state;

pub use {
    connection::ConnectionHandle,
    dispatch::{Dispatcher, WorkerPool},
    orchestrator::Orchestrator,
    state::{GatewayState, SendError},
};
