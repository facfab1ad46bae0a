//! NATS adapter for cross-instance event fan-out.
//!
//! A peer's two endpoints may sit on different edge instances, so every
//! event that must reach "the instance owning session X" travels over a
//! subject addressed by session or chat id rather than through process
//! memory. The gateway keeps at most one live subscription per
//! `(session, logical channel)`; re-subscribing replaces, disconnecting
//! tears everything down.

pub mod client;
pub mod subjects;
pub mod types;

pub use {
    client::{Bus, BusClient, BusError, Channel, EventHandler},
    types::{ChatEvent, ChatEventKind, MatchCancel, MatchFound, MatchNotify, MatchNotifyKind,
        MatchRequest},
};
