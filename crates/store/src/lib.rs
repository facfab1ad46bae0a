//! Redis-backed session and chat storage for the whisper edge fleet.
//!
//! The store is the authoritative cross-instance view: `session:{sid}` and
//! `chat:{chat_id}` hashes with per-key TTLs, plus the `match:pending_chats`
//! sorted set the matcher sweeps for expired proposals. The one operation
//! whose correctness the fleet depends on — recording a match acceptance —
//! runs as a server-side Lua script so the check-then-set is indivisible.

pub mod chat;
pub mod error;
pub mod session;
pub mod types;

pub use {
    chat::{ChatStore, RedisChatStore},
    error::StoreError,
    session::{RedisSessionStore, SessionStore},
    types::{AcceptOutcome, ChatRecord, ChatStatus, SessionRecord, SessionStatus},
};

/// Session records live an hour; every write refreshes this.
pub const SESSION_TTL_SECS: i64 = 3600;
/// A proposed chat must be accepted within its 60 s window.
pub const CHAT_PENDING_TTL_SECS: i64 = 60;
/// Once active, a chat record survives two hours.
pub const CHAT_ACTIVE_TTL_SECS: i64 = 7200;

pub(crate) fn session_key(sid: &str) -> String {
    format!("session:{sid}")
}

pub(crate) fn chat_key(chat_id: &str) -> String {
    format!("chat:{chat_id}")
}

/// Sorted set of pending chat ids scored by accept deadline.
pub(crate) const PENDING_CHATS_KEY: &str = "match:pending_chats";
