//! Wire protocol for the whisper edge gateway.
//!
//! All traffic is single JSON objects over WebSocket text frames, tagged by
//! a `type` discriminator:
//! - [`ClientMessage`] — browser → gateway
//! - [`ServerMessage`] — gateway → browser
//!
//! Unknown inbound types are dropped by the dispatcher; malformed JSON
//! closes the socket. [`decode_client`] tells the two cases apart.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Maximum size of a single inbound frame.
pub const MAX_FRAME_BYTES: usize = 4096;
/// Maximum byte length of a chat message body.
pub const MAX_MESSAGE_BYTES: usize = 4096;
/// Maximum character count of a chat message body.
pub const MAX_MESSAGE_CHARS: usize = 2000;
/// Interests are capped per session; extras are silently dropped.
pub const MAX_INTERESTS: usize = 5;
/// Seconds a queued match request waits before the matcher times it out.
pub const MATCH_TIMEOUT_SECS: u64 = 30;
/// Seconds both peers have to accept a proposed match.
pub const ACCEPT_DEADLINE_SECS: i64 = 15;

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    /// Message content failed validation (empty or too long).
    pub const INVALID_MESSAGE: &str = "invalid_message";
    /// Chat missing, not active, or the sender is not a participant.
    pub const INVALID_CHAT: &str = "invalid_chat";
    /// Frame had a recognized shape but an unusable payload.
    pub const BAD_MESSAGE: &str = "bad_message";
    /// Transient external failure; the client may retry.
    pub const SERVER_ERROR: &str = "server_error";
    /// Socket closed because the outbound queue overflowed.
    pub const SLOW_CONSUMER: &str = "slow_consumer";
}

// ── Inbound frames ───────────────────────────────────────────────────────────

/// Browser → gateway messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the matching queue.
    FindMatch {
        #[serde(default)]
        interests: Vec<String>,
    },
    /// Leave the matching queue.
    CancelMatch,
    /// Accept a proposed match.
    AcceptMatch { chat_id: String },
    /// Decline a proposed match.
    DeclineMatch { chat_id: String },
    /// Chat text to the partner.
    Message { chat_id: String, text: String },
    /// Typing indicator, best-effort.
    Typing { chat_id: String, is_typing: bool },
    /// Terminate the active chat.
    EndChat { chat_id: String },
    /// Report the partner; forwarded to moderation out of band.
    Report { chat_id: String, reason: String },
    /// Heartbeat probe.
    Ping,
}

impl ClientMessage {
    /// Every recognized `type` tag, used to distinguish an unknown type
    /// (dropped) from a malformed frame (socket closed).
    pub const TYPES: &'static [&'static str] = &[
        "find_match",
        "cancel_match",
        "accept_match",
        "decline_match",
        "message",
        "typing",
        "end_chat",
        "report",
        "ping",
    ];

    /// The `type` tag this message serializes with.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::FindMatch { .. } => "find_match",
            Self::CancelMatch => "cancel_match",
            Self::AcceptMatch { .. } => "accept_match",
            Self::DeclineMatch { .. } => "decline_match",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::EndChat { .. } => "end_chat",
            Self::Report { .. } => "report",
            Self::Ping => "ping",
        }
    }
}

// ── Outbound frames ──────────────────────────────────────────────────────────

/// Gateway → browser messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Emitted once, immediately after the socket is accepted.
    SessionCreated { session_id: String },
    /// Acknowledges queue entry; `timeout` in seconds.
    MatchingStarted { timeout: u64 },
    /// A pending match proposal.
    MatchFound {
        chat_id: String,
        shared_interests: Vec<String>,
        accept_deadline: i64,
    },
    /// Both sides accepted; the chat is active.
    MatchAccepted { chat_id: String },
    MatchDeclined,
    MatchTimeout,
    /// Chat text relayed from the partner.
    Message { from: String, text: String, ts: i64 },
    Typing { is_typing: bool },
    PartnerLeft,
    RateLimited { retry_after: u64 },
    Banned { duration: u64, reason: String },
    Error { code: String, message: String },
    Pong,
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Relay a partner's chat line; `from` is always the literal "partner"
    /// on the wire, never the peer's session id.
    pub fn partner_message(text: impl Into<String>, ts: i64) -> Self {
        Self::Message {
            from: "partner".into(),
            text: text.into(),
            ts,
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────────────

/// Why an inbound frame failed to decode. The three cases get three
/// different treatments: close the socket, drop the frame, or answer
/// `error{bad_message}`.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not a JSON object with a string `type` field. Protocol violation;
    /// the socket is closed.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Well-formed envelope with a `type` this server does not recognize.
    /// Dropped silently for forward compatibility.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// Recognized `type` whose payload fields are missing or mistyped.
    /// Answered with `error{bad_message}`.
    #[error("bad `{type_tag}` payload: {detail}")]
    BadPayload { type_tag: String, detail: String },
}

/// Decode an inbound text frame into a [`ClientMessage`].
pub fn decode_client(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| DecodeError::Malformed("missing `type` field".into()))?;
    if !ClientMessage::TYPES.contains(&tag) {
        return Err(DecodeError::UnknownType(tag.to_string()));
    }
    let type_tag = tag.to_string();
    serde_json::from_value(value).map_err(|e| DecodeError::BadPayload {
        type_tag,
        detail: e.to_string(),
    })
}

// ── Content validation ───────────────────────────────────────────────────────

/// Why a chat message body was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MessageViolation {
    #[error("message is empty")]
    Empty,
    #[error("message is {0} bytes, limit {MAX_MESSAGE_BYTES}")]
    TooManyBytes(usize),
    #[error("message is {0} characters, limit {MAX_MESSAGE_CHARS}")]
    TooManyChars(usize),
}

/// Validate a chat message body. UTF-8 validity is guaranteed by the frame
/// decoder (`&str` cannot hold invalid UTF-8), so only emptiness and the
/// byte/character limits are checked here.
pub fn validate_message(text: &str) -> Result<(), MessageViolation> {
    if text.is_empty() {
        return Err(MessageViolation::Empty);
    }
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(MessageViolation::TooManyBytes(text.len()));
    }
    let chars = text.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(MessageViolation::TooManyChars(chars));
    }
    Ok(())
}

/// Normalize a client-supplied interest list: trim, lowercase, drop empties,
/// dedupe preserving first occurrence, cap at [`MAX_INTERESTS`].
pub fn normalize_interests(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
        if out.len() == MAX_INTERESTS {
            break;
        }
    }
    out
}
