//! Payload shapes for each subject. All are small JSON objects; consumers
//! tolerate duplicates (at-least-once delivery) by re-checking state.

use serde::{Deserialize, Serialize};

/// `match.request` — published by the gateway, consumed by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub session_id: String,
    pub interests: Vec<String>,
}

/// `match.cancel` — published by the gateway, consumed by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCancel {
    pub session_id: String,
}

/// `match.found.{sid}` — the matcher's verdict on a queued request. When
/// `timeout` is true no chat was created and `chat_id` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFound {
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub shared_interests: Vec<String>,
    #[serde(default)]
    pub accept_deadline: i64,
    #[serde(default)]
    pub timeout: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchNotifyKind {
    Accepted,
    Declined,
    TimedOut,
}

/// `match.notify.{sid}` — how the proposal ended for the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchNotify {
    #[serde(rename = "type")]
    pub kind: MatchNotifyKind,
    pub chat_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEventKind {
    Message,
    Typing,
    PartnerLeft,
}

/// `chat.{chat_id}` — live chat traffic. `from` is the sender's session id;
/// each subscriber drops its own echoes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: ChatEventKind,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl ChatEvent {
    pub fn message(from: impl Into<String>, text: impl Into<String>, ts: i64) -> Self {
        Self {
            kind: ChatEventKind::Message,
            from: from.into(),
            text: Some(text.into()),
            is_typing: None,
            ts: Some(ts),
        }
    }

    pub fn typing(from: impl Into<String>, is_typing: bool) -> Self {
        Self {
            kind: ChatEventKind::Typing,
            from: from.into(),
            text: None,
            is_typing: Some(is_typing),
            ts: None,
        }
    }

    pub fn partner_left(from: impl Into<String>) -> Self {
        Self {
            kind: ChatEventKind::PartnerLeft,
            from: from.into(),
            text: None,
            is_typing: None,
            ts: None,
        }
    }
}
