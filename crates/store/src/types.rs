//! Record types and their Redis hash encodings.

use std::collections::HashMap;

use crate::error::StoreError;

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Matching,
    Chatting,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Matching => "matching",
            Self::Chatting => "chatting",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(Self::Idle),
            "matching" => Some(Self::Matching),
            "chatting" => Some(Self::Chatting),
            _ => None,
        }
    }
}

/// Durable per-session record; `session:{sid}` hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub status: SessionStatus,
    /// Empty when the session is not in a chat; `status == Chatting` iff set.
    pub chat_id: String,
    /// Edge instance currently owning the socket.
    pub server: String,
    pub interests: Vec<String>,
    pub created_at: i64,
    pub last_active: i64,
}

impl SessionRecord {
    /// Field pairs for an HSET of the full record.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.clone()),
            ("status", self.status.as_str().to_string()),
            ("chat_id", self.chat_id.clone()),
            ("server", self.server.clone()),
            ("interests", self.interests.join(",")),
            ("created_at", self.created_at.to_string()),
            ("last_active", self.last_active.to_string()),
        ]
    }

    /// Decode an HGETALL result. The caller maps an empty hash to "expired"
    /// before calling; here an empty map is corrupt.
    pub fn from_hash(key: &str, hash: &HashMap<String, String>) -> Result<Self, StoreError> {
        let field = |name: &str| -> Result<String, StoreError> {
            hash.get(name)
                .cloned()
                .ok_or_else(|| StoreError::corrupt(key, format!("missing field `{name}`")))
        };
        let status_raw = field("status")?;
        let status = SessionStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::corrupt(key, format!("bad status `{status_raw}`")))?;
        let interests = hash
            .get("interests")
            .map(|raw| split_interests(raw))
            .unwrap_or_default();
        Ok(Self {
            id: field("id")?,
            status,
            chat_id: hash.get("chat_id").cloned().unwrap_or_default(),
            server: field("server")?,
            interests,
            created_at: parse_ts(key, hash, "created_at")?,
            last_active: parse_ts(key, hash, "last_active")?,
        })
    }
}

fn split_interests(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_ts(key: &str, hash: &HashMap<String, String>, name: &str) -> Result<i64, StoreError> {
    let raw = hash
        .get(name)
        .ok_or_else(|| StoreError::corrupt(key, format!("missing field `{name}`")))?;
    raw.parse()
        .map_err(|_| StoreError::corrupt(key, format!("bad timestamp `{name}`: {raw}")))
}

// ── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    PendingAccept,
    Active,
    Ended,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAccept => "pending_accept",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending_accept" => Some(Self::PendingAccept),
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

/// Two-party chat record; `chat:{chat_id}` hash. Participant order is fixed
/// at creation and never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub chat_id: String,
    pub user_a: String,
    pub user_b: String,
    pub status: ChatStatus,
    pub created_at: i64,
    pub accept_deadline: i64,
    pub accepted_a: bool,
    pub accepted_b: bool,
}

impl ChatRecord {
    pub fn is_participant(&self, sid: &str) -> bool {
        self.user_a == sid || self.user_b == sid
    }

    /// The other participant, if `sid` is one of the two.
    pub fn partner_of(&self, sid: &str) -> Option<&str> {
        if self.user_a == sid {
            Some(&self.user_b)
        } else if self.user_b == sid {
            Some(&self.user_a)
        } else {
            None
        }
    }

    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("chat_id", self.chat_id.clone()),
            ("user_a", self.user_a.clone()),
            ("user_b", self.user_b.clone()),
            ("status", self.status.as_str().to_string()),
            ("created_at", self.created_at.to_string()),
            ("accept_deadline", self.accept_deadline.to_string()),
            ("accepted_a", flag(self.accepted_a)),
            ("accepted_b", flag(self.accepted_b)),
        ]
    }

    pub fn from_hash(key: &str, hash: &HashMap<String, String>) -> Result<Self, StoreError> {
        let field = |name: &str| -> Result<String, StoreError> {
            hash.get(name)
                .cloned()
                .ok_or_else(|| StoreError::corrupt(key, format!("missing field `{name}`")))
        };
        let status_raw = field("status")?;
        let status = ChatStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::corrupt(key, format!("bad status `{status_raw}`")))?;
        Ok(Self {
            chat_id: field("chat_id")?,
            user_a: field("user_a")?,
            user_b: field("user_b")?,
            status,
            created_at: parse_ts(key, hash, "created_at")?,
            accept_deadline: parse_ts(key, hash, "accept_deadline")?,
            accepted_a: hash.get("accepted_a").map(|v| v == "1").unwrap_or(false),
            accepted_b: hash.get("accepted_b").map(|v| v == "1").unwrap_or(false),
        })
    }
}

fn flag(v: bool) -> String {
    if v { "1".into() } else { "0".into() }
}

// ── Accept outcome ───────────────────────────────────────────────────────────

/// Result of the atomic accept script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Both sides have now accepted; the chat just became active.
    Completed,
    /// This side accepted first; waiting on the partner.
    Waiting,
    /// No such chat (expired or never existed).
    NotFound,
    /// Chat exists but is no longer pending acceptance.
    NotPending,
    /// The accepting session is not a participant.
    NotParticipant,
}

impl AcceptOutcome {
    pub fn from_code(code: i64) -> Result<Self, StoreError> {
        match code {
            1 => Ok(Self::Completed),
            0 => Ok(Self::Waiting),
            -1 => Ok(Self::NotFound),
            -2 => Ok(Self::NotPending),
            -3 => Ok(Self::NotParticipant),
            other => Err(StoreError::UnknownAcceptCode(other)),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn chat_hash() -> HashMap<String, String> {
        ChatRecord {
            chat_id: "c1".into(),
            user_a: "a".into(),
            user_b: "b".into(),
            status: ChatStatus::PendingAccept,
            created_at: 1000,
            accept_deadline: 1015,
            accepted_a: false,
            accepted_b: true,
        }
        .to_pairs()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn session_record_round_trips_through_hash() {
        let record = SessionRecord {
            id: "s1".into(),
            status: SessionStatus::Matching,
            chat_id: String::new(),
            server: "edge-1".into(),
            interests: vec!["music".into(), "gaming".into()],
            created_at: 1000,
            last_active: 1010,
        };
        let hash: HashMap<String, String> = record
            .to_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(hash["interests"], "music,gaming");
        assert_eq!(SessionRecord::from_hash("session:s1", &hash).unwrap(), record);
    }

    #[test]
    fn empty_interests_decode_to_empty_vec() {
        let hash: HashMap<String, String> = SessionRecord {
            id: "s1".into(),
            status: SessionStatus::Idle,
            chat_id: String::new(),
            server: "edge-1".into(),
            interests: vec![],
            created_at: 1,
            last_active: 1,
        }
        .to_pairs()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let record = SessionRecord::from_hash("session:s1", &hash).unwrap();
        assert!(record.interests.is_empty());
    }

    #[test]
    fn chat_record_round_trips_and_knows_partners() {
        let hash = chat_hash();
        let record = ChatRecord::from_hash("chat:c1", &hash).unwrap();
        assert_eq!(record.partner_of("a"), Some("b"));
        assert_eq!(record.partner_of("b"), Some("a"));
        assert_eq!(record.partner_of("z"), None);
        assert!(record.is_participant("a"));
        assert!(!record.accepted_a);
        assert!(record.accepted_b);
    }

    #[test]
    fn corrupt_hashes_are_rejected() {
        let mut hash = chat_hash();
        hash.remove("user_b");
        assert!(matches!(
            ChatRecord::from_hash("chat:c1", &hash),
            Err(StoreError::Corrupt { .. })
        ));

        let mut hash = chat_hash();
        hash.insert("status".into(), "limbo".into());
        assert!(matches!(
            ChatRecord::from_hash("chat:c1", &hash),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn accept_codes_decode_per_contract() {
        assert_eq!(AcceptOutcome::from_code(1).unwrap(), AcceptOutcome::Completed);
        assert_eq!(AcceptOutcome::from_code(0).unwrap(), AcceptOutcome::Waiting);
        assert_eq!(AcceptOutcome::from_code(-1).unwrap(), AcceptOutcome::NotFound);
        assert_eq!(AcceptOutcome::from_code(-2).unwrap(), AcceptOutcome::NotPending);
        assert_eq!(
            AcceptOutcome::from_code(-3).unwrap(),
            AcceptOutcome::NotParticipant
        );
        assert!(AcceptOutcome::from_code(7).is_err());
    }
}
