//! Chat records and the atomic accept primitive.

use std::collections::HashMap;

use {async_trait::async_trait, redis::AsyncCommands};

use whisper_common::now_unix;

use crate::{
    CHAT_ACTIVE_TTL_SECS, CHAT_PENDING_TTL_SECS, PENDING_CHATS_KEY,
    chat_key,
    error::StoreError,
    types::{AcceptOutcome, ChatRecord, ChatStatus},
};

/// Seconds after creation by which both peers must have accepted.
const ACCEPT_WINDOW_SECS: i64 = 15;

/// Runs entirely inside Redis so the two peers' accepts cannot interleave:
/// the second accept observes the first's flag in the same execution that
/// flips the status to active. KEYS = [chat hash, pending index];
/// ARGV = [accepting sid, active TTL, chat id].
const ACCEPT_MATCH_LUA: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('HGET', KEYS[1], 'status') ~= 'pending_accept' then
  return -2
end
local a = redis.call('HGET', KEYS[1], 'user_a')
local b = redis.call('HGET', KEYS[1], 'user_b')
local flag
if ARGV[1] == a then
  flag = 'accepted_a'
elseif ARGV[1] == b then
  flag = 'accepted_b'
else
  return -3
end
redis.call('HSET', KEYS[1], flag, '1')
if redis.call('HGET', KEYS[1], 'accepted_a') == '1'
    and redis.call('HGET', KEYS[1], 'accepted_b') == '1' then
  redis.call('HSET', KEYS[1], 'status', 'active')
  redis.call('EXPIRE', KEYS[1], ARGV[2])
  redis.call('ZREM', KEYS[2], ARGV[3])
  return 1
end
return 0
"#;

/// Two-party chat lifecycle state. The gateway reads, accepts, and deletes;
/// `create_pending` is normally the matcher's call but lives here because
/// the schema is owned by this crate.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Write a fresh `pending_accept` record for two distinct participants
    /// and index it for deadline sweeping.
    async fn create_pending(&self, chat_id: &str, user_a: &str, user_b: &str)
    -> Result<(), StoreError>;
    async fn get(&self, chat_id: &str) -> Result<Option<ChatRecord>, StoreError>;
    /// Remove the record and its pending-index entry. No-op when already
    /// gone.
    async fn delete(&self, chat_id: &str) -> Result<(), StoreError>;
    /// Record `sid`'s acceptance atomically; see [`AcceptOutcome`].
    async fn accept_match(&self, chat_id: &str, sid: &str) -> Result<AcceptOutcome, StoreError>;
}

pub struct RedisChatStore {
    manager: redis::aio::ConnectionManager,
    accept_script: redis::Script,
}

impl RedisChatStore {
    pub fn new(manager: redis::aio::ConnectionManager) -> Self {
        Self {
            manager,
            accept_script: redis::Script::new(ACCEPT_MATCH_LUA),
        }
    }
}

#[async_trait]
impl ChatStore for RedisChatStore {
    async fn create_pending(
        &self,
        chat_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<(), StoreError> {
        let key = chat_key(chat_id);
        let now = now_unix();
        let record = ChatRecord {
            chat_id: chat_id.to_string(),
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            status: ChatStatus::PendingAccept,
            created_at: now,
            accept_deadline: now + ACCEPT_WINDOW_SECS,
            accepted_a: false,
            accepted_b: false,
        };
        let mut con = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &record.to_pairs()).ignore();
        pipe.expire(&key, CHAT_PENDING_TTL_SECS).ignore();
        pipe.zadd(PENDING_CHATS_KEY, chat_id, record.accept_deadline)
            .ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn get(&self, chat_id: &str) -> Result<Option<ChatRecord>, StoreError> {
        let key = chat_key(chat_id);
        let mut con = self.manager.clone();
        let hash: HashMap<String, String> = con.hgetall(&key).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        ChatRecord::from_hash(&key, &hash).map(Some)
    }

    async fn delete(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(chat_key(chat_id)).ignore();
        pipe.zrem(PENDING_CHATS_KEY, chat_id).ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn accept_match(&self, chat_id: &str, sid: &str) -> Result<AcceptOutcome, StoreError> {
        let mut con = self.manager.clone();
        let code: i64 = self
            .accept_script
            .key(chat_key(chat_id))
            .key(PENDING_CHATS_KEY)
            .arg(sid)
            .arg(CHAT_ACTIVE_TTL_SECS)
            .arg(chat_id)
            .invoke_async(&mut con)
            .await?;
        AcceptOutcome::from_code(code)
    }
}
