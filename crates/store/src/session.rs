//! Session records: durable presence state for anonymous users.

use std::collections::HashMap;

use {async_trait::async_trait, redis::AsyncCommands, tracing::debug};

use whisper_common::now_unix;

use crate::{
    SESSION_TTL_SECS,
    error::StoreError,
    session_key,
    types::{SessionRecord, SessionStatus},
};

/// Authoritative per-session state shared across edge instances. Every
/// write refreshes the record TTL; reads treat a missing key as "session
/// expired" rather than an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Initialize the record for a freshly accepted socket. Idempotent:
    /// an existing record is left as-is apart from a TTL refresh.
    async fn create(&self, sid: &str) -> Result<(), StoreError>;
    async fn get(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError>;
    async fn update_status(&self, sid: &str, status: SessionStatus) -> Result<(), StoreError>;
    async fn set_interests(&self, sid: &str, interests: &[String]) -> Result<(), StoreError>;
    /// Attach the session to a chat; implies `status = chatting`.
    async fn set_chat_id(&self, sid: &str, chat_id: &str) -> Result<(), StoreError>;
    /// Detach the session from its chat; implies `status = idle`.
    async fn clear_chat_id(&self, sid: &str) -> Result<(), StoreError>;
    async fn refresh_ttl(&self, sid: &str) -> Result<(), StoreError>;
    async fn delete(&self, sid: &str) -> Result<(), StoreError>;
}

pub struct RedisSessionStore {
    manager: redis::aio::ConnectionManager,
    server_name: String,
}

impl RedisSessionStore {
    pub fn new(manager: redis::aio::ConnectionManager, server_name: impl Into<String>) -> Self {
        Self {
            manager,
            server_name: server_name.into(),
        }
    }

    /// HSET the given fields plus `last_active`, refreshing the TTL, as one
    /// atomic round trip.
    async fn write_fields(&self, sid: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        let key = session_key(sid);
        let mut con = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, fields).ignore();
        pipe.hset(&key, "last_active", now_unix().to_string()).ignore();
        pipe.expire(&key, SESSION_TTL_SECS).ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, sid: &str) -> Result<(), StoreError> {
        let key = session_key(sid);
        let mut con = self.manager.clone();
        let exists: bool = con.exists(&key).await?;
        if exists {
            debug!(%sid, "session already present, refreshing ttl");
            return self.refresh_ttl(sid).await;
        }
        let now = now_unix();
        let record = SessionRecord {
            id: sid.to_string(),
            status: SessionStatus::Idle,
            chat_id: String::new(),
            server: self.server_name.clone(),
            interests: vec![],
            created_at: now,
            last_active: now,
        };
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset_multiple(&key, &record.to_pairs()).ignore();
        pipe.expire(&key, SESSION_TTL_SECS).ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn get(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError> {
        let key = session_key(sid);
        let mut con = self.manager.clone();
        let hash: HashMap<String, String> = con.hgetall(&key).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        SessionRecord::from_hash(&key, &hash).map(Some)
    }

    async fn update_status(&self, sid: &str, status: SessionStatus) -> Result<(), StoreError> {
        self.write_fields(sid, &[("status", status.as_str().to_string())])
            .await
    }

    async fn set_interests(&self, sid: &str, interests: &[String]) -> Result<(), StoreError> {
        self.write_fields(sid, &[("interests", interests.join(","))])
            .await
    }

    async fn set_chat_id(&self, sid: &str, chat_id: &str) -> Result<(), StoreError> {
        self.write_fields(sid, &[
            ("chat_id", chat_id.to_string()),
            ("status", SessionStatus::Chatting.as_str().to_string()),
        ])
        .await
    }

    async fn clear_chat_id(&self, sid: &str) -> Result<(), StoreError> {
        self.write_fields(sid, &[
            ("chat_id", String::new()),
            ("status", SessionStatus::Idle.as_str().to_string()),
        ])
        .await
    }

    async fn refresh_ttl(&self, sid: &str) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: bool = con.expire(session_key(sid), SESSION_TTL_SECS).await?;
        Ok(())
    }

    async fn delete(&self, sid: &str) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        let _: i64 = con.del(session_key(sid)).await?;
        Ok(())
    }
}
