//! The bus client: typed publishes plus per-session subscription tracking.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    bytes::Bytes,
    futures::{StreamExt, future::BoxFuture},
    serde::Serialize,
    tokio::{sync::Mutex, task::JoinHandle},
    tracing::{debug, warn},
};

use crate::{
    subjects,
    types::{ChatEvent, MatchCancel, MatchNotify, MatchRequest},
};

/// Callback invoked with the raw payload of each delivered message.
pub type EventHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// What the orchestrator needs from the bus: typed publishes and the
/// per-session subscription table. [`BusClient`] is the NATS
/// implementation; tests substitute an in-memory one.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish_match_request(&self, request: &MatchRequest) -> Result<(), BusError>;
    async fn publish_match_cancel(&self, cancel: &MatchCancel) -> Result<(), BusError>;
    async fn publish_match_notify(&self, sid: &str, notify: &MatchNotify)
    -> Result<(), BusError>;
    async fn publish_chat_event(&self, chat_id: &str, event: &ChatEvent) -> Result<(), BusError>;
    /// Replace-on-resubscribe: any earlier subscription for the same
    /// `(sid, channel)` is torn down before this call returns.
    async fn subscribe(
        &self,
        sid: &str,
        channel: Channel,
        subject: String,
        handler: EventHandler,
    ) -> Result<(), BusError>;
    async fn unsubscribe(&self, sid: &str, channel: Channel);
    async fn unsubscribe_all(&self, sid: &str);
}

/// The logical channels a session can hold subscriptions on. At most one
/// live subscription exists per `(session, channel)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    MatchFound,
    MatchNotify,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchFound => "match_found",
            Self::MatchNotify => "match_notify",
            Self::Chat => "chat",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(String),

    #[error("publish to {subject} failed: {detail}")]
    Publish { subject: String, detail: String },

    #[error("subscribe to {subject} failed: {detail}")]
    Subscribe { subject: String, detail: String },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

// ── Subscription table ───────────────────────────────────────────────────────

struct Subscription {
    subject: String,
    task: JoinHandle<()>,
}

/// Tracks live consumer tasks keyed by `(session, channel)`. Replacing or
/// removing an entry aborts its task, which drops the NATS subscriber and
/// with it the server-side subscription.
#[derive(Default)]
struct SubscriptionTable {
    entries: HashMap<(String, Channel), Subscription>,
}

impl SubscriptionTable {
    /// Insert, aborting any previous subscription on the same key.
    fn replace(&mut self, sid: &str, channel: Channel, sub: Subscription) {
        if let Some(old) = self.entries.insert((sid.to_string(), channel), sub) {
            debug!(%sid, channel = channel.as_str(), subject = %old.subject, "replacing subscription");
            old.task.abort();
        }
    }

    fn remove(&mut self, sid: &str, channel: Channel) {
        if let Some(sub) = self.entries.remove(&(sid.to_string(), channel)) {
            sub.task.abort();
        }
    }

    fn remove_all(&mut self, sid: &str) {
        let keys: Vec<_> = self
            .entries
            .keys()
            .filter(|(s, _)| s == sid)
            .cloned()
            .collect();
        for key in keys {
            if let Some(sub) = self.entries.remove(&key) {
                sub.task.abort();
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct BusClient {
    nats: async_nats::Client,
    subs: Mutex<SubscriptionTable>,
}

impl BusClient {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let nats = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        Ok(Self {
            nats,
            subs: Mutex::new(SubscriptionTable::default()),
        })
    }

    async fn publish<T: Serialize>(&self, subject: String, payload: &T) -> Result<(), BusError> {
        let bytes = serde_json::to_vec(payload)?;
        self.nats
            .publish(subject.clone(), bytes.into())
            .await
            .map_err(|e| BusError::Publish {
                subject,
                detail: e.to_string(),
            })
    }

    /// Live subscription count across all sessions.
    pub async fn subscription_count(&self) -> usize {
        self.subs.lock().await.len()
    }

    /// Flush buffered publishes; called on shutdown so in-flight events
    /// (partner_left fan-out in particular) reach the server.
    pub async fn drain(&self) {
        if let Err(e) = self.nats.flush().await {
            warn!(error = %e, "bus flush on shutdown failed");
        }
    }
}

#[async_trait]
impl Bus for BusClient {
    async fn publish_match_request(&self, request: &MatchRequest) -> Result<(), BusError> {
        self.publish(subjects::match_request(), request).await
    }

    async fn publish_match_cancel(&self, cancel: &MatchCancel) -> Result<(), BusError> {
        self.publish(subjects::match_cancel(), cancel).await
    }

    async fn publish_match_notify(
        &self,
        sid: &str,
        notify: &MatchNotify,
    ) -> Result<(), BusError> {
        self.publish(subjects::match_notify(sid), notify).await
    }

    async fn publish_chat_event(&self, chat_id: &str, event: &ChatEvent) -> Result<(), BusError> {
        self.publish(subjects::chat(chat_id), event).await
    }

    /// Subscribe `handler` to `subject` on behalf of a session. Any earlier
    /// subscription for the same `(sid, channel)` is torn down first; its
    /// consumer task is dead before this call returns, so a late delivery
    /// on the old subject has nothing left to invoke.
    async fn subscribe(
        &self,
        sid: &str,
        channel: Channel,
        subject: String,
        handler: EventHandler,
    ) -> Result<(), BusError> {
        let mut subscriber =
            self.nats
                .subscribe(subject.clone())
                .await
                .map_err(|e| BusError::Subscribe {
                    subject: subject.clone(),
                    detail: e.to_string(),
                })?;

        let task_subject = subject.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                handler(msg.payload).await;
            }
            debug!(subject = %task_subject, "subscription stream ended");
        });

        self.subs.lock().await.replace(sid, channel, Subscription {
            subject,
            task,
        });
        Ok(())
    }

    /// Tear down one logical channel for a session. Idempotent.
    async fn unsubscribe(&self, sid: &str, channel: Channel) {
        self.subs.lock().await.remove(sid, channel);
    }

    /// Tear down every subscription a session holds; used on disconnect.
    async fn unsubscribe_all(&self, sid: &str) {
        self.subs.lock().await.remove_all(sid);
    }
}
