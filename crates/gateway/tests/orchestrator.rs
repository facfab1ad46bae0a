//! End-to-end protocol scenarios against in-memory store and bus fakes.
//! Two connections share one gateway instance here; the cross-instance
//! variant exercises the same code because every fan-out already goes
//! through the bus.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use {
    whisper_bus::{
        Bus, BusError, Channel, ChatEvent, EventHandler, MatchCancel, MatchFound, MatchNotify,
        MatchRequest, subjects,
    },
    whisper_common::now_unix,
    whisper_config::GatewayConfig,
    whisper_gateway::{ConnectionHandle, GatewayState, Orchestrator},
    whisper_protocol::ServerMessage,
    whisper_store::{
        AcceptOutcome, ChatRecord, ChatStatus, ChatStore, SessionRecord, SessionStatus,
        SessionStore, StoreError,
    },
};

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    fn status_of(&self, sid: &str) -> Option<SessionStatus> {
        self.records.lock().unwrap().get(sid).map(|r| r.status)
    }

    fn chat_of(&self, sid: &str) -> Option<String> {
        self.records.lock().unwrap().get(sid).map(|r| r.chat_id.clone())
    }

    fn update<F: FnOnce(&mut SessionRecord)>(&self, sid: &str, f: F) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(sid)
            .ok_or_else(|| StoreError::corrupt(sid, "missing session"))?;
        f(record);
        record.last_active = now_unix();
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, sid: &str) -> Result<(), StoreError> {
        let now = now_unix();
        self.records
            .lock()
            .unwrap()
            .entry(sid.to_string())
            .or_insert(SessionRecord {
                id: sid.to_string(),
                status: SessionStatus::Idle,
                chat_id: String::new(),
                server: "edge-test".into(),
                interests: vec![],
                created_at: now,
                last_active: now,
            });
        Ok(())
    }

    async fn get(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.lock().unwrap().get(sid).cloned())
    }

    async fn update_status(&self, sid: &str, status: SessionStatus) -> Result<(), StoreError> {
        self.update(sid, |r| r.status = status)
    }

    async fn set_interests(&self, sid: &str, interests: &[String]) -> Result<(), StoreError> {
        let interests = interests.to_vec();
        self.update(sid, |r| r.interests = interests)
    }

    async fn set_chat_id(&self, sid: &str, chat_id: &str) -> Result<(), StoreError> {
        let chat_id = chat_id.to_string();
        self.update(sid, |r| {
            r.chat_id = chat_id;
            r.status = SessionStatus::Chatting;
        })
    }

    async fn clear_chat_id(&self, sid: &str) -> Result<(), StoreError> {
        self.update(sid, |r| {
            r.chat_id.clear();
            r.status = SessionStatus::Idle;
        })
    }

    async fn refresh_ttl(&self, _sid: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, sid: &str) -> Result<(), StoreError> {
        self.records.lock().unwrap().remove(sid);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryChatStore {
    records: Mutex<HashMap<String, ChatRecord>>,
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_pending(
        &self,
        chat_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<(), StoreError> {
        let now = now_unix();
        self.records.lock().unwrap().insert(chat_id.to_string(), ChatRecord {
            chat_id: chat_id.to_string(),
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            status: ChatStatus::PendingAccept,
            created_at: now,
            accept_deadline: now + 15,
            accepted_a: false,
            accepted_b: false,
        });
        Ok(())
    }

    async fn get(&self, chat_id: &str) -> Result<Option<ChatRecord>, StoreError> {
        Ok(self.records.lock().unwrap().get(chat_id).cloned())
    }

    async fn delete(&self, chat_id: &str) -> Result<(), StoreError> {
        self.records.lock().unwrap().remove(chat_id);
        Ok(())
    }

    // Mirrors the Lua script: the whole check-then-set happens under one
    // lock acquisition.
    async fn accept_match(&self, chat_id: &str, sid: &str) -> Result<AcceptOutcome, StoreError> {
        let mut records = self.records.lock().unwrap();
        let Some(chat) = records.get_mut(chat_id) else {
            return Ok(AcceptOutcome::NotFound);
        };
        if chat.status != ChatStatus::PendingAccept {
            return Ok(AcceptOutcome::NotPending);
        }
        if chat.user_a == sid {
            chat.accepted_a = true;
        } else if chat.user_b == sid {
            chat.accepted_b = true;
        } else {
            return Ok(AcceptOutcome::NotParticipant);
        }
        if chat.accepted_a && chat.accepted_b {
            chat.status = ChatStatus::Active;
            Ok(AcceptOutcome::Completed)
        } else {
            Ok(AcceptOutcome::Waiting)
        }
    }
}

/// In-memory bus: subscriptions are invoked inline on publish, so a test
/// observes the full fan-out synchronously.
#[derive(Default)]
struct MemoryBus {
    subs: Mutex<HashMap<(String, Channel), (String, EventHandler)>>,
    match_requests: Mutex<Vec<MatchRequest>>,
    match_cancels: Mutex<Vec<MatchCancel>>,
    chat_events: Mutex<Vec<(String, ChatEvent)>>,
}

impl MemoryBus {
    async fn deliver(&self, subject: &str, payload: Vec<u8>) {
        let handlers: Vec<EventHandler> = self
            .subs
            .lock()
            .unwrap()
            .values()
            .filter(|(s, _)| s == subject)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone().into()).await;
        }
    }

    async fn deliver_json<T: serde::Serialize>(&self, subject: &str, payload: &T) {
        self.deliver(subject, serde_json::to_vec(payload).unwrap())
            .await;
    }

    fn subscribed(&self, sid: &str, channel: Channel) -> bool {
        self.subs
            .lock()
            .unwrap()
            .contains_key(&(sid.to_string(), channel))
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish_match_request(&self, request: &MatchRequest) -> Result<(), BusError> {
        self.match_requests.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn publish_match_cancel(&self, cancel: &MatchCancel) -> Result<(), BusError> {
        self.match_cancels.lock().unwrap().push(cancel.clone());
        Ok(())
    }

    async fn publish_match_notify(
        &self,
        sid: &str,
        notify: &MatchNotify,
    ) -> Result<(), BusError> {
        self.deliver_json(&subjects::match_notify(sid), notify).await;
        Ok(())
    }

    async fn publish_chat_event(&self, chat_id: &str, event: &ChatEvent) -> Result<(), BusError> {
        self.chat_events
            .lock()
            .unwrap()
            .push((chat_id.to_string(), event.clone()));
        self.deliver_json(&subjects::chat(chat_id), event).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        sid: &str,
        channel: Channel,
        subject: String,
        handler: EventHandler,
    ) -> Result<(), BusError> {
        self.subs
            .lock()
            .unwrap()
            .insert((sid.to_string(), channel), (subject, handler));
        Ok(())
    }

    async fn unsubscribe(&self, sid: &str, channel: Channel) {
        self.subs
            .lock()
            .unwrap()
            .remove(&(sid.to_string(), channel));
    }

    async fn unsubscribe_all(&self, sid: &str) {
        self.subs
            .lock()
            .unwrap()
            .retain(|(s, _), _| s != sid);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    state: Arc<GatewayState>,
    orch: Arc<Orchestrator>,
    sessions: Arc<MemorySessionStore>,
    chats: Arc<MemoryChatStore>,
    bus: Arc<MemoryBus>,
}

impl Harness {
    fn new() -> Self {
        let state = GatewayState::new(GatewayConfig {
            server_name: "edge-test".into(),
            ..Default::default()
        });
        let sessions = Arc::new(MemorySessionStore::default());
        let chats = Arc::new(MemoryChatStore::default());
        let bus = Arc::new(MemoryBus::default());
        let orch = Orchestrator::new(
            Arc::clone(&state),
            sessions.clone(),
            chats.clone(),
            bus.clone(),
        );
        Self {
            state,
            orch,
            sessions,
            chats,
            bus,
        }
    }

    async fn connect(
        &self,
        sid: &str,
    ) -> (
        Arc<ConnectionHandle>,
        tokio::sync::mpsc::Receiver<ServerMessage>,
    ) {
        let (conn, rx) = ConnectionHandle::new(sid.to_string(), 64);
        self.state.register_connection(conn.clone()).await;
        self.sessions.create(sid).await.unwrap();
        (conn, rx)
    }

    /// Put a session through find_match and deliver the matcher's proposal.
    async fn propose_match(
        &self,
        conn: &Arc<ConnectionHandle>,
        chat_id: &str,
        interests: &[&str],
    ) {
        let sid = conn.sid().to_string();
        self.orch
            .handle_find_match(
                conn.clone(),
                interests.iter().map(|s| s.to_string()).collect(),
            )
            .await;
        self.bus
            .deliver_json(&subjects::match_found(&sid), &MatchFound {
                chat_id: chat_id.to_string(),
                shared_interests: interests.iter().map(|s| s.to_string()).collect(),
                accept_deadline: now_unix() + 15,
                timeout: false,
            })
            .await;
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_peers_match_chat_and_part() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;
    let (conn_b, mut rx_b) = h.connect("b").await;

    // Both enter the queue.
    h.orch
        .handle_find_match(conn_a.clone(), vec!["Music".into(), "gaming".into()])
        .await;
    h.orch
        .handle_find_match(conn_b.clone(), vec!["music".into(), "gaming".into()])
        .await;
    assert_eq!(drain(&mut rx_a), vec![ServerMessage::MatchingStarted {
        timeout: 30
    }]);
    assert_eq!(drain(&mut rx_b), vec![ServerMessage::MatchingStarted {
        timeout: 30
    }]);
    assert_eq!(h.bus.match_requests.lock().unwrap().len(), 2);
    assert_eq!(h.sessions.status_of("a"), Some(SessionStatus::Matching));

    // The matcher pairs them up.
    h.chats.create_pending("x", "a", "b").await.unwrap();
    let deadline = now_unix() + 15;
    for sid in ["a", "b"] {
        h.bus
            .deliver_json(&subjects::match_found(sid), &MatchFound {
                chat_id: "x".into(),
                shared_interests: vec!["music".into(), "gaming".into()],
                accept_deadline: deadline,
                timeout: false,
            })
            .await;
    }
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerMessage::MatchFound { chat_id, .. }] if chat_id == "x"
    ));
    assert!(matches!(
        drain(&mut rx_b).as_slice(),
        [ServerMessage::MatchFound { chat_id, .. }] if chat_id == "x"
    ));

    // First accept is silent.
    h.orch.handle_accept_match(conn_a.clone(), "x".into()).await;
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());

    // Second accept activates the chat for both sides.
    h.orch.handle_accept_match(conn_b.clone(), "x".into()).await;
    assert_eq!(drain(&mut rx_b), vec![ServerMessage::MatchAccepted {
        chat_id: "x".into()
    }]);
    assert_eq!(drain(&mut rx_a), vec![ServerMessage::MatchAccepted {
        chat_id: "x".into()
    }]);
    let chat = h.chats.get("x").await.unwrap().unwrap();
    assert_eq!(chat.status, ChatStatus::Active);
    assert!(chat.accepted_a && chat.accepted_b);
    assert_eq!(h.sessions.chat_of("a").as_deref(), Some("x"));
    assert_eq!(h.sessions.status_of("b"), Some(SessionStatus::Chatting));

    // A line of chat reaches only the partner.
    h.orch
        .handle_message(conn_a.clone(), "x".into(), "hi".into())
        .await;
    assert!(matches!(
        drain(&mut rx_b).as_slice(),
        [ServerMessage::Message { from, text, .. }] if from == "partner" && text == "hi"
    ));
    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(h.orch.recent_history("x").len(), 2); // sender + receiver side

    // B hangs up; A hears partner_left and both go idle.
    h.orch.handle_end_chat(conn_b.clone(), "x".into()).await;
    assert_eq!(drain(&mut rx_a), vec![ServerMessage::PartnerLeft]);
    assert!(h.chats.get("x").await.unwrap().is_none());
    assert_eq!(h.sessions.status_of("a"), Some(SessionStatus::Idle));
    assert_eq!(h.sessions.status_of("b"), Some(SessionStatus::Idle));
    assert_eq!(h.sessions.chat_of("a").as_deref(), Some(""));
    assert!(h.orch.recent_history("x").is_empty());
}

#[tokio::test]
async fn decline_tears_the_proposal_down_for_both() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;
    let (conn_b, mut rx_b) = h.connect("b").await;

    h.chats.create_pending("x", "a", "b").await.unwrap();
    h.propose_match(&conn_a, "x", &["music"]).await;
    h.propose_match(&conn_b, "x", &["music"]).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    h.orch
        .handle_decline_match(conn_a.clone(), "x".into())
        .await;
    assert!(h.chats.get("x").await.unwrap().is_none());
    assert_eq!(drain(&mut rx_b), vec![ServerMessage::MatchDeclined]);
    assert_eq!(h.sessions.status_of("a"), Some(SessionStatus::Idle));
    assert_eq!(h.sessions.status_of("b"), Some(SessionStatus::Idle));

    // A duplicate decline finds nothing and changes nothing.
    h.orch
        .handle_decline_match(conn_a.clone(), "x".into())
        .await;
    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn cancel_unsubscribes_before_a_late_result_lands() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;

    h.orch
        .handle_find_match(conn_a.clone(), vec!["music".into()])
        .await;
    drain(&mut rx_a);
    assert!(h.bus.subscribed("a", Channel::MatchFound));

    h.orch.handle_cancel_match(conn_a.clone()).await;
    assert_eq!(h.bus.match_cancels.lock().unwrap().len(), 1);
    assert_eq!(h.sessions.status_of("a"), Some(SessionStatus::Idle));
    assert!(!h.bus.subscribed("a", Channel::MatchFound));

    // The bus delivers a match anyway; nobody is listening.
    h.bus
        .deliver_json(&subjects::match_found("a"), &MatchFound {
            chat_id: "x".into(),
            shared_interests: vec![],
            accept_deadline: now_unix() + 15,
            timeout: false,
        })
        .await;
    assert!(drain(&mut rx_a).is_empty());
}

#[tokio::test]
async fn queue_timeout_resets_the_session() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;

    h.orch
        .handle_find_match(conn_a.clone(), vec!["music".into()])
        .await;
    drain(&mut rx_a);

    h.bus
        .deliver_json(&subjects::match_found("a"), &MatchFound {
            chat_id: String::new(),
            shared_interests: vec![],
            accept_deadline: 0,
            timeout: true,
        })
        .await;
    assert_eq!(drain(&mut rx_a), vec![ServerMessage::MatchTimeout]);
    assert_eq!(h.sessions.status_of("a"), Some(SessionStatus::Idle));
}

#[tokio::test]
async fn invalid_message_never_reaches_the_bus() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;

    h.chats.create_pending("x", "a", "b").await.unwrap();
    h.chats.accept_match("x", "a").await.unwrap();
    h.chats.accept_match("x", "b").await.unwrap();

    h.orch
        .handle_message(conn_a.clone(), "x".into(), String::new())
        .await;
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerMessage::Error { code, .. }] if code == "invalid_message"
    ));
    assert!(h.bus.chat_events.lock().unwrap().is_empty());

    // Oversized content is rejected the same way.
    h.orch
        .handle_message(conn_a.clone(), "x".into(), "a".repeat(4097))
        .await;
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerMessage::Error { code, .. }] if code == "invalid_message"
    ));
    assert!(h.bus.chat_events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn message_to_a_pending_chat_is_invalid() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;

    h.chats.create_pending("x", "a", "b").await.unwrap();
    h.orch
        .handle_message(conn_a.clone(), "x".into(), "hello".into())
        .await;
    assert!(matches!(
        drain(&mut rx_a).as_slice(),
        [ServerMessage::Error { code, .. }] if code == "invalid_chat"
    ));

    // Non-participants are rejected identically.
    let (conn_c, mut rx_c) = h.connect("c").await;
    h.chats.accept_match("x", "a").await.unwrap();
    h.chats.accept_match("x", "b").await.unwrap();
    h.orch
        .handle_message(conn_c.clone(), "x".into(), "hello".into())
        .await;
    assert!(matches!(
        drain(&mut rx_c).as_slice(),
        [ServerMessage::Error { code, .. }] if code == "invalid_chat"
    ));
}

#[tokio::test]
async fn disconnect_while_chatting_informs_the_partner() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;
    let (conn_b, mut rx_b) = h.connect("b").await;

    h.chats.create_pending("x", "a", "b").await.unwrap();
    h.propose_match(&conn_a, "x", &["music"]).await;
    h.propose_match(&conn_b, "x", &["music"]).await;
    h.orch.handle_accept_match(conn_a.clone(), "x".into()).await;
    h.orch.handle_accept_match(conn_b.clone(), "x".into()).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // A's socket dies.
    h.state.remove_connection("a").await;
    h.orch.clone().handle_disconnect("a".into()).await;

    assert_eq!(drain(&mut rx_b), vec![ServerMessage::PartnerLeft]);
    assert!(h.chats.get("x").await.unwrap().is_none());
    assert!(!h.bus.subscribed("a", Channel::Chat));
    assert_eq!(h.sessions.status_of("b"), Some(SessionStatus::Idle));
}

#[tokio::test]
async fn disconnect_while_matching_cancels_the_request() {
    let h = Harness::new();
    let (conn_a, _rx_a) = h.connect("a").await;

    h.orch
        .handle_find_match(conn_a.clone(), vec!["music".into()])
        .await;
    h.state.remove_connection("a").await;
    h.orch.clone().handle_disconnect("a".into()).await;

    assert_eq!(h.bus.match_cancels.lock().unwrap().len(), 1);
    assert!(!h.bus.subscribed("a", Channel::MatchFound));
}

#[tokio::test]
async fn concurrent_accepts_complete_exactly_once() {
    let h = Harness::new();
    h.chats.create_pending("x", "a", "b").await.unwrap();

    let chats_a = h.chats.clone();
    let chats_b = h.chats.clone();
    let accept_a = tokio::spawn(async move { chats_a.accept_match("x", "a").await.unwrap() });
    let accept_b = tokio::spawn(async move { chats_b.accept_match("x", "b").await.unwrap() });
    let outcomes = [accept_a.await.unwrap(), accept_b.await.unwrap()];

    let completed = outcomes
        .iter()
        .filter(|o| **o == AcceptOutcome::Completed)
        .count();
    let waiting = outcomes
        .iter()
        .filter(|o| **o == AcceptOutcome::Waiting)
        .count();
    assert_eq!((completed, waiting), (1, 1));
    assert_eq!(
        h.chats.get("x").await.unwrap().unwrap().status,
        ChatStatus::Active
    );

    // A third accept from a stranger is refused without error.
    assert_eq!(
        h.chats.accept_match("x", "z").await.unwrap(),
        AcceptOutcome::NotPending
    );
}

#[tokio::test]
async fn typing_is_relayed_best_effort() {
    let h = Harness::new();
    let (conn_a, mut rx_a) = h.connect("a").await;
    let (conn_b, mut rx_b) = h.connect("b").await;

    h.chats.create_pending("x", "a", "b").await.unwrap();
    h.propose_match(&conn_a, "x", &["music"]).await;
    h.propose_match(&conn_b, "x", &["music"]).await;
    h.orch.handle_accept_match(conn_a.clone(), "x".into()).await;
    h.orch.handle_accept_match(conn_b.clone(), "x".into()).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    h.orch.handle_typing(conn_a.clone(), "x".into(), true).await;
    assert_eq!(drain(&mut rx_b), vec![ServerMessage::Typing {
        is_typing: true
    }]);
    assert!(drain(&mut rx_a).is_empty());
}
