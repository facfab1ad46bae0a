//! The session orchestrator: handlers behind every inbound message type,
//! the bus subscription callbacks, and disconnect cleanup.
//!
//! This is the glue between a Connection, the session/chat stores, and the
//! bus. Cross-instance correctness leans on exactly one primitive — the
//! store's atomic accept — so every other path is written to tolerate
//! duplicates and transient failure: cleanups are best-effort, stale bus
//! events are discarded against current session state.

use std::{future::Future, sync::Arc, time::Duration};

use {
    bytes::Bytes,
    tracing::{debug, info, warn},
};

use {
    whisper_bus::{
        Bus, Channel, ChatEvent, ChatEventKind, EventHandler, MatchCancel, MatchFound,
        MatchNotify, MatchNotifyKind, MatchRequest, subjects,
    },
    whisper_common::{ChatHistory, ChatLine, now_unix},
    whisper_protocol::{
        ClientMessage, MATCH_TIMEOUT_SECS, ServerMessage, error_codes, normalize_interests,
        validate_message,
    },
    whisper_store::{AcceptOutcome, ChatStatus, ChatStore, SessionStatus, SessionStore},
};

use crate::{
    connection::{ConnectionHandle, send_error},
    dispatch::Dispatcher,
    state::GatewayState,
};

/// Deadline for store/bus calls on the disconnect path, where nothing can
/// report back to the user anyway.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Orchestrator {
    state: Arc<GatewayState>,
    sessions: Arc<dyn SessionStore>,
    chats: Arc<dyn ChatStore>,
    bus: Arc<dyn Bus>,
    history: ChatHistory,
    op_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        state: Arc<GatewayState>,
        sessions: Arc<dyn SessionStore>,
        chats: Arc<dyn ChatStore>,
        bus: Arc<dyn Bus>,
    ) -> Arc<Self> {
        let op_timeout = state.config.store_op_timeout();
        Arc::new(Self {
            state,
            sessions,
            chats,
            bus,
            history: ChatHistory::default(),
            op_timeout,
        })
    }

    /// Register every message handler on the dispatcher. Each closure
    /// narrows the already-decoded [`ClientMessage`] back to its variant;
    /// the dispatcher guarantees the tags line up.
    pub fn register_handlers(self: &Arc<Self>, dispatcher: &mut Dispatcher) {
        let orch = Arc::clone(self);
        dispatcher.register("find_match", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::FindMatch { interests } = msg {
                    orch.handle_find_match(conn, interests).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("cancel_match", Box::new(move |conn, _msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move { orch.handle_cancel_match(conn).await })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("accept_match", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::AcceptMatch { chat_id } = msg {
                    orch.handle_accept_match(conn, chat_id).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("decline_match", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::DeclineMatch { chat_id } = msg {
                    orch.handle_decline_match(conn, chat_id).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("message", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::Message { chat_id, text } = msg {
                    orch.handle_message(conn, chat_id, text).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("typing", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::Typing { chat_id, is_typing } = msg {
                    orch.handle_typing(conn, chat_id, is_typing).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("end_chat", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::EndChat { chat_id } = msg {
                    orch.handle_end_chat(conn, chat_id).await;
                }
            })
        }));

        let orch = Arc::clone(self);
        dispatcher.register("report", Box::new(move |conn, msg| {
            let orch = Arc::clone(&orch);
            Box::pin(async move {
                if let ClientMessage::Report { chat_id, reason } = msg {
                    orch.handle_report(conn, chat_id, reason).await;
                }
            })
        }));

        dispatcher.register("ping", Box::new(move |conn, _msg| {
            Box::pin(async move {
                conn.write_message(ServerMessage::Pong);
            })
        }));
    }

    /// Install disconnect cleanup on the gateway state.
    pub async fn install_disconnect_handler(self: &Arc<Self>) {
        let orch = Arc::clone(self);
        self.state
            .set_on_disconnect(Arc::new(move |sid| {
                let orch = Arc::clone(&orch);
                Box::pin(async move { orch.handle_disconnect(sid).await })
            }))
            .await;
    }

    // ── Inbound handlers ─────────────────────────────────────────────────

    pub async fn handle_find_match(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        raw_interests: Vec<String>,
    ) {
        let sid = conn.sid().to_string();
        let interests = normalize_interests(&raw_interests);

        // A repeated find_match replaces any previous round's subscriptions.
        self.bus.unsubscribe(&sid, Channel::MatchFound).await;
        self.bus.unsubscribe(&sid, Channel::MatchNotify).await;

        let result: anyhow::Result<()> = async {
            self.deadline(self.sessions.set_interests(&sid, &interests))
                .await?;
            self.deadline(self.sessions.update_status(&sid, SessionStatus::Matching))
                .await?;
            // Subscribe before publishing so an instant match cannot slip
            // past us.
            self.subscribe_match_found(&sid).await?;
            self.deadline(self.bus.publish_match_request(&MatchRequest {
                session_id: sid.clone(),
                interests,
            }))
            .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                conn.write_message(ServerMessage::MatchingStarted {
                    timeout: MATCH_TIMEOUT_SECS,
                });
            },
            Err(e) => {
                warn!(%sid, error = %e, "find_match failed");
                send_error(&conn, error_codes::SERVER_ERROR, "failed to start matching");
            },
        }
    }

    pub async fn handle_cancel_match(self: &Arc<Self>, conn: Arc<ConnectionHandle>) {
        let sid = conn.sid().to_string();

        // Teardown first: once these return, a late match result has no
        // consumer left, so the session cannot bounce back to match_found
        // after the user has seen idle.
        self.bus.unsubscribe(&sid, Channel::MatchFound).await;
        self.bus.unsubscribe(&sid, Channel::MatchNotify).await;

        if let Err(e) = self
            .deadline(self.bus.publish_match_cancel(&MatchCancel {
                session_id: sid.clone(),
            }))
            .await
        {
            warn!(%sid, error = %e, "match cancel publish failed");
        }
        if let Err(e) = self
            .deadline(self.sessions.update_status(&sid, SessionStatus::Idle))
            .await
        {
            warn!(%sid, error = %e, "status reset after cancel failed");
        }
    }

    pub async fn handle_accept_match(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
    ) {
        let sid = conn.sid().to_string();

        let outcome = match self.deadline(self.chats.accept_match(&chat_id, &sid)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%sid, %chat_id, error = %e, "accept_match failed");
                send_error(&conn, error_codes::SERVER_ERROR, "failed to accept match");
                return;
            },
        };

        match outcome {
            AcceptOutcome::Completed => {
                // Second accepter: the chat just went active for both sides.
                if let Err(e) = self.attach_chat(&sid, &chat_id).await {
                    warn!(%sid, %chat_id, error = %e, "chat attach failed");
                    send_error(&conn, error_codes::SERVER_ERROR, "failed to join chat");
                    return;
                }
                conn.write_message(ServerMessage::MatchAccepted {
                    chat_id: chat_id.clone(),
                });

                match self.deadline(self.chats.get(&chat_id)).await {
                    Ok(Some(chat)) => {
                        if let Some(partner) = chat.partner_of(&sid) {
                            let notify = MatchNotify {
                                kind: MatchNotifyKind::Accepted,
                                chat_id: chat_id.clone(),
                            };
                            if let Err(e) =
                                self.deadline(self.bus.publish_match_notify(partner, &notify)).await
                            {
                                warn!(%sid, %chat_id, error = %e, "accept notify publish failed");
                            }
                        }
                    },
                    Ok(None) => warn!(%sid, %chat_id, "chat vanished right after activation"),
                    Err(e) => warn!(%sid, %chat_id, error = %e, "chat lookup after accept failed"),
                }

                self.bus.unsubscribe(&sid, Channel::MatchNotify).await;
            },
            AcceptOutcome::Waiting => {
                // First accepter: the partner's accept will arrive as a
                // match.notify and complete the attach from there.
            },
            outcome => {
                debug!(%sid, %chat_id, ?outcome, "accept dropped");
            },
        }
    }

    pub async fn handle_decline_match(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
    ) {
        let sid = conn.sid().to_string();

        match self.deadline(self.chats.get(&chat_id)).await {
            Ok(Some(chat)) if chat.is_participant(&sid) => {
                let partner = chat.partner_of(&sid).map(str::to_string);
                if let Err(e) = self.deadline(self.chats.delete(&chat_id)).await {
                    warn!(%sid, %chat_id, error = %e, "chat delete on decline failed");
                }
                if let Some(partner) = partner {
                    let notify = MatchNotify {
                        kind: MatchNotifyKind::Declined,
                        chat_id: chat_id.clone(),
                    };
                    if let Err(e) =
                        self.deadline(self.bus.publish_match_notify(&partner, &notify)).await
                    {
                        warn!(%sid, %chat_id, error = %e, "decline notify publish failed");
                    }
                }
            },
            // Already gone (duplicate decline) or not ours: nothing to do.
            Ok(_) => debug!(%sid, %chat_id, "decline on missing or foreign chat"),
            Err(e) => warn!(%sid, %chat_id, error = %e, "chat lookup on decline failed"),
        }

        self.bus.unsubscribe(&sid, Channel::MatchNotify).await;
        self.bus.unsubscribe(&sid, Channel::MatchFound).await;
        if let Err(e) = self
            .deadline(self.sessions.update_status(&sid, SessionStatus::Idle))
            .await
        {
            warn!(%sid, error = %e, "status reset after decline failed");
        }
    }

    pub async fn handle_message(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
        text: String,
    ) {
        let sid = conn.sid().to_string();

        if let Err(violation) = validate_message(&text) {
            send_error(&conn, error_codes::INVALID_MESSAGE, violation.to_string());
            return;
        }

        let chat = match self.deadline(self.chats.get(&chat_id)).await {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                send_error(&conn, error_codes::INVALID_CHAT, "no such chat");
                return;
            },
            Err(e) => {
                warn!(%sid, %chat_id, error = %e, "chat lookup failed");
                send_error(&conn, error_codes::SERVER_ERROR, "failed to send message");
                return;
            },
        };
        if chat.status != ChatStatus::Active || !chat.is_participant(&sid) {
            send_error(&conn, error_codes::INVALID_CHAT, "chat is not active");
            return;
        }

        let ts = now_unix();
        let event = ChatEvent::message(&sid, &text, ts);
        if let Err(e) = self.deadline(self.bus.publish_chat_event(&chat_id, &event)).await {
            warn!(%sid, %chat_id, error = %e, "chat event publish failed");
            send_error(&conn, error_codes::SERVER_ERROR, "failed to send message");
            return;
        }
        self.history.record(&chat_id, ChatLine { from: sid, text, ts });
    }

    pub async fn handle_typing(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
        is_typing: bool,
    ) {
        // Best-effort by design: no chat-state validation, no error reply.
        let sid = conn.sid().to_string();
        let event = ChatEvent::typing(&sid, is_typing);
        if let Err(e) = self.deadline(self.bus.publish_chat_event(&chat_id, &event)).await {
            debug!(%sid, %chat_id, error = %e, "typing publish failed");
        }
    }

    pub async fn handle_end_chat(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
    ) {
        let sid = conn.sid().to_string();

        match self.deadline(self.chats.get(&chat_id)).await {
            Ok(Some(chat)) if chat.is_participant(&sid) => {},
            Ok(_) => {
                send_error(&conn, error_codes::INVALID_CHAT, "no such chat");
                return;
            },
            Err(e) => {
                warn!(%sid, %chat_id, error = %e, "chat lookup on end failed");
                send_error(&conn, error_codes::SERVER_ERROR, "failed to end chat");
                return;
            },
        }

        if let Err(e) = self
            .deadline(self.bus.publish_chat_event(&chat_id, &ChatEvent::partner_left(&sid)))
            .await
        {
            warn!(%sid, %chat_id, error = %e, "partner_left publish failed");
        }
        self.bus.unsubscribe(&sid, Channel::Chat).await;
        if let Err(e) = self.deadline(self.chats.delete(&chat_id)).await {
            warn!(%sid, %chat_id, error = %e, "chat delete failed");
        }
        if let Err(e) = self.deadline(self.sessions.clear_chat_id(&sid)).await {
            warn!(%sid, error = %e, "chat detach failed");
        }
        self.history.forget(&chat_id);
    }

    pub async fn handle_report(
        self: &Arc<Self>,
        conn: Arc<ConnectionHandle>,
        chat_id: String,
        reason: String,
    ) {
        let sid = conn.sid().to_string();
        match self.deadline(self.chats.get(&chat_id)).await {
            Ok(Some(chat)) if chat.is_participant(&sid) => {
                // Picked up out of band by the moderation pipeline.
                info!(%sid, %chat_id, %reason, "user report");
            },
            _ => debug!(%sid, %chat_id, "report on missing or foreign chat"),
        }
    }

    // ── Bus subscription callbacks ───────────────────────────────────────

    async fn subscribe_match_found(self: &Arc<Self>, sid: &str) -> anyhow::Result<()> {
        let orch = Arc::clone(self);
        let cb_sid = sid.to_string();
        let handler: EventHandler = Arc::new(move |payload| {
            let orch = Arc::clone(&orch);
            let sid = cb_sid.clone();
            Box::pin(async move { orch.on_match_found(sid, payload).await })
        });
        self.bus
            .subscribe(sid, Channel::MatchFound, subjects::match_found(sid), handler)
            .await?;
        Ok(())
    }

    async fn subscribe_match_notify(self: &Arc<Self>, sid: &str) -> anyhow::Result<()> {
        let orch = Arc::clone(self);
        let cb_sid = sid.to_string();
        let handler: EventHandler = Arc::new(move |payload| {
            let orch = Arc::clone(&orch);
            let sid = cb_sid.clone();
            Box::pin(async move { orch.on_match_notify(sid, payload).await })
        });
        self.bus
            .subscribe(sid, Channel::MatchNotify, subjects::match_notify(sid), handler)
            .await?;
        Ok(())
    }

    async fn subscribe_chat(self: &Arc<Self>, sid: &str, chat_id: &str) -> anyhow::Result<()> {
        let orch = Arc::clone(self);
        let cb_sid = sid.to_string();
        let cb_chat = chat_id.to_string();
        let handler: EventHandler = Arc::new(move |payload| {
            let orch = Arc::clone(&orch);
            let sid = cb_sid.clone();
            let chat_id = cb_chat.clone();
            Box::pin(async move { orch.on_chat_event(sid, chat_id, payload).await })
        });
        self.bus
            .subscribe(sid, Channel::Chat, subjects::chat(chat_id), handler)
            .await?;
        Ok(())
    }

    /// Matcher verdict for a queued session: either a proposal or a queue
    /// timeout.
    async fn on_match_found(self: Arc<Self>, sid: String, payload: Bytes) {
        let found: MatchFound = match serde_json::from_slice(&payload) {
            Ok(found) => found,
            Err(e) => {
                warn!(%sid, error = %e, "undecodable match.found payload");
                return;
            },
        };

        if found.timeout {
            let _ = self.state.send_message(&sid, ServerMessage::MatchTimeout).await;
            if let Err(e) = self
                .deadline(self.sessions.update_status(&sid, SessionStatus::Idle))
                .await
            {
                warn!(%sid, error = %e, "status reset after match timeout failed");
            }
            self.spawn_unsubscribe(&sid, Channel::MatchFound);
            return;
        }

        // The bus is at-least-once: a duplicate or a result racing a cancel
        // is discarded against current session state.
        match self.deadline(self.sessions.get(&sid)).await {
            Ok(Some(session)) if session.status == SessionStatus::Matching => {},
            _ => {
                debug!(%sid, chat_id = %found.chat_id, "discarding stale match result");
                return;
            },
        }

        // The partner may accept before our user does; listen for the
        // verdict before surfacing the proposal.
        if let Err(e) = self.subscribe_match_notify(&sid).await {
            warn!(%sid, error = %e, "match notify subscribe failed");
            return;
        }
        let _ = self
            .state
            .send_message(&sid, ServerMessage::MatchFound {
                chat_id: found.chat_id,
                shared_interests: found.shared_interests,
                accept_deadline: found.accept_deadline,
            })
            .await;
        self.spawn_unsubscribe(&sid, Channel::MatchFound);
    }

    /// The other side's verdict on a pending match.
    async fn on_match_notify(self: Arc<Self>, sid: String, payload: Bytes) {
        let notify: MatchNotify = match serde_json::from_slice(&payload) {
            Ok(notify) => notify,
            Err(e) => {
                warn!(%sid, error = %e, "undecodable match.notify payload");
                return;
            },
        };

        match notify.kind {
            MatchNotifyKind::Accepted => {
                if let Err(e) = self.attach_chat(&sid, &notify.chat_id).await {
                    warn!(%sid, chat_id = %notify.chat_id, error = %e, "chat attach failed");
                    return;
                }
                let _ = self
                    .state
                    .send_message(&sid, ServerMessage::MatchAccepted {
                        chat_id: notify.chat_id.clone(),
                    })
                    .await;
            },
            MatchNotifyKind::Declined => {
                let _ = self.state.send_message(&sid, ServerMessage::MatchDeclined).await;
                if let Err(e) = self
                    .deadline(self.sessions.update_status(&sid, SessionStatus::Idle))
                    .await
                {
                    warn!(%sid, error = %e, "status reset after decline failed");
                }
            },
            MatchNotifyKind::TimedOut => {
                let _ = self.state.send_message(&sid, ServerMessage::MatchTimeout).await;
                if let Err(e) = self
                    .deadline(self.sessions.update_status(&sid, SessionStatus::Idle))
                    .await
                {
                    warn!(%sid, error = %e, "status reset after timeout failed");
                }
            },
        }
        self.spawn_unsubscribe(&sid, Channel::MatchNotify);
    }

    /// Live chat traffic; our own echoes are discarded.
    async fn on_chat_event(self: Arc<Self>, sid: String, chat_id: String, payload: Bytes) {
        let event: ChatEvent = match serde_json::from_slice(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(%sid, %chat_id, error = %e, "undecodable chat event");
                return;
            },
        };
        if event.from == sid {
            return;
        }

        match event.kind {
            ChatEventKind::Message => {
                let text = event.text.unwrap_or_default();
                let ts = event.ts.unwrap_or_else(now_unix);
                self.history.record(&chat_id, ChatLine {
                    from: event.from,
                    text: text.clone(),
                    ts,
                });
                let _ = self
                    .state
                    .send_message(&sid, ServerMessage::partner_message(text, ts))
                    .await;
            },
            ChatEventKind::Typing => {
                let _ = self
                    .state
                    .send_message(&sid, ServerMessage::Typing {
                        is_typing: event.is_typing.unwrap_or(false),
                    })
                    .await;
            },
            ChatEventKind::PartnerLeft => {
                let _ = self.state.send_message(&sid, ServerMessage::PartnerLeft).await;
                if let Err(e) = self.deadline(self.sessions.clear_chat_id(&sid)).await {
                    warn!(%sid, error = %e, "chat detach after partner_left failed");
                }
                self.history.forget(&chat_id);
                self.spawn_unsubscribe(&sid, Channel::Chat);
            },
        }
    }

    // ── Disconnect cleanup ───────────────────────────────────────────────

    /// Runs once per closed connection. Everything here is best-effort;
    /// the session record itself is left to expire via TTL.
    pub async fn handle_disconnect(self: Arc<Self>, sid: String) {
        let session = match tokio::time::timeout(CLEANUP_TIMEOUT, self.sessions.get(&sid)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(%sid, error = %e, "session lookup on disconnect failed");
                None
            },
            Err(_) => {
                warn!(%sid, "session lookup on disconnect timed out");
                None
            },
        };

        if let Some(session) = session {
            if session.status == SessionStatus::Matching {
                let cancel = MatchCancel {
                    session_id: sid.clone(),
                };
                let publish =
                    tokio::time::timeout(CLEANUP_TIMEOUT, self.bus.publish_match_cancel(&cancel));
                if !matches!(publish.await, Ok(Ok(()))) {
                    warn!(%sid, "match cancel on disconnect failed");
                }
            }

            if !session.chat_id.is_empty() {
                self.abandon_chat(&sid, &session.chat_id).await;
            }
        }

        self.bus.unsubscribe_all(&sid).await;
        debug!(%sid, "disconnect cleanup finished");
    }

    /// Tell the partner we are gone and drop the chat record.
    async fn abandon_chat(&self, sid: &str, chat_id: &str) {
        let lookup = tokio::time::timeout(CLEANUP_TIMEOUT, self.chats.get(chat_id)).await;
        let is_ours = matches!(lookup, Ok(Ok(Some(ref chat))) if chat.is_participant(sid));
        if !is_ours {
            return;
        }

        let left = ChatEvent::partner_left(sid);
        let publish =
            tokio::time::timeout(CLEANUP_TIMEOUT, self.bus.publish_chat_event(chat_id, &left));
        if !matches!(publish.await, Ok(Ok(()))) {
            warn!(%sid, %chat_id, "partner_left on disconnect failed");
        }
        let delete = tokio::time::timeout(CLEANUP_TIMEOUT, self.chats.delete(chat_id));
        if !matches!(delete.await, Ok(Ok(()))) {
            warn!(%sid, %chat_id, "chat delete on disconnect failed");
        }
        self.history.forget(chat_id);
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Wire a session into an active chat: chat-event subscription plus the
    /// durable chat_id/status flip.
    async fn attach_chat(self: &Arc<Self>, sid: &str, chat_id: &str) -> anyhow::Result<()> {
        self.subscribe_chat(sid, chat_id).await?;
        self.deadline(self.sessions.set_chat_id(sid, chat_id)).await?;
        Ok(())
    }

    /// Bound an external call with the per-operation deadline.
    async fn deadline<T, E>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> anyhow::Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| anyhow::anyhow!("operation deadline elapsed"))?
            .map_err(anyhow::Error::from)
    }

    /// Unsubscribing the channel currently delivering to us would abort the
    /// consumer task mid-call; hop to a fresh task instead.
    fn spawn_unsubscribe(&self, sid: &str, channel: Channel) {
        let bus = Arc::clone(&self.bus);
        let sid = sid.to_string();
        tokio::spawn(async move {
            bus.unsubscribe(&sid, channel).await;
        });
    }

    /// Recent retained lines for a chat, oldest first.
    pub fn recent_history(&self, chat_id: &str) -> Vec<ChatLine> {
        self.history.recent(chat_id)
    }
}
