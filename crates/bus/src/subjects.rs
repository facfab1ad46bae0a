//! Subject names. Fan-out subjects embed the addressee (session or chat id)
//! so only the owning instance's subscription sees the traffic.

/// Gateway → matcher: enter the queue.
pub fn match_request() -> String {
    "match.request".into()
}

/// Gateway → matcher: leave the queue.
pub fn match_cancel() -> String {
    "match.cancel".into()
}

/// Matcher → owning gateway: a proposal (or queue timeout) for a session.
pub fn match_found(sid: &str) -> String {
    format!("match.found.{sid}")
}

/// Gateway → owning gateway: accept/decline/timeout verdicts for a session.
pub fn match_notify(sid: &str) -> String {
    format!("match.notify.{sid}")
}

/// Both gateways: live chat traffic for a chat id.
pub fn chat(chat_id: &str) -> String {
    format!("chat.{chat_id}")
}
