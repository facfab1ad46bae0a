use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix seconds. All `ts`, `created_at` and
/// deadline fields on the wire and in the store use this resolution.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
