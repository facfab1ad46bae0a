//! Fixed-capacity ring buffer and the per-chat recent-message history
//! built on it. Appends are O(1); once full, the oldest entry is evicted.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// A fixed-capacity circular buffer. `push` never reallocates after the
/// first lap; iteration yields entries in insertion order.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Capacity must be non-zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an entry, evicting the oldest when full. O(1).
    pub fn push(&mut self, value: T) {
        let cap = self.slots.len();
        let tail = (self.head + self.len) % cap;
        self.slots[tail] = Some(value);
        if self.len == cap {
            // Overwrote the oldest entry; advance the head past it.
            self.head = (self.head + 1) % cap;
        } else {
            self.len += 1;
        }
    }

    /// The retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        let cap = self.slots.len();
        (0..self.len)
            .filter_map(|i| self.slots[(self.head + i) % cap].clone())
            .collect()
    }
}

// ── Chat history ─────────────────────────────────────────────────────────────

/// One retained chat line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLine {
    pub from: String,
    pub text: String,
    pub ts: i64,
}

/// Recent-message retention per chat: a bounded ring for each live chat id,
/// dropped wholesale when the chat ends. Safe for concurrent use.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    capacity: usize,
    chats: Arc<Mutex<HashMap<String, RingBuffer<ChatLine>>>>,
}

impl ChatHistory {
    pub const DEFAULT_CAPACITY: usize = 50;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a line for a chat, creating its ring on first use.
    pub fn record(&self, chat_id: &str, line: ChatLine) {
        let Ok(mut chats) = self.chats.lock() else {
            return;
        };
        chats
            .entry(chat_id.to_string())
            .or_insert_with(|| RingBuffer::new(self.capacity))
            .push(line);
    }

    /// The retained lines for a chat, oldest first.
    pub fn recent(&self, chat_id: &str) -> Vec<ChatLine> {
        self.chats
            .lock()
            .ok()
            .and_then(|chats| chats.get(chat_id).map(RingBuffer::snapshot))
            .unwrap_or_default()
    }

    /// Drop all retained lines for a chat.
    pub fn forget(&self, chat_id: &str) {
        if let Ok(mut chats) = self.chats.lock() {
            chats.remove(chat_id);
        }
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
