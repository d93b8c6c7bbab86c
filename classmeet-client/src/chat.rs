use classmeet_core::{ChatMessage, ClientMessage, ConnectionId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "connection_id", rename_all = "snake_case")]
pub enum Origin {
    Local,
    Remote(ConnectionId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub origin: Origin,
    pub text: String,
    pub sent_at: u64,
}

/// In-memory chat log of the current call, in arrival order.
///
/// Local lines are echoed immediately on send, without waiting for the
/// server. Nothing is persisted.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the local echo and returns the frame to send. Blank text
    /// yields nothing.
    pub fn send(&mut self, text: &str) -> Option<(TranscriptEntry, ClientMessage)> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let entry = TranscriptEntry {
            origin: Origin::Local,
            text: text.to_string(),
            sent_at: now_millis(),
        };
        self.entries.push(entry.clone());

        let msg = ClientMessage::Chat {
            text: entry.text.clone(),
            sent_at: Some(entry.sent_at),
        };
        Some((entry, msg))
    }

    pub fn receive(&mut self, msg: ChatMessage) -> Option<&TranscriptEntry> {
        if msg.text.trim().is_empty() {
            return None;
        }

        self.entries.push(TranscriptEntry {
            origin: Origin::Remote(msg.from),
            text: msg.text,
            sent_at: msg.sent_at,
        });
        self.entries.last()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}
