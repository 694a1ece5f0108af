//! Timestamped session log: everything sent, received, or reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validate::pretty_json;

/// Longest payload echoed into a `Sent` log entry. The wire always carries
/// the full payload; only the log display is truncated.
pub const SENT_DISPLAY_LIMIT: usize = 200;

/// Where a log entry came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Payload transmitted by the user (or the initial message).
    Sent,
    /// Frame delivered by the server.
    Received,
    /// Connect/disconnect/error/reconnect notices.
    System,
}

/// One recorded event, shown to the user in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub payload: String,
}

impl LogEntry {
    fn new(direction: Direction, payload: String) -> Self {
        Self {
            timestamp: Utc::now(),
            direction,
            payload,
        }
    }

    /// Entry for an outbound payload, truncated for display.
    #[must_use]
    pub fn sent(payload: &str) -> Self {
        Self::new(Direction::Sent, truncate_chars(payload, SENT_DISPLAY_LIMIT))
    }

    /// Entry for an inbound frame, pretty-printed when it parses as JSON.
    #[must_use]
    pub fn received(raw: &str) -> Self {
        Self::new(Direction::Received, pretty_json(raw))
    }

    /// Lifecycle or error notice.
    #[must_use]
    pub fn system<S: Into<String>>(note: S) -> Self {
        Self::new(Direction::System, note.into())
    }

    /// Render as `[HH:MM:SS] <payload>`, the console line format.
    #[must_use]
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.payload)
    }
}

/// Append-only sequence of [`LogEntry`] values.
///
/// Entries are never reordered or removed; [`MessageLog::clear`] is the only
/// way to drop them, and it truncates to empty.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
}

impl MessageLog {
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newline-joined render of every entry, suitable for copy-to-clipboard.
    /// Pure transform; does not mutate the log.
    #[must_use]
    pub fn export(&self) -> String {
        self.entries
            .iter()
            .map(LogEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn truncate_chars(payload: &str, limit: usize) -> String {
    payload.chars().take(limit).collect()
}
