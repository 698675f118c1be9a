// src/memory/types.rs

//! Persisted document model plus the session ingestion and search contracts.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Author recorded on synthetic summary turns.
pub const SUMMARY_AUTHOR: &str = "memory_summarizer";

/// The entire persisted state: one record per `"{app_name}/{user_id}"` key.
pub type MemoryDocument = IndexMap<String, UserRecord>;

/// Storage key shared by ingestion and search.
pub fn user_key(app_name: &str, user_id: &str) -> String {
    format!("{app_name}/{user_id}")
}

/// Everything remembered for one user of one app.
///
/// Serializes as a single JSON object: the reserved `metadata` and
/// `summaries` keys plus one key per session id. Caller-supplied session
/// ids must not collide with the reserved names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub metadata: UserMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub summaries: Vec<Turn>,
    #[serde(flatten)]
    pub sessions: IndexMap<String, Vec<Turn>>,
}

impl UserRecord {
    /// Turns ingested since the last successful summarization.
    pub fn unsummarized_turns(&self) -> u64 {
        self.metadata
            .total_turns
            .saturating_sub(self.metadata.last_summarized_turn_count)
    }
}

/// Per-user turn accounting. `total_turns` only ever grows;
/// `last_summarized_turn_count` trails it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub total_turns: u64,
    #[serde(default)]
    pub last_summarized_turn_count: u64,
}

/// One recorded utterance within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub author: String,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: Option<String>,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

impl Turn {
    /// Converts a raw session event into a storable turn, keeping only
    /// non-empty text parts. Events with no text at all are dropped.
    pub fn from_event(event: &Event) -> Option<Self> {
        let content = event.content.as_ref()?;
        let parts: Vec<TextPart> = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.is_empty())
            .map(|text| TextPart {
                text: text.to_string(),
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: event.timestamp.and_then(format_epoch_seconds),
            author: event.author.clone(),
            content: Content {
                role: content.role.clone(),
                parts,
            },
        })
    }

    /// All part texts joined with single spaces.
    pub fn text(&self) -> String {
        self.content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Renders an epoch-seconds event timestamp as RFC 3339. Out-of-range or
/// non-finite values map to `None` rather than panicking.
fn format_epoch_seconds(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0) as i64)
        .map(|timestamp| timestamp.to_rfc3339())
}

/// One bounded conversation handed over by the agent runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A raw event as produced by the agent runtime. `timestamp` is seconds
/// since the epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub author: String,
    #[serde(default)]
    pub content: Option<EventContent>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl Event {
    /// Convenience constructor for a plain text event.
    pub fn text(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: Some(EventContent {
                role: None,
                parts: vec![EventPart {
                    text: Some(text.into()),
                }],
            }),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<EventPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPart {
    #[serde(default)]
    pub text: Option<String>,
}

/// One search hit reconstructed from a stored turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: Content,
    pub author: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MemoryEntry {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            content: turn.content.clone(),
            author: turn.author.clone(),
            timestamp: turn.timestamp.clone(),
        }
    }

    /// All part texts joined with single spaces.
    pub fn text(&self) -> String {
        self.content
            .parts
            .iter()
            .map(|part| part.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Read-only per-user counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UserStats {
    pub total_turns: u64,
    pub last_summarized_turn_count: u64,
    pub session_count: usize,
    pub summary_count: usize,
}
