// src/memory/summarization.rs

//! Transcript assembly and summary synthesis for memory consolidation.

use chrono::Utc;

use crate::memory::types::{Content, SUMMARY_AUTHOR, TextPart, Turn, UserRecord};

/// Instruction appended to the transcript for the generation call.
pub const SUMMARIZE_MEMORY_PROMPT: &str = "Summarize the key facts from this conversation that \
     are worth remembering for future interactions. Be concise.";

/// Prefix carried by every synthetic summary turn.
pub const SUMMARY_PREFIX: &str = "Memory Summary: ";

/// Renders existing summaries and every session turn into one transcript.
/// Returns an empty string when there is nothing to summarize.
pub fn build_transcript(record: &UserRecord) -> String {
    let mut transcript = String::new();

    for summary in &record.summaries {
        let text = summary.text();
        if !text.is_empty() {
            transcript.push_str("Previous Summary: ");
            transcript.push_str(&text);
            transcript.push('\n');
        }
    }

    for turns in record.sessions.values() {
        for turn in turns {
            let text = turn.text();
            if !text.is_empty() {
                transcript.push_str(&turn.author);
                transcript.push_str(": ");
                transcript.push_str(&text);
                transcript.push('\n');
            }
        }
    }

    transcript
}

/// Full prompt for the summarization call.
pub fn summary_prompt(transcript: &str) -> String {
    format!("{transcript}\n\n{SUMMARIZE_MEMORY_PROMPT}")
}

/// The synthetic turn that replaces all prior summaries for a user.
pub fn summary_turn(summary_text: &str) -> Turn {
    Turn {
        timestamp: Some(Utc::now().to_rfc3339()),
        author: SUMMARY_AUTHOR.to_string(),
        content: Content {
            role: Some("model".to_string()),
            parts: vec![TextPart {
                text: format!("{SUMMARY_PREFIX}{summary_text}"),
            }],
        },
    }
}
