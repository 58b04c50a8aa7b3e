//! Conversation, answer and streaming types.

use crate::types::DocumentChunk;
use chrono::{DateTime, Utc};
use medrag_llm::LlmUsage;
use serde::{Deserialize, Serialize};

/// Identifier of a conversation.
pub type ConversationId = String;

/// Maximum length of a citation snippet, in bytes.
pub const MAX_SNIPPET_LENGTH: usize = 150;

/// A user question within a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub text: String,
    pub conversation_id: ConversationId,
    pub timestamp: DateTime<Utc>,
}

impl Query {
    /// A query submitted now.
    pub fn new(conversation_id: impl Into<ConversationId>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Reference from an answer to one retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub chunk_id: String,
    pub source_document: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// 1-based rank in the turn's retrieval result
    pub rank: usize,
    pub score: f32,
    pub snippet: String,
}

impl Citation {
    pub fn from_chunk(chunk: &DocumentChunk, rank: usize, score: f32) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            source_document: chunk.source_document.clone(),
            section: chunk.section.clone(),
            rank,
            score,
            snippet: truncate_snippet(&chunk.text, MAX_SNIPPET_LENGTH),
        }
    }
}

/// A completed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub conversation_id: ConversationId,
}

/// One (query, answer) pair of a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: Query,
    pub answer: Answer,
}

/// An item of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnswerFragment {
    /// Incremental answer text, in generation order
    Text { text: String },

    /// Closes the stream with the cited chunks
    Final {
        citations: Vec<Citation>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<LlmUsage>,
    },
}

impl AnswerFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Where a conversation is within its current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    #[default]
    Idle,
    Retrieving,
    Composing,
    Streaming,
    /// The last turn ended with an error; the next turn may start
    Failed,
}

/// Truncate text at a word boundary, appending "..." when shortened.
pub fn truncate_snippet(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = &text[..cut];

    match truncated.rfind(char::is_whitespace) {
        Some(last_space) if last_space > 0 => format!("{}...", truncated[..last_space].trim_end()),
        _ => format!("{}...", truncated),
    }
}
