//! Core data models used throughout manual-qa.
//!
//! These types represent the documents, chapters, and chunks that flow
//! through the indexing pipeline, and the turns and answers that flow
//! through the question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A manual's extracted text, one entry per page.
///
/// Immutable once loaded. Formats without page structure (DOCX, plain text)
/// carry their whole body as a single page.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub id: String,
    pub title: String,
    pub pages: Vec<String>,
}

impl DocumentText {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A contiguous span of a document's text, produced by segmentation.
///
/// Created once at segmentation time, never mutated afterwards.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Chapter {
    pub document_id: String,
    /// Position of this chapter within its document, starting at 0.
    pub index: usize,
    /// Start of the chapter's span: a page index under the page-boundary
    /// policy, a character offset under the heading policy.
    pub start: usize,
    /// One past the end of the span, in the same unit as `start`.
    pub end: usize,
    pub text: String,
}

/// A bounded unit of chapter text, the retrieval granule.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Back-reference to the chapter this chunk was cut from.
    pub chapter_index: usize,
    /// Position of this chunk within its chapter, starting at 0.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of the text, for staleness detection.
    pub hash: String,
}

/// A retrieval result: a chunk with its similarity score and rank.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity against the query embedding.
    pub score: f32,
    /// Position in the retrieval ordering, starting at 1.
    pub rank: usize,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a collection's chat history. Append-only; the core only
/// reads these, the history store owns them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The result of one question through the pipeline. Ephemeral — callers
/// decide whether to persist anything.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The generated answer. Empty when `error` is set.
    pub text: String,
    /// The chunks that were offered to the model, in rank order.
    pub sources: Vec<ScoredChunk>,
    /// Set when the generation capability failed; carries the cause.
    pub error: Option<String>,
}

impl Answer {
    #[allow(dead_code)]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
