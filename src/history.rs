//! Conversation history boundary.
//!
//! Chat history belongs to a persistence collaborator; the core only reads
//! a collection's ordered turns and appends new ones through this trait.
//! [`MemoryHistory`] is the in-process implementation backing the CLI chat
//! loop and the tests — a durable store can be swapped in behind the same
//! trait without touching the pipeline.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::ConversationTurn;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The ordered turns of one collection, oldest first.
    async fn history(&self, collection: &str) -> Result<Vec<ConversationTurn>>;

    /// Append one turn to a collection.
    async fn append(&self, collection: &str, turn: ConversationTurn) -> Result<()>;
}

/// Process-local history, keyed by collection id.
#[derive(Default)]
pub struct MemoryHistory {
    inner: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn history(&self, collection: &str) -> Result<Vec<ConversationTurn>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(collection).cloned().unwrap_or_default())
    }

    async fn append(&self, collection: &str, turn: ConversationTurn) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.entry(collection.to_string()).or_default().push(turn);
        Ok(())
    }
}
