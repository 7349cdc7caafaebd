//! The question-answering pipeline.
//!
//! [`QaPipeline`] is the one long-lived object of the query path: built once
//! at process startup from configuration (index, embedding provider,
//! generation provider, history store) and passed by reference into
//! whatever frontend drives it. Nothing here lives in module-level state.
//!
//! Each question runs retrieve → assemble → generate synchronously. The
//! index is read-only after construction and safe to share across
//! concurrent callers; the generation capability is a single shared model
//! instance, so generate calls are serialized through a one-permit
//! semaphore rather than issued in parallel.
//!
//! Generation failures never escape: they come back as an error-tagged
//! [`Answer`], and the pipeline stays available for the next question.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::generate::{self, GenerationProvider};
use crate::history::HistoryStore;
use crate::index::{Index, IndexStore};
use crate::models::{Answer, ConversationTurn, Role};
use crate::prompt;
use crate::retrieve::Retriever;
use crate::{embedding, history::MemoryHistory};

pub struct QaPipeline {
    config: Config,
    store: IndexStore,
    retriever: Retriever,
    generator: Box<dyn GenerationProvider>,
    history: Box<dyn HistoryStore>,
    generation_gate: Semaphore,
}

impl QaPipeline {
    /// Wire a pipeline from explicit parts. Useful for tests and embedders
    /// that bring their own providers.
    pub fn new(
        config: Config,
        store: IndexStore,
        index: Arc<Index>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Box<dyn GenerationProvider>,
        history: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            store,
            retriever: Retriever::new(index, embedder),
            generator,
            history,
            generation_gate: Semaphore::new(1),
        }
    }

    /// Construct the full pipeline from configuration: create providers,
    /// open the snapshot, and make the one-time load-vs-build decision.
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let generator = generate::create_provider(&config.generation)?;

        let store = IndexStore::open(&config.index.path).await?;
        let index = Arc::new(store.open_or_build(&config, embedder.as_ref()).await?);

        Ok(Self::new(
            config,
            store,
            index,
            embedder,
            generator,
            Box::new(MemoryHistory::new()),
        ))
    }

    /// Answer one question against the index.
    ///
    /// `top_k` overrides the configured retrieval depth when given. The
    /// returned [`Answer`] carries the chunks that were offered to the
    /// model; on generation failure its `error` field holds the cause and
    /// `text` is empty.
    pub async fn answer(
        &self,
        collection: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Answer> {
        let k = top_k.unwrap_or(self.config.retrieval.top_k);

        let history = match self.history.history(collection).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "history store unavailable, continuing without history");
                Vec::new()
            }
        };

        let sources = self.retriever.retrieve(question, k).await?;
        let prompt_text = prompt::assemble(question, &sources, &history, &self.config.generation);

        self.record(collection, ConversationTurn::now(Role::User, question))
            .await;

        // The model capability is a single shared instance; one generate
        // call at a time.
        let _permit = self.generation_gate.acquire().await?;
        match self
            .generator
            .generate(
                &prompt_text,
                self.config.generation.max_output_tokens,
                self.config.generation.temperature,
            )
            .await
        {
            Ok(text) => {
                self.record(collection, ConversationTurn::now(Role::Assistant, &text))
                    .await;
                Ok(Answer {
                    text,
                    sources,
                    error: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "generation failed, returning error-tagged answer");
                Ok(Answer {
                    text: String::new(),
                    sources,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    pub fn generation_model(&self) -> &str {
        self.generator.model_name()
    }

    /// Release held resources. Call on the way out so the snapshot pool
    /// closes deterministically instead of relying on drop order.
    pub async fn shutdown(self) {
        self.store.close().await;
    }

    async fn record(&self, collection: &str, turn: ConversationTurn) {
        if let Err(e) = self.history.append(collection, turn).await {
            warn!(error = %e, "failed to append conversation turn");
        }
    }
}
