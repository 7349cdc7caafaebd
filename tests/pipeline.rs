//! End-to-end pipeline tests over the library API, with deterministic
//! in-process providers standing in for the embedding and generation
//! capabilities.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use manual_qa::config::{
    ChunkingConfig, Config, DocumentConfig, EmbeddingConfig, GenerationConfig, IndexConfig,
    RetrievalConfig, SegmenterConfig,
};
use manual_qa::embedding::EmbeddingProvider;
use manual_qa::generate::{GenerateError, GenerationProvider};
use manual_qa::history::MemoryHistory;
use manual_qa::index::IndexStore;
use manual_qa::pipeline::QaPipeline;
use manual_qa::retrieve::Retriever;

/// Word-count embedder over a fixed vocabulary: one dimension per known
/// word. Texts sharing vocabulary words score high cosine similarity, and
/// the ranking is exactly predictable.
struct BagOfWords;

const VOCAB: &[&str] = &[
    "routing", "options", "report", "directory", "simulation", "software", "results", "scenario",
    "intro", "output", "written", "pick", "chapter", "general", "describing", "terms", "text",
    "what", "are", "the",
];

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words-test"
    }
    fn dims(&self) -> usize {
        VOCAB.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; VOCAB.len()];
                for word in t
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    if let Some(i) = VOCAB.iter().position(|&w| w == word) {
                        v[i] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Generator that records every prompt and can fail on demand.
struct ScriptedGenerator {
    reply: String,
    fail_next: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_next: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted-test"
    }
    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> std::result::Result<String, GenerateError> {
        self.prompts.lock().await.push(prompt.to_string());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GenerateError::Timeout("model timed out after 120s".into()));
        }
        Ok(self.reply.clone())
    }
}

fn test_config(dir: &tempfile::TempDir, docs: Vec<DocumentConfig>) -> Config {
    Config {
        index: IndexConfig {
            path: dir.path().join("index.sqlite"),
        },
        documents: docs,
        segmenter: SegmenterConfig::default(),
        chunking: ChunkingConfig {
            max_chars: 1000,
            overlap: 100,
        },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        generation: GenerationConfig::default(),
    }
}

fn write_manual(dir: &tempfile::TempDir, name: &str, body: &str) -> DocumentConfig {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    DocumentConfig {
        id: name.trim_end_matches(".txt").to_string(),
        title: None,
        path,
        chapter_ends: None,
    }
}

const MANUAL: &str = "Intro text describing the simulation software in general terms.\n\
Chapter 2 Assignment\nRouting options are X, Y, Z. Pick one per scenario.\n\
Chapter 3 Output\nResults are written to the report directory.";

async fn built_pipeline(
    dir: &tempfile::TempDir,
    generator: Arc<ScriptedGenerator>,
    include_history: bool,
) -> QaPipeline {
    let doc = write_manual(dir, "manual.txt", MANUAL);
    let mut config = test_config(dir, vec![doc]);
    config.generation.include_history = include_history;

    let embedder = Arc::new(BagOfWords);
    let store = IndexStore::open(&config.index.path).await.unwrap();
    let index = Arc::new(store.build(&config, embedder.as_ref()).await.unwrap());

    struct SharedGenerator(Arc<ScriptedGenerator>);
    #[async_trait]
    impl GenerationProvider for SharedGenerator {
        fn model_name(&self) -> &str {
            self.0.model_name()
        }
        async fn generate(
            &self,
            prompt: &str,
            max_tokens: u32,
            temperature: f32,
        ) -> std::result::Result<String, GenerateError> {
            self.0.generate(prompt, max_tokens, temperature).await
        }
    }

    QaPipeline::new(
        config,
        store,
        index,
        embedder,
        Box::new(SharedGenerator(generator)),
        Box::new(MemoryHistory::new()),
    )
}

#[tokio::test]
async fn routing_question_retrieves_the_routing_chunk() {
    let dir = tempfile::TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::replying("The options are X, Y, and Z."));
    let pipeline = built_pipeline(&dir, generator.clone(), false).await;

    let answer = pipeline
        .answer("c1", "What are the routing options?", Some(1))
        .await
        .unwrap();

    assert!(answer.error.is_none());
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0].chunk.text.contains("Routing options are X, Y, Z"));

    // The retrieved chunk made it into the prompt, ahead of the question.
    let prompts = generator.prompts.lock().await;
    let prompt = &prompts[0];
    assert!(prompt.contains("Routing options are X, Y, Z"));
    assert!(prompt.contains("What are the routing options?"));
    assert!(prompt.contains("I don't know"));

    drop(prompts);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn persisted_snapshot_retrieves_identically_to_a_fresh_build() {
    let dir = tempfile::TempDir::new().unwrap();
    let doc = write_manual(&dir, "manual.txt", MANUAL);
    let config = test_config(&dir, vec![doc]);
    let embedder = Arc::new(BagOfWords);

    let store = IndexStore::open(&config.index.path).await.unwrap();
    let built = Arc::new(store.build(&config, embedder.as_ref()).await.unwrap());
    let loaded = Arc::new(
        store
            .load(embedder.model_name(), embedder.dims())
            .await
            .unwrap()
            .expect("snapshot should load"),
    );

    let query = "What are the routing options?";
    let from_build = Retriever::new(built, embedder.clone())
        .retrieve(query, 3)
        .await
        .unwrap();
    let from_load = Retriever::new(loaded, embedder.clone())
        .retrieve(query, 3)
        .await
        .unwrap();

    assert_eq!(from_build.len(), from_load.len());
    for (a, b) in from_build.iter().zip(from_load.iter()) {
        assert_eq!(a.chunk.id, b.chunk.id);
        assert!((a.score - b.score).abs() < 1e-6);
    }

    store.close().await;
}

#[tokio::test]
async fn empty_index_answers_through_the_fallback_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = test_config(&dir, vec![]);
    let embedder = Arc::new(BagOfWords);
    let generator = ScriptedGenerator::replying("I don't know");

    let store = IndexStore::open(&config.index.path).await.unwrap();
    let index = Arc::new(store.build(&config, embedder.as_ref()).await.unwrap());
    assert!(index.is_empty());

    let pipeline = QaPipeline::new(
        config,
        store,
        index,
        embedder,
        Box::new(generator),
        Box::new(MemoryHistory::new()),
    );

    let answer = pipeline
        .answer("c1", "What are the routing options?", None)
        .await
        .unwrap();
    assert!(answer.sources.is_empty());
    assert!(answer.error.is_none());
    assert_eq!(answer.text, "I don't know");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn generation_failure_is_tagged_and_does_not_poison_the_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::replying("Recovered answer."));
    generator.fail_next.store(true, Ordering::SeqCst);
    let pipeline = built_pipeline(&dir, generator.clone(), false).await;

    let failed = pipeline
        .answer("c1", "What are the routing options?", None)
        .await
        .unwrap();
    assert!(failed.is_error());
    let cause = failed.error.as_deref().unwrap();
    assert!(cause.contains("model timed out after 120s"));
    assert!(failed.text.is_empty());
    // Retrieval still happened; sources are reported alongside the error.
    assert!(!failed.sources.is_empty());

    // The next question goes through normally.
    let ok = pipeline
        .answer("c1", "What are the routing options?", None)
        .await
        .unwrap();
    assert!(!ok.is_error());
    assert_eq!(ok.text, "Recovered answer.");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn history_stays_out_of_the_prompt_unless_enabled() {
    let dir = tempfile::TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::replying("Answer one."));
    let pipeline = built_pipeline(&dir, generator.clone(), false).await;

    pipeline
        .answer("c1", "What are the routing options?", None)
        .await
        .unwrap();
    pipeline
        .answer("c1", "What is written to the report directory?", None)
        .await
        .unwrap();

    {
        let prompts = generator.prompts.lock().await;
        assert_eq!(prompts.len(), 2);
        // Default-off: the second prompt must not replay the first exchange.
        assert!(!prompts[1].contains("Conversation so far"));
        assert!(!prompts[1].contains("What are the routing options?"));
    }
    pipeline.shutdown().await;

    // Opt in, and the prior turns appear.
    let dir2 = tempfile::TempDir::new().unwrap();
    let generator2 = Arc::new(ScriptedGenerator::replying("Answer two."));
    let pipeline2 = built_pipeline(&dir2, generator2.clone(), true).await;

    pipeline2
        .answer("c1", "What are the routing options?", None)
        .await
        .unwrap();
    pipeline2
        .answer("c1", "And the output?", None)
        .await
        .unwrap();

    {
        let prompts = generator2.prompts.lock().await;
        assert!(prompts[1].contains("Conversation so far"));
        assert!(prompts[1].contains("user: What are the routing options?"));
        assert!(prompts[1].contains("assistant: Answer two."));
    }
    pipeline2.shutdown().await;
}

#[tokio::test]
async fn top_k_bounds_the_sources() {
    let dir = tempfile::TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::replying("ok"));
    let pipeline = built_pipeline(&dir, generator, false).await;

    let answer = pipeline
        .answer("c1", "simulation software", Some(2))
        .await
        .unwrap();
    assert!(answer.sources.len() <= 2);
    for pair in answer.sources.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    pipeline.shutdown().await;
}
