use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub documents: Vec<DocumentConfig>,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Location of the SQLite index snapshot. Deleting this file forces a
    /// rebuild on the next run.
    pub path: PathBuf,
}

/// One manual to ingest.
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub path: PathBuf,
    /// Chapter-end page indices (0-based, exclusive). When present the
    /// segmenter cuts chapters at these pages; when absent it falls back to
    /// heading detection.
    #[serde(default)]
    pub chapter_ends: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterConfig {
    /// `auto` uses per-document `chapter_ends` where configured and heading
    /// detection otherwise; `headings` ignores page boundaries entirely.
    #[serde(default = "default_segmenter_policy")]
    pub policy: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            policy: default_segmenter_policy(),
        }
    }
}

fn default_segmenter_policy() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks handed to the prompt per question. Small on purpose — a large
    /// K inflates the prompt faster than it improves answers.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, or `local` (requires the
    /// `local-embeddings-fastembed` feature).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for HTTP providers (e.g. `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `ollama` or `openai` (the latter also covers OpenAI-compatible local
    /// servers via `url`).
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Upper bound, in characters, for the assembled prompt. Retrieved
    /// context is dropped lowest-rank-first to stay under it.
    #[serde(default = "default_context_window_chars")]
    pub context_window_chars: usize,
    /// Whether chat history is placed in the prompt. Off by default: feeding
    /// prior turns back in measurably degraded answer quality.
    #[serde(default)]
    pub include_history: bool,
    /// Short phrase naming what the assistant answers questions about,
    /// used in the prompt framing (e.g. "the INTEGRATION simulation manuals").
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            context_window_chars: default_context_window_chars(),
            include_history: false,
            domain: default_domain(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "mistral".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_output_tokens() -> u32 {
    512
}
fn default_context_window_chars() -> usize {
    12_000
}
fn default_domain() -> String {
    "the indexed manuals".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chars {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.max_chars ({})",
            config.chunking.overlap,
            config.chunking.max_chars
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Validate segmenter
    match config.segmenter.policy.as_str() {
        "auto" | "headings" => {}
        other => anyhow::bail!(
            "Unknown segmenter policy: '{}'. Must be auto or headings.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "ollama" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama, openai, or local.",
            other
        ),
    }
    if config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be ollama or openai.",
            other
        ),
    }
    if config.generation.context_window_chars == 0 {
        anyhow::bail!("generation.context_window_chars must be > 0");
    }

    // Validate documents
    for doc in &config.documents {
        if doc.id.trim().is_empty() {
            anyhow::bail!("documents entry with path {} has an empty id", doc.path.display());
        }
    }

    Ok(config)
}

impl DocumentConfig {
    /// Display title, falling back to the document id.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}
