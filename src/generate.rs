//! Generation provider abstraction and implementations.
//!
//! Defines the [`GenerationProvider`] trait and two HTTP implementations:
//!
//! - **[`OllamaGenerator`]** — `POST /api/generate` on a local Ollama
//!   instance, non-streaming.
//! - **[`OpenAiGenerator`]** — `POST /v1/chat/completions`; with a custom
//!   `url` this also covers OpenAI-compatible local servers (llama.cpp
//!   server and friends).
//!
//! The model is treated as a synchronous request/response capability with a
//! single shared instance per process; callers serialize access. Decoding
//! parameters (temperature, max output tokens) come from configuration, not
//! per call site.
//!
//! Failures are a typed [`GenerateError`] so the pipeline can tag the
//! answer instead of letting the error propagate past the component
//! boundary.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation request failed: {0}")]
    Http(String),
    #[error("generation timed out: {0}")]
    Timeout(String),
    #[error("generation returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// A capability that completes a prompt into text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier, for logs and status output.
    fn model_name(&self) -> &str;

    /// Complete `prompt` with the given decoding parameters.
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerateError>;
}

/// Create the configured [`GenerationProvider`].
pub fn create_provider(config: &GenerationConfig) -> anyhow::Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaGenerator::new(config))),
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

fn classify_send_error(e: reqwest::Error) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout(e.to_string())
    } else {
        GenerateError::Http(e.to_string())
    }
}

/// POST a JSON body and return the parsed response, retrying transient
/// failures with exponential backoff (429/5xx/network; other 4xx fail fast).
async fn post_json_with_retry(
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    timeout_secs: u64,
) -> Result<serde_json::Value, GenerateError> {
    const MAX_RETRIES: u32 = 2;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenerateError::Http(e.to_string()))?;

    let mut last_err = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| GenerateError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = GenerateError::Http(format!("API error {}: {}", status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(classify_send_error(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| GenerateError::Http("request failed after retries".into())))
}

// ============ Ollama Generator ============

/// Text generation through a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": max_tokens,
            },
        });

        let json = post_json_with_retry(
            &format!("{}/api/generate", self.url),
            None,
            &body,
            self.timeout_secs,
        )
        .await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                GenerateError::InvalidResponse("missing response field in Ollama reply".into())
            })
    }
}

// ============ OpenAI-compatible Generator ============

/// Text generation through the OpenAI chat completions API or a compatible
/// local server.
///
/// Requires `OPENAI_API_KEY` unless a custom `url` points at a local server
/// that ignores authentication.
pub struct OpenAiGenerator {
    model: String,
    url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() && config.url.is_none() {
            anyhow::bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerateError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let json = post_json_with_retry(
            &format!("{}/v1/chat/completions", self.url),
            self.api_key.as_deref(),
            &body,
            self.timeout_secs,
        )
        .await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                GenerateError::InvalidResponse("missing choices[0].message.content".into())
            })
    }
}
