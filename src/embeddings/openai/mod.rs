#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::http::{RetryPolicy, build_agent, request_with_retry, run_blocking};
use crate::synthesis::ResponseGenerator;

/// Vector width of `text-embedding-ada-002`
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

const EMBEDDINGS_PATH: &str = "/v1/embeddings";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Client for an OpenAI-compatible embeddings and chat completions API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimension: usize,
    batch_size: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .openai_url()
            .context("Failed to generate OpenAI URL from config")?;
        let settings = &config.openai;

        if settings.api_key.is_none() {
            warn!("No OpenAI API key configured; requests are sent without authorization");
        }

        Ok(Self {
            base_url,
            api_key: settings.api_key.clone(),
            embedding_model: settings.embedding_model.clone(),
            chat_model: settings.chat_model.clone(),
            dimension: settings.embedding_dimension as usize,
            batch_size: (settings.batch_size as usize).max(1),
            agent: build_agent(Duration::from_secs(settings.timeout_seconds)),
            retry: RetryPolicy::new(settings.retry_attempts),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[inline]
    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Embed texts in batches of the configured size, blocking the calling thread
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating embeddings for {} texts with {}",
            texts.len(),
            self.embedding_model
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embedded = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            vectors.extend(embedded);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    /// Ask the chat model to complete a single-turn prompt at temperature 0
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };
        let body = serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.chat_model,
            prompt.len()
        );

        let response_text = self
            .post_json(CHAT_COMPLETIONS_PATH, &body)
            .context("Failed to generate chat completion")?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .context("Failed to parse chat completion response")?;

        let Some(choice) = response.choices.into_iter().next() else {
            warn!("Chat completion returned no choices");
            return Ok(String::new());
        };

        Ok(choice.message.content.unwrap_or_default())
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let body =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .post_json(EMBEDDINGS_PATH, &body)
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|item| item.index);

        response
            .data
            .into_iter()
            .map(|item| {
                if item.embedding.len() == self.dimension {
                    Ok(item.embedding)
                } else {
                    Err(anyhow!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        self.dimension,
                        item.embedding.len()
                    ))
                }
            })
            .collect()
    }

    fn post_json(&self, path: &str, body: &str) -> Result<String> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))?;
        let authorization = self.api_key.as_ref().map(|key| format!("Bearer {}", key));

        request_with_retry(url.as_str(), self.retry, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(value) = &authorization {
                request = request.header("Authorization", value);
            }
            request
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();
        run_blocking(move || client.embed_batch(&texts)).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();
        run_blocking(move || client.complete(&prompt)).await
    }
}
