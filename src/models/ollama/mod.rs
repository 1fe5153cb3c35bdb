
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ChatMessage, ChatModel, Embedder, GenerationParams};
use crate::config::ModelsConfig;

/// Client for an Ollama-compatible model service.
///
/// Every call is a single attempt; failures propagate to the caller.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    top_k: u32,
}

impl From<&GenerationParams> for ChatOptions {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            num_predict: params.max_tokens,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &ModelsConfig, model: impl Into<String>) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to generate model service URL from config")?;

        Ok(Self {
            base_url,
            model: model.into(),
            batch_size: config.batch_size.max(1),
            api_key: config.api_key.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the service answers at all
    #[inline]
    pub fn ping(&self) -> Result<()> {
        self.list_models()
            .context("Failed to ping model service")?;
        debug!("Server ping successful");
        Ok(())
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let mut request = self.agent.get(url.as_str());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.call();
        let response: ModelsResponse = read_json(response, &url)?;

        debug!("Found {} models", response.models.len());
        Ok(response.models)
    }

    fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {path}"))?;

        let request_json =
            serde_json::to_string(body).context("Failed to serialize model request")?;

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        read_json(request.send(&request_json), &url)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbedResponse = self
            .post_json("/api/embed", &request)
            .context("Failed to generate embeddings")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }
}

fn read_json<R: DeserializeOwned>(
    response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    url: &Url,
) -> Result<R> {
    let mut response = response.with_context(|| format!("Request to {url} failed"))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .with_context(|| format!("Failed to read response from {url}"))?;

    if status != 200 {
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map_or(body, |error| error.error);
        warn!("Model service returned HTTP {} for {}", status, url);
        return Err(anyhow!("Model service error: HTTP {status}: {detail}"));
    }

    serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {url}"))
}

impl Embedder for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_single_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Model service returned no embedding"))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let embedded = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            vectors.extend(embedded);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }
}

impl ChatModel for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: params.into(),
        };

        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let response: ChatResponse = self
            .post_json("/api/chat", &request)
            .context("Failed to generate completion")?;

        Ok(response.message.content)
    }
}
