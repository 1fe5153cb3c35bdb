// Model collaborators
// Embedding and chat traits, their Ollama implementation, and the
// construct-once cache for model handles

pub mod ollama;


use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::config::ModelsConfig;
use ollama::OllamaClient;

/// Text → fixed-length vector
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Prompt messages → generated text
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage], params: &GenerationParams) -> Result<String>;
}

/// Builds model handles for a model identifier
pub trait ModelProvider: Send + Sync {
    fn embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>>;

    fn chat_model(&self, model_id: &str) -> Result<Arc<dyn ChatModel>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling settings sent with every completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 1000,
            top_p: 0.9,
            top_k: 50,
        }
    }
}

/// First-call-computes cache of handles keyed by model identifier.
/// Entries are never evicted or replaced.
pub struct HandleCache<T: ?Sized> {
    handles: Mutex<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Default for HandleCache<T> {
    fn default() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> HandleCache<T> {
    /// Return the cached handle for `key`, building it with `build` on first use.
    /// A failed build caches nothing.
    #[inline]
    pub fn get_or_try_init<F>(&self, key: &str, build: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<Arc<T>>,
    {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(key) {
            return Ok(Arc::clone(handle));
        }

        debug!("Constructing model handle for {}", key);
        let handle = build()?;
        handles.insert(key.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds Ollama clients against the configured model service
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    config: ModelsConfig,
}

impl OllamaProvider {
    #[inline]
    pub fn new(config: ModelsConfig) -> Self {
        Self { config }
    }
}

impl ModelProvider for OllamaProvider {
    fn embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>> {
        Ok(Arc::new(OllamaClient::new(&self.config, model_id)?))
    }

    fn chat_model(&self, model_id: &str) -> Result<Arc<dyn ChatModel>> {
        Ok(Arc::new(OllamaClient::new(&self.config, model_id)?))
    }
}
