
use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::models::{ChatModel, Embedder, HandleCache, ModelProvider, OllamaProvider};
use crate::storage::{LocalObjectStore, ObjectStore};

/// Everything a job or handler needs for its whole lifetime: configuration,
/// the object store and the model handles, built on first use
pub struct Context {
    config: Config,
    store: Arc<dyn ObjectStore>,
    models: Arc<dyn ModelProvider>,
    embedders: HandleCache<dyn Embedder>,
    chat_models: HandleCache<dyn ChatModel>,
}

impl Context {
    #[inline]
    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        models: Arc<dyn ModelProvider>,
    ) -> Self {
        Self {
            config,
            store,
            models,
            embedders: HandleCache::default(),
            chat_models: HandleCache::default(),
        }
    }

    /// Filesystem store under `storage.root` and the configured model service
    #[inline]
    pub fn from_config(config: Config) -> Self {
        let store = Arc::new(LocalObjectStore::new(config.storage.root.clone()));
        let models = Arc::new(OllamaProvider::new(config.models.clone()));
        Self::new(config, store, models)
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Handle for the configured embedding model
    #[inline]
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let model_id = &self.config.models.embedding_model;
        self.embedders
            .get_or_try_init(model_id, || self.models.embedder(model_id))
            .with_context(|| format!("Failed to create embedding model {model_id}"))
    }

    /// Handle for the configured chat model
    #[inline]
    pub fn chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        let model_id = &self.config.models.chat_model;
        self.chat_models
            .get_or_try_init(model_id, || self.models.chat_model(model_id))
            .with_context(|| format!("Failed to create chat model {model_id}"))
    }
}
