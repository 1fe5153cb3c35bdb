#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::Result;
use docs_rag::config::Config;
use docs_rag::context::Context;
use docs_rag::models::{ChatMessage, ChatModel, Embedder, GenerationParams, ModelProvider, Role};
use docs_rag::storage::{LocalObjectStore, ObjectStore};
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::FileOptions;

pub const DIMENSION: usize = 256;

/// Hashed bag of words, so texts sharing words end up close together
pub struct WordEmbedder;

impl Embedder for WordEmbedder {
    fn model_id(&self) -> &str {
        "bag-of-words"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(2_166_136_261_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16_777_619));
            vector[hash as usize % DIMENSION] += 1.0;
        }
        Ok(vector)
    }
}

/// Replies with the context block of the system prompt
pub struct ContextEchoChat;

impl ChatModel for ContextEchoChat {
    fn model_id(&self) -> &str {
        "context-echo"
    }

    fn complete(&self, messages: &[ChatMessage], _params: &GenerationParams) -> Result<String> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let context = system
            .split_once("Context: ")
            .map_or("", |(_, context)| context);
        Ok(format!("Based on the documentation: {}", context.trim()))
    }
}

#[derive(Default)]
pub struct StubModels {
    pub embedders_built: AtomicUsize,
    pub chat_models_built: AtomicUsize,
}

impl ModelProvider for StubModels {
    fn embedder(&self, _model_id: &str) -> Result<Arc<dyn Embedder>> {
        self.embedders_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(WordEmbedder))
    }

    fn chat_model(&self, _model_id: &str) -> Result<Arc<dyn ChatModel>> {
        self.chat_models_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ContextEchoChat))
    }
}

pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: Config,
    pub store: LocalObjectStore,
    pub models: Arc<StubModels>,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::default();
        config.storage.root = temp_dir.path().join("storage");
        config.storage.scratch_dir = temp_dir.path().join("scratch");
        config.base_dir = temp_dir.path().to_path_buf();

        let store = LocalObjectStore::new(&config.storage.root);
        store
            .create_bucket(&config.storage.bucket)
            .expect("bucket created");

        Self {
            temp_dir,
            config,
            store,
            models: Arc::new(StubModels::default()),
        }
    }

    pub fn context(&self) -> Arc<Context> {
        Arc::new(Context::new(
            self.config.clone(),
            Arc::new(self.store.clone()),
            Arc::clone(&self.models) as Arc<dyn ModelProvider>,
        ))
    }

    pub fn put(&self, key: &str, bytes: &[u8]) {
        self.store
            .put(&self.config.storage.bucket, key, bytes)
            .expect("object stored");
    }

    pub fn keys(&self, prefix: &str) -> Vec<String> {
        self.store
            .list(&self.config.storage.bucket, prefix)
            .expect("listing succeeds")
    }
}

pub fn zip_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, FileOptions::default())
            .expect("file started");
        writer
            .write_all(contents.as_bytes())
            .expect("file written");
    }
    writer.finish().expect("zip finished").into_inner()
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
