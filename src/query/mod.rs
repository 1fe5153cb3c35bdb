// Query handler
// Answers one question from the persisted index and the chat model

pub mod prompt;


use anyhow::{Context as _, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::context::Context;
use crate::index::{DEFAULT_INDEX_NAME, VectorIndex};
use crate::invoke::Envelope;

pub const NO_QUESTION_MESSAGE: &str = "No question provided.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub input: Option<String>,
}

impl QueryRequest {
    #[inline]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
        }
    }

    /// Read the question from an invocation event. A missing or non-string
    /// `input` counts as no question.
    #[inline]
    pub fn from_event(event: &Value) -> Self {
        Self {
            input: event
                .get("input")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// The question, unless absent or blank
    #[inline]
    pub fn question(&self) -> Option<&str> {
        self.input
            .as_deref()
            .filter(|input| !input.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResponse {
    Answer(QueryAnswer),
    Rejected { status_code: u16, message: String },
}

impl HandlerResponse {
    #[inline]
    pub fn into_envelope(self) -> Result<Envelope> {
        match self {
            Self::Answer(answer) => Ok(Envelope::ok(
                serde_json::to_string(&answer).context("Failed to serialize answer")?,
            )),
            Self::Rejected {
                status_code,
                message,
            } => Ok(Envelope::new(status_code, message)),
        }
    }
}

/// Answers questions against the index stored under `storage.index_prefix`.
///
/// The index is downloaded and loaded at most once per handler.
pub struct QueryHandler {
    context: Arc<Context>,
    index_dir: OnceLock<PathBuf>,
    index: OnceLock<VectorIndex>,
}

impl QueryHandler {
    #[inline]
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            index_dir: OnceLock::new(),
            index: OnceLock::new(),
        }
    }

    #[inline]
    pub fn handle(&self, request: &QueryRequest) -> Result<HandlerResponse> {
        let Some(question) = request.question() else {
            debug!("Rejecting request without a question");
            return Ok(HandlerResponse::Rejected {
                status_code: 400,
                message: NO_QUESTION_MESSAGE.to_string(),
            });
        };

        let index = self.index()?;
        let config = self.context.config();

        let embedder = self.context.embedder()?;
        let query_vector = embedder
            .embed(question)
            .context("Failed to embed question")?;

        let chunks = index
            .max_marginal_relevance_search(&query_vector, &config.retrieval)
            .context("Failed to retrieve context")?;
        debug!("Retrieved {} chunks for question", chunks.len());

        let messages = prompt::build_messages(&chunks, question);
        let answer = self
            .context
            .chat_model()?
            .complete(&messages, &config.generation)
            .context("Failed to generate answer")?;

        info!("Answered question using {} chunks", chunks.len());

        Ok(HandlerResponse::Answer(QueryAnswer {
            answer,
            sources: prompt::format_sources(&chunks),
        }))
    }

    /// Function entry point: event in, envelope out
    #[inline]
    pub fn handle_event(&self, event: &Value) -> Result<Envelope> {
        self.handle(&QueryRequest::from_event(event))?
            .into_envelope()
    }

    fn index(&self) -> Result<&VectorIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        let dir = self.index_dir()?;
        let loaded = VectorIndex::load(dir, DEFAULT_INDEX_NAME)
            .with_context(|| format!("Failed to load index from {}", dir.display()))?;
        info!(
            "Loaded index with {} chunks built by {}",
            loaded.len(),
            loaded.embedding_model()
        );
        Ok(self.index.get_or_init(|| loaded))
    }

    fn index_dir(&self) -> Result<&Path> {
        if let Some(dir) = self.index_dir.get() {
            return Ok(dir);
        }

        let dir = download_index(&self.context)?;
        Ok(self.index_dir.get_or_init(|| dir))
    }
}

/// Copy every object under the index prefix into the local index cache
fn download_index(context: &Context) -> Result<PathBuf> {
    let config = context.config();
    let bucket = &config.storage.bucket;
    let prefix = config.storage.index_folder();
    let dir = config.index_cache_dir();

    let keys = context
        .store()
        .list(bucket, &prefix)
        .with_context(|| format!("Failed to list index files in {bucket}/{prefix}"))?;
    if keys.is_empty() {
        return Err(anyhow!("No index files found in {bucket}/{prefix}"));
    }

    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create index cache {}", dir.display()))?;

    for key in &keys {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        context
            .store()
            .download(bucket, key, &dir.join(file_name))
            .with_context(|| format!("Failed to download {key}"))?;
    }

    info!("Downloaded {} index files to {}", keys.len(), dir.display());
    Ok(dir)
}
