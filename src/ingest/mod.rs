// Ingestion job
// Zipped markdown in storage → chunks → embeddings → persisted vector index


use anyhow::{Context as _, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::chunking::{Chunk, SourceDocument, split_documents};
use crate::context::Context;
use crate::index::{DEFAULT_INDEX_NAME, VectorIndex};
use crate::invoke::Envelope;

pub const NO_DOCUMENTS_MESSAGE: &str = "No files found in the specified folder.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nothing to index under the raw documents prefix
    NoDocuments,
    Completed {
        documents: usize,
        chunks: usize,
        /// `<bucket>/<index_prefix>`
        location: String,
    },
}

impl IngestOutcome {
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoDocuments => 400,
            Self::Completed { .. } => 200,
        }
    }

    #[inline]
    pub fn message(&self) -> String {
        match self {
            Self::NoDocuments => NO_DOCUMENTS_MESSAGE.to_string(),
            Self::Completed { location, .. } => format!(
                "Files processed successfully and index stored in storage: {location}."
            ),
        }
    }

    #[inline]
    pub fn into_envelope(self) -> Envelope {
        Envelope::new(self.status_code(), self.message())
    }
}

/// Rebuilds the whole index from every archive under the raw documents prefix
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    show_progress: bool,
}

impl Ingestor {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a progress bar on stderr while embedding, if a user is watching
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn run(&self, context: &Context) -> Result<IngestOutcome> {
        let config = context.config();
        config
            .storage
            .validate()
            .context("Invalid storage configuration")?;
        let bucket = &config.storage.bucket;
        let prefix = config.storage.raw_docs_folder();

        let keys = context
            .store()
            .list(bucket, &prefix)
            .with_context(|| format!("Failed to list {bucket}/{prefix}"))?;
        if keys.is_empty() {
            info!("No files found under {}/{}", bucket, prefix);
            return Ok(IngestOutcome::NoDocuments);
        }

        let archives: Vec<&String> = keys
            .iter()
            .filter(|key| {
                let is_archive = **key != prefix && key.ends_with(".zip");
                if !is_archive {
                    debug!("Skipping {}", key);
                }
                is_archive
            })
            .collect();
        if archives.len() > 1 {
            warn!(
                "Found {} archives, indexing documents from all of them: {:?}",
                archives.len(),
                archives
            );
        }

        let mut documents = Vec::new();
        for key in archives {
            let bytes = context
                .store()
                .get(bucket, key)
                .with_context(|| format!("Failed to fetch {key}"))?;
            let extracted =
                read_archive(key, &bytes).with_context(|| format!("Failed to read archive {key}"))?;
            debug!("Read {} documents from {}", extracted.len(), key);
            documents.extend(extracted);
        }

        documents.retain(|document| !document.text.trim().is_empty());
        if documents.is_empty() {
            info!("No document text found under {}/{}", bucket, prefix);
            return Ok(IngestOutcome::NoDocuments);
        }

        let chunks = split_documents(&documents, &config.chunking)?;
        info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let vectors = self.embed_chunks(context, &chunks)?;
        let embedding_model = config.models.embedding_model.clone();
        let chunk_count = chunks.len();
        let index = VectorIndex::build(chunks, vectors, embedding_model)?;

        let build_dir = config.index_build_dir();
        reset_dir(&build_dir)?;
        let files = index
            .save(&build_dir, DEFAULT_INDEX_NAME)
            .context("Failed to save index")?;

        // The vectors file is uploaded last
        let index_folder = config.storage.index_folder();
        for path in &files {
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("Invalid index file name: {}", path.display()))?;
            let key = format!("{index_folder}{file_name}");
            context
                .store()
                .upload_file(bucket, &key, path)
                .with_context(|| format!("Failed to upload {key}"))?;
            debug!("Uploaded {}", key);
        }

        let location = format!("{bucket}/{}", index_folder.trim_end_matches('/'));
        info!("Index of {} chunks stored in {}", chunk_count, location);

        Ok(IngestOutcome::Completed {
            documents: documents.len(),
            chunks: chunk_count,
            location,
        })
    }

    fn embed_chunks(&self, context: &Context, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let embedder = context.embedder()?;
        let batch_size = (context.config().models.batch_size as usize).max(1);

        let bar = if self.show_progress && console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let embedded = embedder
                .embed_batch(&texts)
                .with_context(|| format!("Failed to embed batch of {} chunks", texts.len()))?;
            vectors.extend(embedded);
            bar.inc(batch.len() as u64);
        }
        bar.finish_and_clear();

        Ok(vectors)
    }
}

/// Every file entry of a zip archive as UTF-8 text
fn read_archive(key: &str, bytes: &[u8]) -> Result<Vec<SourceDocument>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("Not a zip archive")?;

    let mut documents = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .with_context(|| format!("{name} is not valid UTF-8 text"))?;

        documents.push(SourceDocument {
            key: format!("{key}!{name}"),
            text,
        });
    }

    Ok(documents)
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(())
}
