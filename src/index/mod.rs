// Vector index
// Flat in-memory index over chunk embeddings, persisted as a pair of JSON files

pub mod mmr;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::chunking::Chunk;
use mmr::{l2_distance, maximal_marginal_relevance};

pub const DEFAULT_INDEX_NAME: &str = "index";

const VECTORS_SUFFIX: &str = "vectors.json";
const DOCSTORE_SUFFIX: &str = "docstore.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned per question
    pub k: usize,
    /// Nearest neighbours considered before diversity re-ranking
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by diversity
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Cannot build an index without chunks")]
    Empty,
    #[error("Chunk count ({chunks}) does not match vector count ({vectors})")]
    CountMismatch { chunks: usize, vectors: usize },
    #[error("Vector {position} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        found: usize,
    },
    #[error("Empty embedding vector at position {0}")]
    EmptyVector(usize),
    #[error("Entry {position} is for chunk {found}, expected {expected}")]
    IdMismatch {
        position: usize,
        expected: String,
        found: String,
    },
    #[error("Index file not found: {0}")]
    MissingFile(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorsFile {
    dimension: usize,
    entries: Vec<VectorEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorEntry {
    id: String,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocstoreFile {
    created_at: DateTime<Utc>,
    embedding_model: String,
    chunks: Vec<Chunk>,
}

/// Chunks and their embeddings in insertion order. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    embedding_model: String,
    created_at: DateTime<Utc>,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    #[inline]
    pub fn build(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        Self::assemble(chunks, vectors, embedding_model.into(), Utc::now())
    }

    fn assemble(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        embedding_model: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors.first().ok_or(IndexError::Empty)?.len();
        for (position, vector) in vectors.iter().enumerate() {
            if vector.is_empty() {
                return Err(IndexError::EmptyVector(position));
            }
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    found: vector.len(),
                });
            }
        }

        Ok(Self {
            dimension,
            embedding_model,
            created_at,
            chunks,
            vectors,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// File names `save` writes for an index called `name`
    #[inline]
    pub fn file_names(name: &str) -> [String; 2] {
        [
            format!("{name}.{VECTORS_SUFFIX}"),
            format!("{name}.{DOCSTORE_SUFFIX}"),
        ]
    }

    /// Write both index files into `dir`, returning their paths with the
    /// vectors file last
    #[inline]
    pub fn save(&self, dir: &Path, name: &str) -> Result<Vec<PathBuf>, IndexError> {
        fs::create_dir_all(dir)?;
        let [vectors_name, docstore_name] = Self::file_names(name);

        let vectors = VectorsFile {
            dimension: self.dimension,
            entries: self
                .chunks
                .iter()
                .zip(&self.vectors)
                .map(|(chunk, vector)| VectorEntry {
                    id: chunk.id.clone(),
                    vector: vector.clone(),
                })
                .collect(),
        };
        let docstore = DocstoreFile {
            created_at: self.created_at,
            embedding_model: self.embedding_model.clone(),
            chunks: self.chunks.clone(),
        };

        let vectors_path = dir.join(vectors_name);
        let docstore_path = dir.join(docstore_name);
        fs::write(&vectors_path, serde_json::to_vec(&vectors)?)?;
        fs::write(&docstore_path, serde_json::to_vec_pretty(&docstore)?)?;

        info!(
            "Saved index of {} vectors ({} dimensions) to {}",
            self.len(),
            self.dimension,
            dir.display()
        );
        Ok(vec![docstore_path, vectors_path])
    }

    #[inline]
    pub fn load(dir: &Path, name: &str) -> Result<Self, IndexError> {
        let [vectors_name, docstore_name] = Self::file_names(name);
        let vectors: VectorsFile = read_json(&dir.join(vectors_name))?;
        let docstore: DocstoreFile = read_json(&dir.join(docstore_name))?;

        if vectors.entries.len() != docstore.chunks.len() {
            return Err(IndexError::CountMismatch {
                chunks: docstore.chunks.len(),
                vectors: vectors.entries.len(),
            });
        }

        let mut ordered = Vec::with_capacity(vectors.entries.len());
        let entries = vectors.entries.into_iter().zip(&docstore.chunks);
        for (position, (entry, chunk)) in entries.enumerate() {
            if entry.id != chunk.id {
                return Err(IndexError::IdMismatch {
                    position,
                    expected: chunk.id.clone(),
                    found: entry.id,
                });
            }
            if entry.vector.len() != vectors.dimension {
                return Err(IndexError::DimensionMismatch {
                    position,
                    expected: vectors.dimension,
                    found: entry.vector.len(),
                });
            }
            ordered.push(entry.vector);
        }

        let index = Self::assemble(
            docstore.chunks,
            ordered,
            docstore.embedding_model,
            docstore.created_at,
        )?;
        debug!(
            "Loaded index of {} vectors from {}",
            index.len(),
            dir.display()
        );
        Ok(index)
    }

    fn check_query(&self, query: &[f32]) -> Result<(), IndexError> {
        if query.len() == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                found: query.len(),
            })
        }
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, l2_distance(query, vector)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// The `k` chunks nearest to `query` by L2 distance, closest first
    #[inline]
    pub fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(&Chunk, f32)>, IndexError> {
        self.check_query(query)?;
        Ok(self
            .nearest(query, k)
            .into_iter()
            .map(|(i, distance)| (&self.chunks[i], distance))
            .collect())
    }

    /// Fetch the `fetch_k` nearest chunks, then re-rank them for diversity
    /// and keep `k`, in selection order
    #[inline]
    pub fn max_marginal_relevance_search(
        &self,
        query: &[f32],
        config: &RetrievalConfig,
    ) -> Result<Vec<&Chunk>, IndexError> {
        self.check_query(query)?;

        let nearest = self.nearest(query, config.fetch_k.max(config.k));
        let candidates: Vec<&[f32]> = nearest
            .iter()
            .map(|(i, _)| self.vectors[*i].as_slice())
            .collect();

        let picks = maximal_marginal_relevance(query, &candidates, config.k, config.lambda);
        debug!(
            "MMR selected {} of {} candidates",
            picks.len(),
            candidates.len()
        );

        Ok(picks
            .into_iter()
            .map(|pick| &self.chunks[nearest[pick].0])
            .collect())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, IndexError> {
    if !path.is_file() {
        return Err(IndexError::MissingFile(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
