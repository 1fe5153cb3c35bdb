
use std::collections::VecDeque;

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 250;

/// Separators tried in order, largest semantic unit first
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Raw text of one document pulled out of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Storage key of the archive joined with the entry name
    pub key: String,
    pub text: String,
}

/// A piece of a document ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// Text of the enclosing top-level heading, if any
    pub heading: Option<String>,
    /// Key of the document this chunk was cut from
    pub source: String,
}

/// Configuration for content chunking; sizes are counted in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size
    pub chunk_size: usize,
    /// Maximum text carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk size must be greater than 0")]
    ZeroChunkSize,
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

/// A document section introduced by a top-level heading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingSection {
    pub heading: Option<String>,
    /// Section text, heading line included
    pub content: String,
}

/// Split markdown on level-one headings only.
///
/// Headings are located with a markdown parser, so `#` lines inside fenced
/// code are left alone. The heading line stays at the top of its section.
/// Text ahead of the first heading becomes a section without a heading.
#[inline]
pub fn split_on_headings(text: &str) -> Vec<HeadingSection> {
    let mut boundaries: Vec<(usize, Option<String>)> = vec![(0, None)];
    let mut current_heading: Option<String> = None;

    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) if starts_line(text, range.start) => {
                current_heading = Some(String::new());
                boundaries.push((range.start, None));
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(heading) = current_heading.as_mut() {
                    heading.push_str(&t);
                }
            }
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                if let (Some(heading), Some(last)) =
                    (current_heading.take(), boundaries.last_mut())
                {
                    last.1 = Some(heading.trim().to_string());
                }
            }
            _ => {}
        }
    }

    let mut sections = Vec::with_capacity(boundaries.len());
    for (i, (start, heading)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map_or(text.len(), |(next_start, _)| *next_start);
        let content = text[*start..end].trim();
        if content.is_empty() {
            continue;
        }
        sections.push(HeadingSection {
            heading: heading.clone(),
            content: content.to_string(),
        });
    }

    sections
}

/// True when only indentation precedes `offset` on its line
fn starts_line(text: &str, offset: usize) -> bool {
    text[..offset]
        .rsplit('\n')
        .next()
        .is_none_or(|line_prefix| line_prefix.trim().is_empty())
}

/// Recursive splitter that prefers paragraph, then line, then word, then
/// character boundaries while keeping every chunk within the size bound
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        if config.chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: config.chunk_overlap,
                size: config.chunk_size,
            });
        }
        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }

    /// Split `text` into trimmed, non-empty chunks
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let (separator, finer) = choose_separator(text, separators);

        let mut small: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }

        chunks
    }

    /// Greedily pack pieces into chunks, carrying at most `chunk_overlap`
    /// characters of trailing pieces into the next chunk
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of {} characters, longer than the limit of {}",
                        total, self.chunk_size
                    );
                }

                if !window.is_empty() {
                    if let Some(chunk) = join_window(&window) {
                        merged.push(chunk);
                    }

                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match window.pop_front() {
                            Some((_, dropped)) => total -= dropped,
                            None => break,
                        }
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            merged.push(chunk);
        }

        merged
    }
}

fn choose_separator<'a, 's>(text: &str, separators: &'a [&'s str]) -> (&'s str, &'a [&'s str]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (*separator, &[]);
        }
        if text.contains(separator) {
            return (*separator, &separators[i + 1..]);
        }
    }
    (separators.last().copied().unwrap_or(""), &[])
}

/// Split on `separator`, attaching each separator to the piece that follows it
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (position, _) in text.match_indices(separator) {
        if position > start {
            pieces.push(&text[start..position]);
        }
        start = position;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Heading split followed by the size-bounded recursive split
#[inline]
pub fn split_document(
    document: &SourceDocument,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    let splitter = RecursiveSplitter::new(config)?;
    Ok(chunk_document(document, &splitter))
}

/// Split every document, preserving document order
#[inline]
pub fn split_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkingError> {
    let splitter = RecursiveSplitter::new(config)?;
    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|document| chunk_document(document, &splitter))
        .collect();

    debug!(
        "Split {} documents into {} chunks (avg {} chars)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(|c| char_len(&c.content)).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

fn chunk_document(document: &SourceDocument, splitter: &RecursiveSplitter) -> Vec<Chunk> {
    split_on_headings(&document.text)
        .into_iter()
        .flat_map(|section| {
            splitter
                .split_text(&section.content)
                .into_iter()
                .map(move |content| Chunk {
                    id: Uuid::new_v4().to_string(),
                    content,
                    heading: section.heading.clone(),
                    source: document.key.clone(),
                })
        })
        .collect()
}
