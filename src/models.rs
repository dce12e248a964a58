//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks and scored passages that flow
//! through the build phase (load → chunk → index) and the query phase
//! (retrieve → rerank → answer).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key naming a document's origin (file name, URL, or article URL).
pub const META_SOURCE: &str = "source";
/// Metadata key for a human-readable title, when the source has one.
pub const META_TITLE: &str = "title";
/// Metadata key for the 0-based page number of a PDF page document.
pub const META_PAGE: &str = "page";

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Web,
    Encyclopedia,
}

/// Raw file contents handed over by the presentation layer.
#[derive(Debug, Clone)]
pub struct FileBlob {
    /// Original file name, including extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name as the blob name.
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// A loaded text document with provenance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub kind: SourceKind,
    /// Always contains [`META_SOURCE`].
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>, kind: SourceKind, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_SOURCE.to_string(), source.into());
        Self {
            text: text.into(),
            kind,
            metadata,
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(META_SOURCE)
            .map(String::as_str)
            .unwrap_or("N/A")
    }
}

/// A segment of one document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Copied from the parent document.
    pub metadata: BTreeMap<String, String>,
    /// Position of the parent in the loaded document sequence.
    pub document_index: usize,
    /// Contiguous from 0 within the parent document.
    pub chunk_index: usize,
    /// Character offset of the chunk start in the parent text.
    pub start: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(META_SOURCE)
            .map(String::as_str)
            .unwrap_or("N/A")
    }
}

/// A chunk paired with a relevance score (cosine similarity or rerank score).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Comparator for sorting scores best first. A total order: NaN ranks
/// below every number.
pub fn best_first(a: f32, b: f32) -> Ordering {
    let key = |s: f32| if s.is_nan() { f32::NEG_INFINITY } else { s };
    key(b).total_cmp(&key(a))
}
