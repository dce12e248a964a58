//! Per-conversation state.
//!
//! A [`Session`] owns the documents and [`Index`] built from one
//! [`SourceSet`] plus the chat history over them. It has two states:
//!
//! ```text
//!            install()                 set_sources(different)
//!   EMPTY ──────────────► INDEXED ─────────────────────────► EMPTY
//! ```
//!
//! Changing the source set discards the index and the history together, so
//! no answer can ever draw on documents from a previous set.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::{Document, FileBlob};

/// One uploaded file as the session remembers it: its name and a SHA-256
/// digest of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSource {
    pub name: String,
    pub sha256: String,
}

impl FileSource {
    pub fn of(blob: &FileBlob) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&blob.bytes);
        Self {
            name: blob.name.clone(),
            sha256: format!("{:x}", hasher.finalize()),
        }
    }
}

/// The user's current choice of sources.
///
/// Files are identified by name and content, so re-uploading a file under
/// the same name with different bytes counts as a new source set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSet {
    pub files: Vec<FileSource>,
    pub url: Option<String>,
    pub topic: Option<String>,
}

impl SourceSet {
    pub fn new(files: &[FileBlob], url: Option<&str>, topic: Option<&str>) -> Self {
        let clean = |s: Option<&str>| s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            files: files.iter().map(FileSource::of).collect(),
            url: clean(url),
            topic: clean(topic),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.url.is_none() && self.topic.is_none()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    User,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Agent => write!(f, "Agent"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub message: String,
    /// Sources cited by an agent turn; empty for user turns.
    pub sources: Vec<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Indexed,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    sources: SourceSet,
    documents: Vec<Document>,
    index: Option<Index>,
    history: Vec<Turn>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            sources: SourceSet::default(),
            documents: Vec::new(),
            index: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        if self.index.is_some() {
            SessionState::Indexed
        } else {
            SessionState::Empty
        }
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The index, or [`Error::EmptyIndex`] when nothing has been built.
    pub fn index(&self) -> Result<&Index> {
        self.index.as_ref().ok_or(Error::EmptyIndex)
    }

    /// Switch to `sources`. Returns `true` (and resets to EMPTY) when the
    /// set differs from the current one; otherwise keeps everything.
    pub fn set_sources(&mut self, sources: SourceSet) -> bool {
        if sources == self.sources {
            return false;
        }
        self.reset();
        self.sources = sources;
        true
    }

    /// Drop documents, index and history.
    pub fn reset(&mut self) {
        self.documents.clear();
        self.index = None;
        self.history.clear();
    }

    /// EMPTY → INDEXED with a freshly built index.
    pub fn install(&mut self, documents: Vec<Document>, index: Index) {
        self.documents = documents;
        self.index = Some(index);
    }

    /// Append one question/answer exchange.
    pub fn record(&mut self, question: &str, answer: &str, sources: Vec<String>) {
        let now = Utc::now();
        self.history.push(Turn {
            role: Role::User,
            message: question.to_string(),
            sources: Vec::new(),
            at: now,
        });
        self.history.push(Turn {
            role: Role::Agent,
            message: answer.to_string(),
            sources,
            at: now,
        });
    }
}
