//! Error taxonomy for the question-answering pipeline.
//!
//! Every core operation returns [`Result`]. Variants map one-to-one onto the
//! failure kinds callers need to tell apart:
//!
//! | Variant | Raised by | Fatal? |
//! |---------|-----------|--------|
//! | [`Error::UnsupportedFormat`] | loader | no, the file is skipped |
//! | [`Error::Fetch`] | loader (URL) | for that source |
//! | [`Error::Lookup`] | loader (topic) | for that source |
//! | [`Error::Extract`] | loader (PDF/text) | for that file |
//! | [`Error::InvalidConfig`] | chunker, config | yes |
//! | [`Error::EmptyCorpus`] | indexer | yes |
//! | [`Error::EmptyIndex`] | retriever, session | yes |
//! | [`Error::Embedding`] / [`Error::EmbeddingMismatch`] | indexer, retriever | yes |
//! | [`Error::RerankService`] | reranker | per call |
//! | [`Error::Generation`] | answerer | per call |

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// File extension is neither `.pdf` nor `.txt`.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// URL unreachable, timed out, or yielded no text.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Topic matched no reference article.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// A supported file could not be parsed.
    #[error("extraction failed for {source_name}: {message}")]
    Extract {
        source_name: String,
        message: String,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// No chunks to build an index from.
    #[error("empty corpus: no text could be extracted from the given sources")]
    EmptyCorpus,

    /// The index holds no vectors (or the session has not been built).
    #[error("empty index: build an index before asking questions")]
    EmptyIndex,

    #[error("embedding error: {0}")]
    Embedding(String),

    /// Query-time embedder differs from the one the index was built with.
    #[error("embedding mismatch: index built with {indexed}, queried with {query}")]
    EmbeddingMismatch { indexed: String, query: String },

    #[error("rerank service error: {0}")]
    RerankService(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
