//! In-memory vector index.
//!
//! [`build_index`] embeds every chunk and stores `(vector, chunk)` pairs in
//! insertion order. Search is exact brute-force cosine similarity, which is
//! plenty for a single-session corpus of a few documents.
//!
//! An [`Index`] is immutable once built. A new document set always gets a
//! freshly built index; there is no incremental insert or delete.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{best_first, Chunk, ScoredChunk};

struct Entry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// Exact nearest-neighbour index over chunk embeddings.
pub struct Index {
    entries: Vec<Entry>,
    model: String,
    dims: usize,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("len", &self.entries.len())
            .field("model", &self.model)
            .field("dims", &self.dims)
            .finish()
    }
}

/// Embed `chunks` with `embedder` and build an [`Index`].
///
/// Texts are sent in batches of `batch_size`. Chunks with identical text
/// (same hash) are embedded once and share the vector.
///
/// # Errors
///
/// - [`Error::EmptyCorpus`] if `chunks` is empty.
/// - [`Error::Embedding`] if the provider fails or returns vectors of the
///   wrong count or dimensionality.
pub async fn build_index(
    chunks: Vec<Chunk>,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<Index> {
    if chunks.is_empty() {
        return Err(Error::EmptyCorpus);
    }

    // Unique texts in first-seen order.
    let mut slot_of: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<String> = Vec::new();
    let slots: Vec<usize> = chunks
        .iter()
        .map(|c| {
            *slot_of.entry(c.hash.as_str()).or_insert_with(|| {
                unique.push(c.text.clone());
                unique.len() - 1
            })
        })
        .collect();

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(unique.len());
    for batch in unique.chunks(batch_size.max(1)) {
        let embedded = embedder.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
        debug!(done = vectors.len(), total = unique.len(), "embedded batch");
    }

    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(Error::Embedding(format!(
            "inconsistent embedding dimensionality: {} vs {}",
            bad.len(),
            dims
        )));
    }
    if dims != embedder.dims() {
        return Err(Error::Embedding(format!(
            "{} produced {}-dimensional vectors, expected {}",
            embedder.model_name(),
            dims,
            embedder.dims()
        )));
    }

    let entries: Vec<Entry> = chunks
        .into_iter()
        .zip(slots)
        .map(|(chunk, slot)| Entry {
            vector: vectors[slot].clone(),
            chunk,
        })
        .collect();

    info!(
        chunks = entries.len(),
        unique = unique.len(),
        model = embedder.model_name(),
        "index built"
    );

    Ok(Index {
        entries,
        model: embedder.model_name().to_string(),
        dims,
    })
}

impl Index {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding model the index was built with.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Fails unless `embedder` is the model this index was built with.
    pub fn check_compatible(&self, embedder: &dyn Embedder) -> Result<()> {
        if embedder.model_name() != self.model || embedder.dims() != self.dims {
            return Err(Error::EmbeddingMismatch {
                indexed: format!("{} ({}d)", self.model, self.dims),
                query: format!("{} ({}d)", embedder.model_name(), embedder.dims()),
            });
        }
        Ok(())
    }

    /// Top-`k` chunks by cosine similarity to `query`, highest first.
    ///
    /// `k` is clamped to the index size. Equal scores keep insertion order.
    pub fn nearest(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| best_first(a.1, b.1));
        scored.truncate(k.min(self.entries.len()));

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_documents;
    use crate::embedding::HashEmbedder;
    use crate::models::{Document, SourceKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps each text to a fixed vector and counts calls.
    struct TableEmbedder {
        table: Vec<(&'static str, Vec<f32>)>,
        calls: AtomicUsize,
        texts_seen: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(table: Vec<(&'static str, Vec<f32>)>) -> Self {
            Self {
                table,
                calls: AtomicUsize::new(0),
                texts_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn model_name(&self) -> &str {
            "table"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    self.table
                        .iter()
                        .find(|(k, _)| k == t)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| vec![0.0, 0.0, 1.0])
                })
                .collect())
        }
    }

    fn chunks_of(texts: &[&str]) -> Vec<Chunk> {
        let docs: Vec<Document> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(*t, SourceKind::File, format!("doc{}.txt", i)))
            .collect();
        split_documents(&docs, 500, 50).unwrap()
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let embedder = HashEmbedder::new(16);
        let err = build_index(Vec::new(), &embedder, 8).await.unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus));
    }

    #[tokio::test]
    async fn test_nearest_sorted_and_clamped() {
        let embedder = TableEmbedder::new(vec![
            ("far away", vec![0.0, 1.0, 0.0]),
            ("very close", vec![1.0, 0.0, 0.0]),
            ("medium", vec![0.5, 0.5, 0.0]),
        ]);
        let index = build_index(chunks_of(&["far away", "very close", "medium"]), &embedder, 2)
            .await
            .unwrap();

        let results = index.nearest(&[1.0, 0.0, 0.0], 10);
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["very close", "medium", "far away"]);
        for w in results.windows(2) {
            assert!(w[0].score >= w[1].score);
        }

        assert_eq!(index.nearest(&[1.0, 0.0, 0.0], 2).len(), 2);
        assert_eq!(index.nearest(&[1.0, 0.0, 0.0], 0).len(), 0);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let embedder = TableEmbedder::new(vec![
            ("first", vec![1.0, 0.0, 0.0]),
            ("second", vec![1.0, 0.0, 0.0]),
            ("third", vec![1.0, 0.0, 0.0]),
        ]);
        let index = build_index(chunks_of(&["first", "second", "third"]), &embedder, 64)
            .await
            .unwrap();
        let texts: Vec<String> = index
            .nearest(&[1.0, 0.0, 0.0], 3)
            .into_iter()
            .map(|r| r.chunk.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_nan_similarity_ranks_last() {
        let embedder = TableEmbedder::new(vec![
            ("corrupt", vec![f32::NAN, 0.0, 0.0]),
            ("close", vec![1.0, 0.0, 0.0]),
            ("far", vec![0.0, 1.0, 0.0]),
        ]);
        let index = build_index(chunks_of(&["corrupt", "close", "far"]), &embedder, 64)
            .await
            .unwrap();
        let results = index.nearest(&[1.0, 0.0, 0.0], 3);
        let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["close", "far", "corrupt"]);
        assert!(results[2].score.is_nan());
    }

    #[tokio::test]
    async fn test_batches_and_dedup() {
        let embedder = TableEmbedder::new(vec![]);
        let index = build_index(chunks_of(&["same", "same", "other", "third"]), &embedder, 2)
            .await
            .unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(embedder.texts_seen.load(Ordering::SeqCst), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_compatibility_check() {
        let builder = HashEmbedder::new(32);
        let index = build_index(chunks_of(&["hello world"]), &builder, 8)
            .await
            .unwrap();
        index.check_compatible(&HashEmbedder::new(32)).unwrap();
        let err = index.check_compatible(&HashEmbedder::new(64)).unwrap_err();
        assert!(matches!(err, Error::EmbeddingMismatch { .. }));
    }
}
