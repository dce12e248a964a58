//! First-stage retrieval: vector similarity search.
//!
//! The query is embedded with the same [`Embedder`] the index was built
//! with and compared against every chunk vector. Results come back highest
//! similarity first; equal scores keep chunk insertion order.

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::models::ScoredChunk;

/// Return up to `k` chunks of `index` nearest to `query`.
///
/// `k` is clamped to the index size, so a small corpus returns everything
/// it has rather than failing.
///
/// # Errors
///
/// - [`Error::EmptyIndex`] if the index holds no vectors.
/// - [`Error::EmbeddingMismatch`] if `embedder` is not the model the index
///   was built with.
/// - [`Error::Embedding`] if embedding the query fails.
pub async fn search(
    index: &Index,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>> {
    if index.is_empty() {
        return Err(Error::EmptyIndex);
    }
    index.check_compatible(embedder)?;

    let query_vec = embedder.embed_query(query).await?;
    if query_vec.len() != index.dims() {
        return Err(Error::EmbeddingMismatch {
            indexed: format!("{} ({}d)", index.model(), index.dims()),
            query: format!("{} ({}d)", embedder.model_name(), query_vec.len()),
        });
    }

    let results = index.nearest(&query_vec, k);
    debug!(
        k,
        returned = results.len(),
        top_score = results.first().map(|r| r.score),
        "vector search"
    );
    Ok(results)
}
