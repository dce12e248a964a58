//! Second-stage retrieval: cross-encoder reranking.
//!
//! A [`Reranker`] scores `(query, passage)` pairs jointly, which ranks more
//! precisely than comparing independent embeddings. [`rerank`] wraps any
//! provider and guarantees the contract callers rely on:
//!
//! - the output is a subsequence of the candidates, never anything new;
//! - it is ordered by descending score, ties in candidate order;
//! - it holds `min(top_n, candidates.len())` passages.
//!
//! Providers:
//! - **[`CohereReranker`]**: hosted rerank API (`POST /v1/rerank`).
//! - **[`LocalReranker`]**: BGE cross-encoder via fastembed (feature
//!   `local-models`).
//! - **[`LexicalReranker`]**: BM25 over the candidate set; offline.
//!
//! A failed scoring call is an [`Error::RerankService`]. There is no silent
//! fallback to the first-stage order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RerankConfig;
use crate::embedding::tokenize;
use crate::error::{Error, Result};
use crate::http;
use crate::models::{best_first, ScoredChunk};

/// Relevance score for one candidate, by position in the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankScore {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Score `documents` against `query`.
    ///
    /// Returns at most `top_n` scores, best first. Indices refer to
    /// positions in `documents`.
    async fn score(&self, query: &str, documents: &[String], top_n: usize)
        -> Result<Vec<RerankScore>>;
}

/// Create the [`Reranker`] named by `config.provider`.
pub fn create_reranker(config: &RerankConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "cohere" => Ok(Arc::new(CohereReranker::new(config)?)),
        #[cfg(feature = "local-models")]
        "local" => Ok(Arc::new(LocalReranker::new(config)?)),
        #[cfg(not(feature = "local-models"))]
        "local" => Err(Error::InvalidConfig(
            "local rerank provider requires the `local-models` feature".into(),
        )),
        "lexical" => Ok(Arc::new(LexicalReranker::default())),
        other => Err(Error::InvalidConfig(format!(
            "unknown rerank provider: {}",
            other
        ))),
    }
}

/// Rerank `candidates` and keep the best `top_n`.
///
/// Scores on the returned chunks are the reranker's, replacing the
/// similarity scores from the first stage.
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<ScoredChunk>,
    top_n: usize,
) -> Result<Vec<ScoredChunk>> {
    let top_n = top_n.min(candidates.len());
    if top_n == 0 {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();
    let mut scores = reranker.score(query, &texts, top_n).await?;

    let mut seen = HashSet::new();
    for s in &scores {
        if s.index >= candidates.len() {
            return Err(Error::RerankService(format!(
                "{} returned index {} for {} candidates",
                reranker.name(),
                s.index,
                candidates.len()
            )));
        }
        if !seen.insert(s.index) {
            return Err(Error::RerankService(format!(
                "{} returned index {} twice",
                reranker.name(),
                s.index
            )));
        }
    }

    scores.sort_by(|a, b| best_first(a.score, b.score).then(a.index.cmp(&b.index)));
    scores.truncate(top_n);

    let mut slots: Vec<Option<ScoredChunk>> = candidates.into_iter().map(Some).collect();
    let reranked: Vec<ScoredChunk> = scores
        .into_iter()
        .filter_map(|s| {
            slots[s.index].take().map(|c| ScoredChunk {
                chunk: c.chunk,
                score: s.score,
            })
        })
        .collect();

    debug!(
        reranker = reranker.name(),
        kept = reranked.len(),
        "reranked candidates"
    );
    Ok(reranked)
}

// ============ Cohere ============

#[derive(Debug, Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    results: Vec<CohereResult>,
}

#[derive(Debug, Deserialize)]
struct CohereResult {
    index: usize,
    relevance_score: f32,
}

/// Reranker backed by the Cohere rerank endpoint.
pub struct CohereReranker {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl CohereReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::InvalidConfig(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::with_key(config, api_key)
    }

    /// Build with an explicit key instead of reading the environment.
    pub fn with_key(config: &RerankConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            model: config.model_name(),
            endpoint: format!("{}/v1/rerank", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            client: http::client(config.timeout_secs, Error::RerankService)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Reranker for CohereReranker {
    fn name(&self) -> &str {
        &self.model
    }

    async fn score(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        let body = CohereRequest {
            model: &self.model,
            query,
            documents,
            top_n,
        };
        let request = || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        };
        let response: CohereResponse =
            http::send_with_retry("Cohere", request, self.max_retries, Error::RerankService)
                .await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| RerankScore {
                index: r.index,
                score: r.relevance_score,
            })
            .collect())
    }
}

// ============ Lexical (BM25) ============

/// Okapi BM25 computed over the candidate set itself.
///
/// Document frequencies come from the candidates, so scores are only
/// comparable within one call. Good enough to put the passage that actually
/// mentions the query terms first when no model is available.
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    k1: f32,
    b: f32,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl LexicalReranker {
    fn scores(&self, query: &str, documents: &[String]) -> Vec<f32> {
        let query_terms: Vec<String> = {
            let mut seen = HashSet::new();
            tokenize(query).filter(|t| seen.insert(t.clone())).collect()
        };
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d).collect()).collect();
        let n = docs.len() as f32;
        let avg_len = (docs.iter().map(Vec::len).sum::<usize>() as f32 / n.max(1.0)).max(1.0);

        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in &query_terms {
                if unique.contains(term.as_str()) {
                    *df.entry(term.as_str()).or_default() += 1;
                }
            }
        }

        docs.iter()
            .map(|doc| {
                let len = doc.len() as f32;
                query_terms
                    .iter()
                    .map(|term| {
                        let tf = doc.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let df = *df.get(term.as_str()).unwrap_or(&0) as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        idf * tf * (self.k1 + 1.0)
                            / (tf + self.k1 * (1.0 - self.b + self.b * len / avg_len))
                    })
                    .sum()
            })
            .collect()
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "bm25"
    }

    async fn score(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        let mut scores: Vec<RerankScore> = self
            .scores(query, documents)
            .into_iter()
            .enumerate()
            .map(|(index, score)| RerankScore { index, score })
            .collect();
        scores.sort_by(|a, b| best_first(a.score, b.score));
        scores.truncate(top_n);
        Ok(scores)
    }
}

// ============ Local cross-encoder (fastembed) ============

/// BGE cross-encoder run locally through fastembed.
///
/// Downloads the model on first use (~300MB). Inference runs on the
/// blocking thread pool.
#[cfg(feature = "local-models")]
pub struct LocalReranker {
    model_name: String,
    model: Arc<std::sync::Mutex<fastembed::TextRerank>>,
}

#[cfg(feature = "local-models")]
impl LocalReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

        let model_name = config.model_name();
        let model = match model_name.as_str() {
            "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unknown local rerank model: '{}'. Supported models: \
                     bge-reranker-base, bge-reranker-v2-m3",
                    other
                )))
            }
        };

        let opts = RerankInitOptions::new(model).with_show_download_progress(true);
        let model = TextRerank::try_new(opts)
            .map_err(|e| Error::RerankService(format!("failed to load reranker: {}", e)))?;

        Ok(Self {
            model_name,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-models")]
#[async_trait]
impl Reranker for LocalReranker {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn score(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankScore>> {
        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents = documents.to_vec();

        let results = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| Error::RerankService("reranker lock poisoned".into()))?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            model
                .rerank(query.as_str(), &docs, false, None)
                .map_err(|e| Error::RerankService(e.to_string()))
        })
        .await
        .map_err(|e| Error::RerankService(format!("rerank task failed: {}", e)))??;

        Ok(results
            .into_iter()
            .take(top_n)
            .map(|r| RerankScore {
                index: r.index,
                score: r.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ScoredChunk};
    use std::collections::BTreeMap;

    fn candidate(text: &str, source: &str) -> ScoredChunk {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), source.to_string());
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                metadata,
                document_index: 0,
                chunk_index: 0,
                start: 0,
                hash: text.to_string(),
            },
            score: 0.5,
        }
    }

    /// Returns a fixed score table, regardless of the query.
    struct FixedReranker(Vec<RerankScore>);

    #[async_trait]
    impl Reranker for FixedReranker {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn score(&self, _: &str, _: &[String], _: usize) -> Result<Vec<RerankScore>> {
            Ok(self.0.clone())
        }
    }

    fn s(index: usize, score: f32) -> RerankScore {
        RerankScore { index, score }
    }

    #[tokio::test]
    async fn test_reorders_and_truncates() {
        let candidates = vec![candidate("a", "1"), candidate("b", "2"), candidate("c", "3")];
        let reranker = FixedReranker(vec![s(2, 0.9), s(0, 0.4), s(1, 0.1)]);
        let out = rerank(&reranker, "q", candidates, 2).await.unwrap();
        let texts: Vec<&str> = out.iter().map(|c| c.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "a"]);
        assert_eq!(out[0].score, 0.9);
    }

    #[tokio::test]
    async fn test_ties_keep_candidate_order() {
        let candidates = vec![candidate("a", "1"), candidate("b", "2"), candidate("c", "3")];
        let reranker = FixedReranker(vec![s(2, 0.5), s(1, 0.5), s(0, 0.5)]);
        let out = rerank(&reranker, "q", candidates, 3).await.unwrap();
        let texts: Vec<&str> = out.iter().map(|c| c.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_nan_score_ranks_last() {
        let candidates = vec![candidate("a", "1"), candidate("b", "2"), candidate("c", "3")];
        let reranker = FixedReranker(vec![s(0, f32::NAN), s(1, 0.2), s(2, 0.7)]);
        let out = rerank(&reranker, "q", candidates, 3).await.unwrap();
        let texts: Vec<&str> = out.iter().map(|c| c.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["c", "b", "a"]);
        assert!(out[2].score.is_nan());
    }

    #[tokio::test]
    async fn test_top_n_clamped_and_empty_input() {
        let reranker = FixedReranker(vec![s(0, 1.0)]);
        let out = rerank(&reranker, "q", vec![candidate("a", "1")], 10).await.unwrap();
        assert_eq!(out.len(), 1);

        let out = rerank(&reranker, "q", Vec::new(), 3).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_service_error() {
        let reranker = FixedReranker(vec![s(5, 1.0)]);
        let err = rerank(&reranker, "q", vec![candidate("a", "1")], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RerankService(_)));
    }

    #[tokio::test]
    async fn test_duplicate_index_is_service_error() {
        let reranker = FixedReranker(vec![s(0, 1.0), s(0, 0.5)]);
        let candidates = vec![candidate("a", "1"), candidate("b", "2")];
        let err = rerank(&reranker, "q", candidates, 2).await.unwrap_err();
        assert!(matches!(err, Error::RerankService(_)));
    }

    #[tokio::test]
    async fn test_lexical_prefers_matching_passage() {
        let reranker = LexicalReranker::default();
        let candidates = vec![
            candidate("Bananas are rich in potassium.", "bananas.txt"),
            candidate("The Eiffel Tower is in Paris.", "eiffel.txt"),
            candidate("Rome has the Colosseum.", "rome.txt"),
        ];
        let out = rerank(&reranker, "Where is the Eiffel Tower?", candidates, 1)
            .await
            .unwrap();
        assert_eq!(out[0].chunk.source(), "eiffel.txt");
    }

    #[tokio::test]
    async fn test_output_is_subsequence_of_input() {
        let reranker = LexicalReranker::default();
        let texts = [
            "alpha beta gamma",
            "beta beta delta",
            "gamma epsilon",
            "zeta eta theta",
            "alpha alpha alpha",
        ];
        for top_n in 0..=6 {
            let candidates: Vec<ScoredChunk> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| candidate(t, &i.to_string()))
                .collect();
            let out = rerank(&reranker, "alpha gamma", candidates.clone(), top_n)
                .await
                .unwrap();
            assert_eq!(out.len(), top_n.min(texts.len()));
            let mut seen = HashSet::new();
            for c in &out {
                assert!(candidates.iter().any(|x| x.chunk == c.chunk));
                assert!(seen.insert(c.chunk.source().to_string()));
            }
        }
    }

    #[test]
    fn test_cohere_response_parsing() {
        let json = r#"{"id":"x","results":[{"index":1,"relevance_score":0.98},
            {"index":0,"relevance_score":0.12}],"meta":{"api_version":{"version":"1"}}}"#;
        let parsed: CohereResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].index, 1);
    }

    #[test]
    fn test_unknown_provider() {
        let config = RerankConfig {
            provider: "magic".into(),
            ..Default::default()
        };
        assert!(matches!(create_reranker(&config), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    #[ignore] // Requires model download, run with: cargo test -- --ignored
    #[cfg(feature = "local-models")]
    async fn test_local_reranker_prefers_relevant() {
        let config = RerankConfig {
            provider: "local".into(),
            ..Default::default()
        };
        let reranker = LocalReranker::new(&config).unwrap();
        let candidates = vec![
            candidate("The weather in London was cloudy.", "weather"),
            candidate("The Eiffel Tower is in Paris.", "eiffel"),
        ];
        let out = rerank(&reranker, "Where is the Eiffel Tower?", candidates, 1)
            .await
            .unwrap();
        assert_eq!(out[0].chunk.source(), "eiffel");
    }
}
