//! Answer synthesis: retrieve → rerank → prompt → generate.
//!
//! ```text
//! question ──► search(index, top_k) ──► rerank(top_n) ──► context
//!                                                          │
//!                 answer + sources ◄── generate ◄── prompt ┘
//! ```
//!
//! The context is the reranked passages joined by a blank line, in reranked
//! order. Sources are the passages' `source` metadata in that same order,
//! duplicates included, so `sources[i]` always names the origin of the
//! i-th context block.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::Result;
use crate::generate::Generator;
use crate::index::Index;
use crate::models::ScoredChunk;
use crate::rerank::{rerank, Reranker};
use crate::search::search;

/// Build the single-turn instruction prompt.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the question.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\
         Answer:"
    )
}

/// Join passages into the context block, one blank line between passages.
pub fn build_context(passages: &[ScoredChunk]) -> String {
    passages
        .iter()
        .map(|p| p.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A generated answer with its provenance.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// `source` of each passage, in context order.
    pub sources: Vec<String>,
    /// The reranked passages the answer was generated from, with rerank scores.
    pub passages: Vec<ScoredChunk>,
}

/// Runs the query phase against an already built [`Index`].
///
/// Holds shared, read-only service handles; one instance serves every
/// session.
#[derive(Clone)]
pub struct Answerer {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    top_n: usize,
}

impl Answerer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        generator: Arc<dyn Generator>,
        top_k: usize,
        top_n: usize,
    ) -> Self {
        Self {
            embedder,
            reranker,
            generator,
            top_k,
            top_n,
        }
    }

    /// Answer `question` with the configured `top_k` and `top_n`.
    pub async fn answer(&self, question: &str, index: &Index) -> Result<Answer> {
        self.answer_with(question, index, self.top_k, self.top_n)
            .await
    }

    /// Answer `question`, retrieving `top_k` candidates and keeping `top_n`.
    ///
    /// Any failure of the retrieval, rerank or generation step is returned
    /// as is; nothing is retried or degraded here.
    pub async fn answer_with(
        &self,
        question: &str,
        index: &Index,
        top_k: usize,
        top_n: usize,
    ) -> Result<Answer> {
        let candidates = search(index, self.embedder.as_ref(), question, top_k).await?;
        let passages = rerank(self.reranker.as_ref(), question, candidates, top_n).await?;

        let context = build_context(&passages);
        let prompt = build_prompt(&context, question);
        debug!(
            passages = passages.len(),
            prompt_chars = prompt.chars().count(),
            "prompt assembled"
        );

        let text = self.generator.complete(&prompt).await?;
        let sources: Vec<String> = passages.iter().map(|p| p.chunk.source().to_string()).collect();

        info!(
            model = self.generator.model_name(),
            sources = sources.len(),
            "answer generated"
        );
        Ok(Answer {
            text,
            sources,
            passages,
        })
    }
}
