//! # docqa
//!
//! Retrieval-augmented question answering over uploaded files, web pages and
//! encyclopedia articles.
//!
//! Sources are loaded into documents, split into overlapping chunks and
//! embedded into an in-memory index. Each question retrieves the nearest
//! chunks, reranks them with a cross-encoder, and asks a language model to
//! answer from the surviving passages, citing where each one came from.
//!
//! ## Architecture
//!
//! ```text
//!  build phase (once per source set)
//! ┌──────────────┐   ┌─────────┐   ┌───────────┐
//! │    Loader    │──▶│ Chunker │──▶│  Indexer  │──▶ Index (in Session)
//! │ file/URL/wiki│   │ 500/50  │   │  embed    │
//! └──────────────┘   └─────────┘   └───────────┘
//!
//!  query phase (per question)
//! ┌───────────┐   ┌──────────┐   ┌──────────────────┐
//! │ Retriever │──▶│ Reranker │──▶│     Answerer     │──▶ answer + sources
//! │  top_k=6  │   │ top_n=3  │   │ prompt, generate │
//! └───────────┘   └──────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export COHERE_API_KEY=... GROQ_API_KEY=...
//! docqa ask --file notes.txt "Where is the Eiffel Tower?"
//! docqa chat --topic "Eiffel Tower"
//! docqa chunk --url https://example.com/article
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Documents, chunks, scored passages |
//! | [`extract`] | PDF, plain-text and HTML extraction |
//! | [`loader`] | File, URL and topic loading |
//! | [`web`] | URL fetcher |
//! | [`wikipedia`] | Encyclopedia lookup |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`search`] | Vector similarity retrieval |
//! | [`rerank`] | Cross-encoder reranking |
//! | [`generate`] | Generative model client |
//! | [`answer`] | Prompt assembly and answer synthesis |
//! | [`session`] | Per-conversation state |
//! | [`pipeline`] | Composition root |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
mod http;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod search;
pub mod session;
pub mod web;
pub mod wikipedia;

pub use error::{Error, Result};
