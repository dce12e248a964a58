//! Composition root for the question-answering pipeline.
//!
//! A [`Pipeline`] is built once at startup from [`Config`], or from
//! explicitly injected services, and then serves any number of sessions.
//! It holds no per-session state; everything that changes lives in the
//! [`Session`] passed to each call.
//!
//! # Build phase
//!
//! [`Pipeline::process`] resets the session if the source set changed, then
//! runs Loader → Chunker → Indexer and installs the new index. Asking about
//! an unchanged, already indexed source set skips the rebuild.
//!
//! # Query phase
//!
//! [`Pipeline::ask`] runs the [`Answerer`] on the session's index and, on
//! success only, appends the exchange to the session history.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::answer::{Answer, Answerer};
use crate::chunk::split_documents;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::{create_embedder, Embedder};
use crate::error::Result;
use crate::generate::{create_generator, Generator};
use crate::index::build_index;
use crate::loader::{Loader, SkippedFile};
use crate::models::FileBlob;
use crate::rerank::{create_reranker, Reranker};
use crate::session::{Session, SessionState, SourceSet};

/// What [`Pipeline::process`] did.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// `false` when the session was already indexed for these sources.
    pub rebuilt: bool,
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
}

/// Long-lived service handles shared by all sessions.
pub struct Services {
    pub loader: Loader,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
    pub generator: Arc<dyn Generator>,
}

impl Services {
    /// Construct every service named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            loader: Loader::new(&config.fetch, &config.wikipedia)?,
            embedder: create_embedder(&config.embedding)?,
            reranker: create_reranker(&config.rerank)?,
            generator: create_generator(&config.generation)?,
        })
    }
}

pub struct Pipeline {
    loader: Loader,
    embedder: Arc<dyn Embedder>,
    answerer: Answerer,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config, Services::from_config(config)?)
    }

    /// Assemble a pipeline from already constructed services.
    pub fn new(config: &Config, services: Services) -> Result<Self> {
        config.chunking.validate()?;
        let answerer = Answerer::new(
            Arc::clone(&services.embedder),
            services.reranker,
            services.generator,
            config.retrieval.top_k,
            config.retrieval.top_n,
        );
        Ok(Self {
            loader: services.loader,
            embedder: services.embedder,
            answerer,
            chunking: config.chunking.clone(),
            batch_size: config.embedding.batch_size,
        })
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Make `session` ready to answer questions about `files`, `url` and
    /// `topic`.
    ///
    /// The source set is derived from these inputs, file contents included,
    /// so any change to them rebuilds the index. Fails with
    /// [`Error::EmptyCorpus`](crate::Error::EmptyCorpus) when the sources
    /// yield no text, leaving the session EMPTY.
    pub async fn process(
        &self,
        session: &mut Session,
        files: &[FileBlob],
        url: Option<&str>,
        topic: Option<&str>,
    ) -> Result<ProcessReport> {
        let span = info_span!("process", session = %session.id());
        let sources = SourceSet::new(files, url, topic);
        self.process_inner(session, sources, files)
            .instrument(span)
            .await
    }

    async fn process_inner(
        &self,
        session: &mut Session,
        sources: SourceSet,
        files: &[FileBlob],
    ) -> Result<ProcessReport> {
        let changed = session.set_sources(sources);
        if !changed && session.state() == SessionState::Indexed {
            info!("sources unchanged, reusing index");
            let index = session.index()?;
            return Ok(ProcessReport {
                rebuilt: false,
                documents: session.documents().len(),
                chunks: index.len(),
                skipped: Vec::new(),
            });
        }
        if changed {
            info!("source set changed, session reset");
        }

        let wanted = session.sources().clone();
        let outcome = self
            .loader
            .load(files, wanted.url.as_deref(), wanted.topic.as_deref())
            .await?;

        let chunks = split_documents(
            &outcome.documents,
            self.chunking.size,
            self.chunking.overlap,
        )?;
        let chunk_count = chunks.len();
        let index = build_index(chunks, self.embedder.as_ref(), self.batch_size).await?;

        let report = ProcessReport {
            rebuilt: true,
            documents: outcome.documents.len(),
            chunks: chunk_count,
            skipped: outcome.skipped,
        };
        session.install(outcome.documents, index);
        info!(
            documents = report.documents,
            chunks = report.chunks,
            "session indexed"
        );
        Ok(report)
    }

    /// Answer `question` from the session's index and record the exchange.
    ///
    /// Fails with [`Error::EmptyIndex`](crate::Error::EmptyIndex) if the
    /// session has not been processed. A failed question leaves the history
    /// untouched.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let span = info_span!("ask", session = %session.id());
        self.ask_inner(session, question).instrument(span).await
    }

    async fn ask_inner(&self, session: &mut Session, question: &str) -> Result<Answer> {
        let answer = self.answerer.answer(question, session.index()?).await?;
        session.record(question, &answer.text, answer.sources.clone());
        Ok(answer)
    }
}
