//! # docqa CLI
//!
//! Thin presentation shell over the `docqa` library: it gathers sources and
//! questions from the command line, enforces the input rules the library
//! leaves to its caller, and prints answers with their sources.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask <question>` | Build an index from the sources and answer once |
//! | `docqa chat` | Build once, then answer questions read from stdin |
//! | `docqa chunk` | Load and chunk the sources without calling any model |
//!
//! Sources are given with `--file` (at most two, `.pdf` or `.txt`), `--url`
//! and `--topic`; at least one is required.
//!
//! ## Examples
//!
//! ```bash
//! docqa ask --file eiffel.txt "Where is the Eiffel Tower?"
//! docqa chat --topic "Gustave Eiffel"
//! RUST_LOG=docqa=debug docqa chunk --url https://example.com/page
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docqa::answer::Answer;
use docqa::chunk::split_documents;
use docqa::config::{self, Config};
use docqa::loader::{Loader, SkippedFile};
use docqa::models::FileBlob;
use docqa::pipeline::Pipeline;
use docqa::session::{Session, SourceSet};

/// The presentation layer accepts at most this many uploaded files.
const MAX_FILES: usize = 2;

/// Characters of each chunk shown by `docqa chunk`.
const PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Ask questions about files, web pages and encyclopedia articles",
    version,
    long_about = "docqa loads documents from uploaded files, a URL and/or an encyclopedia topic, \
    indexes them for semantic retrieval, and answers questions by retrieving, reranking and \
    synthesizing an answer with a language model. Every answer lists the sources it drew on."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/docqa.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Where the documents come from.
#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// A `.pdf` or `.txt` file to load. Repeat for a second file.
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// A web page to load.
    #[arg(long)]
    url: Option<String>,

    /// An encyclopedia topic to look up.
    #[arg(long)]
    topic: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the sources and answer a single question.
    Ask {
        #[command(flatten)]
        sources: SourceArgs,

        /// The question to answer.
        question: String,

        /// Also print the passages the answer was generated from.
        #[arg(long)]
        show_passages: bool,
    },

    /// Index the sources, then answer questions from stdin until EOF.
    ///
    /// History is kept for the whole conversation. A failed question is
    /// reported and the conversation continues.
    Chat {
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Load and chunk the sources, printing a preview of each chunk.
    ///
    /// No embedding, rerank or generation model is used.
    Chunk {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries answers; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ask {
            sources,
            question,
            show_passages,
        } => run_ask(&cfg, &sources, &question, show_passages).await?,
        Commands::Chat { sources } => run_chat(&cfg, &sources).await?,
        Commands::Chunk { sources } => run_chunk(&cfg, &sources).await?,
    }

    Ok(())
}

fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    debug!(path = %path.display(), "config file not found, using defaults");
    let cfg = Config::default();
    config::validate(&cfg)?;
    Ok(cfg)
}

/// Apply the input rules and read the files.
fn gather(sources: &SourceArgs) -> Result<(SourceSet, Vec<FileBlob>)> {
    if sources.files.len() > MAX_FILES {
        bail!(
            "at most {} files can be loaded at once (got {})",
            MAX_FILES,
            sources.files.len()
        );
    }

    let blobs = sources
        .files
        .iter()
        .map(|p| FileBlob::from_path(p).with_context(|| format!("Failed to read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let set = SourceSet::new(&blobs, sources.url.as_deref(), sources.topic.as_deref());
    if set.is_empty() {
        bail!("no sources given: pass at least one of --file, --url or --topic");
    }
    Ok((set, blobs))
}

async fn build(cfg: &Config, sources: &SourceArgs) -> Result<(Pipeline, Session)> {
    let (set, blobs) = gather(sources)?;
    let pipeline = Pipeline::from_config(cfg).context("Failed to initialize models")?;
    let mut session = Session::new();

    eprintln!("Indexing sources...");
    let report = pipeline
        .process(
            &mut session,
            &blobs,
            set.url.as_deref(),
            set.topic.as_deref(),
        )
        .await
        .context("Failed to build the index")?;
    print_skipped(&report.skipped);
    eprintln!(
        "Indexed {} documents into {} chunks.",
        report.documents, report.chunks
    );
    Ok((pipeline, session))
}

async fn run_ask(
    cfg: &Config,
    sources: &SourceArgs,
    question: &str,
    show_passages: bool,
) -> Result<()> {
    let (pipeline, mut session) = build(cfg, sources).await?;
    let answer = pipeline.ask(&mut session, question).await?;
    print_answer(&answer, show_passages);
    Ok(())
}

async fn run_chat(cfg: &Config, sources: &SourceArgs) -> Result<()> {
    let (pipeline, mut session) = build(cfg, sources).await?;
    eprintln!("Ask a question (Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match pipeline.ask(&mut session, question).await {
            Ok(answer) => print_answer(&answer, false),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    eprintln!("{} exchanges in this session.", session.history().len() / 2);
    Ok(())
}

async fn run_chunk(cfg: &Config, sources: &SourceArgs) -> Result<()> {
    let (set, blobs) = gather(sources)?;
    let loader = Loader::new(&cfg.fetch, &cfg.wikipedia)?;
    let outcome = loader
        .load(&blobs, set.url.as_deref(), set.topic.as_deref())
        .await?;
    print_skipped(&outcome.skipped);

    let chunks = split_documents(&outcome.documents, cfg.chunking.size, cfg.chunking.overlap)?;
    println!(
        "{} documents → {} chunks (size {}, overlap {})\n",
        outcome.documents.len(),
        chunks.len(),
        cfg.chunking.size,
        cfg.chunking.overlap
    );
    for (i, chunk) in chunks.iter().enumerate() {
        let chars = chunk.text.chars().count();
        println!(
            "--- Chunk {} ({} chars, {} #{}, hash {}) ---",
            i + 1,
            chars,
            chunk.source(),
            chunk.chunk_index,
            &chunk.hash[..8]
        );
        let preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
        println!("{}{}\n", preview, if chars > PREVIEW_CHARS { "..." } else { "" });
    }
    Ok(())
}

fn print_skipped(skipped: &[SkippedFile]) {
    for s in skipped {
        eprintln!("Skipped {}: {}", s.name, s.reason);
    }
}

fn print_answer(answer: &Answer, show_passages: bool) {
    println!("{}\n", answer.text);
    println!("Sources:");
    for (i, source) in answer.sources.iter().enumerate() {
        println!("  [{}] {}", i + 1, source);
    }
    if show_passages {
        println!();
        for (i, passage) in answer.passages.iter().enumerate() {
            println!("--- Passage {} (score: {:.4}) ---", i + 1, passage.score);
            println!("{}\n", passage.chunk.text);
        }
    }
    println!();
}
