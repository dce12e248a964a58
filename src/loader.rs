//! Source loading: files, a URL, and an encyclopedia topic.
//!
//! [`Loader::load`] turns whatever the caller supplied into one ordered
//! sequence of [`Document`]s: files first (in the given order), then the URL,
//! then the topic's articles. Each input is optional; with none of them the
//! result is empty and it is up to the caller to treat that as a user error.
//!
//! Files are recognised by suffix (`.pdf`, `.txt`, case-insensitive). Any
//! other file is skipped with a warning and listed in
//! [`LoadOutcome::skipped`] instead of failing the whole load.
//!
//! Uploaded bytes are written to a [`tempfile::NamedTempFile`] for
//! extraction, on the blocking pool together with the parse itself. The temp
//! file is removed when it goes out of scope, whether extraction succeeded
//! or not.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{FetchConfig, WikipediaConfig};
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, FileBlob, SourceKind, META_PAGE, META_TITLE};
use crate::web::WebFetcher;
use crate::wikipedia::WikipediaClient;

/// Format of an uploaded file, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Pdf,
    Text,
}

impl FileFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Ok(FileFormat::Pdf)
        } else if lower.ends_with(".txt") {
            Ok(FileFormat::Text)
        } else {
            Err(Error::UnsupportedFormat(name.to_string()))
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            FileFormat::Pdf => ".pdf",
            FileFormat::Text => ".txt",
        }
    }
}

/// A file left out of the load, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Result of [`Loader::load`].
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

pub struct Loader {
    web: WebFetcher,
    wikipedia: WikipediaClient,
}

impl Loader {
    pub fn new(fetch: &FetchConfig, wikipedia: &WikipediaConfig) -> Result<Self> {
        Ok(Self {
            web: WebFetcher::new(fetch)?,
            wikipedia: WikipediaClient::new(wikipedia, &fetch.user_agent)?,
        })
    }

    /// Load every supplied source.
    ///
    /// Unsupported files are skipped. A file that is supported but cannot
    /// be parsed fails with [`Error::Extract`]; an unreachable URL with
    /// [`Error::Fetch`]; a topic with no article with [`Error::Lookup`].
    pub async fn load(
        &self,
        files: &[FileBlob],
        url: Option<&str>,
        topic: Option<&str>,
    ) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();

        for blob in files {
            match load_file(blob).await {
                Ok(docs) => {
                    debug!(file = %blob.name, documents = docs.len(), "loaded file");
                    outcome.documents.extend(docs);
                }
                Err(Error::UnsupportedFormat(name)) => {
                    warn!(file = %name, "skipping file: only .pdf and .txt are supported");
                    outcome.skipped.push(SkippedFile {
                        name,
                        reason: "unsupported format (expected .pdf or .txt)".into(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            outcome.documents.extend(self.web.fetch(url).await?);
        }

        if let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) {
            outcome.documents.extend(self.wikipedia.lookup(topic).await?);
        }

        info!(
            documents = outcome.documents.len(),
            skipped = outcome.skipped.len(),
            "sources loaded"
        );
        Ok(outcome)
    }
}

/// Extract documents from one uploaded file.
///
/// PDFs give one document per non-empty page; text files give one document.
pub async fn load_file(blob: &FileBlob) -> Result<Vec<Document>> {
    load_file_in(blob, &std::env::temp_dir()).await
}

async fn load_file_in(blob: &FileBlob, tmp_dir: &Path) -> Result<Vec<Document>> {
    let format = FileFormat::from_name(&blob.name)?;
    let blob = blob.clone();
    let tmp_dir = tmp_dir.to_path_buf();
    let name = blob.name.clone();
    extract::run_blocking(&name, move || extract_file(&blob, format, &tmp_dir)).await
}

fn extract_file(blob: &FileBlob, format: FileFormat, tmp_dir: &Path) -> Result<Vec<Document>> {
    let mut tmp = tempfile::Builder::new()
        .prefix("docqa-")
        .suffix(format.suffix())
        .tempfile_in(tmp_dir)?;
    tmp.write_all(&blob.bytes)?;
    tmp.flush()?;

    let docs = match format {
        FileFormat::Pdf => extract::pdf_pages(tmp.path(), &blob.name)?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| {
                Document::new(text, SourceKind::File, blob.name.clone())
                    .with_meta(META_TITLE, blob.name.clone())
                    .with_meta(META_PAGE, page.to_string())
            })
            .collect(),
        FileFormat::Text => {
            let bytes = std::fs::read(tmp.path())?;
            vec![Document::new(extract::plain_text(&bytes), SourceKind::File, blob.name.clone())
                .with_meta(META_TITLE, blob.name.clone())]
        }
    };

    // `tmp` drops here and the file is deleted.
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::META_SOURCE;

    fn offline_loader() -> Loader {
        Loader::new(&FetchConfig::default(), &WikipediaConfig::default()).unwrap()
    }

    /// Minimal valid PDF with one page per entry of `pages`. An empty entry
    /// becomes a page that only draws a line, so it has no text layer.
    /// Offsets and stream lengths are computed so pdf-extract can parse it.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        let page_obj = |i: usize| 4 + 2 * i;
        let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", page_obj(i))).collect();

        let mut out = Vec::new();
        let mut offsets = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        offsets.push(out.len());
        out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
                kids.join(" "),
                pages.len()
            )
            .as_bytes(),
        );
        offsets.push(out.len());
        out.extend_from_slice(
            b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
        );
        for (i, text) in pages.iter().enumerate() {
            let content = if text.is_empty() {
                "100 100 m 200 200 l S".to_string()
            } else {
                format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text)
            };
            offsets.push(out.len());
            out.extend_from_slice(
                format!(
                    "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                    page_obj(i),
                    page_obj(i) + 1
                )
                .as_bytes(),
            );
            offsets.push(out.len());
            out.extend_from_slice(
                format!(
                    "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                    page_obj(i) + 1,
                    content.len(),
                    content
                )
                .as_bytes(),
            );
        }

        let xref_start = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", offsets.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
        for offset in &offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", offsets.len() + 1)
                .as_bytes(),
        );
        out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        out.extend_from_slice(b"%%EOF\n");
        out
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(FileFormat::from_name("a.pdf").unwrap(), FileFormat::Pdf);
        assert_eq!(FileFormat::from_name("REPORT.PDF").unwrap(), FileFormat::Pdf);
        assert_eq!(FileFormat::from_name("notes.Txt").unwrap(), FileFormat::Text);
        assert!(matches!(
            FileFormat::from_name("slides.docx"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(FileFormat::from_name("pdf").is_err());
    }

    #[tokio::test]
    async fn test_text_file_document() {
        let blob = FileBlob::new("eiffel.txt", "The Eiffel Tower is in Paris.");
        let docs = load_file(&blob).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "The Eiffel Tower is in Paris.");
        assert_eq!(docs[0].metadata[META_SOURCE], "eiffel.txt");
        assert_eq!(docs[0].kind, SourceKind::File);
    }

    #[tokio::test]
    async fn test_pdf_gives_one_document_per_page() {
        let blob = FileBlob::new(
            "report.pdf",
            pdf_with_pages(&["first page phrase", "second page phrase"]),
        );
        let docs = load_file(&blob).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].text.contains("first page phrase"));
        assert!(docs[1].text.contains("second page phrase"));
        let pages: Vec<&str> = docs.iter().map(|d| d.metadata[META_PAGE].as_str()).collect();
        assert_eq!(pages, vec!["0", "1"]);
        for doc in &docs {
            assert_eq!(doc.kind, SourceKind::File);
            assert_eq!(doc.metadata[META_SOURCE], "report.pdf");
            assert_eq!(doc.metadata[META_TITLE], "report.pdf");
        }
    }

    #[tokio::test]
    async fn test_pdf_blank_pages_are_dropped() {
        let blob = FileBlob::new(
            "scan.pdf",
            pdf_with_pages(&["opening remarks", "", "closing remarks"]),
        );
        let docs = load_file(&blob).await.unwrap();
        assert_eq!(docs.len(), 2);
        let pages: Vec<&str> = docs.iter().map(|d| d.metadata[META_PAGE].as_str()).collect();
        assert_eq!(pages, vec!["0", "2"]);
        assert!(docs[1].text.contains("closing remarks"));
    }

    #[tokio::test]
    async fn test_nothing_supplied_is_empty() {
        let outcome = offline_loader().load(&[], None, None).await.unwrap();
        assert!(outcome.documents.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_files_are_skipped() {
        let files = vec![
            FileBlob::new("slides.pptx", vec![1u8, 2, 3]),
            FileBlob::new("b.txt", "bravo"),
            FileBlob::new("a.txt", "alpha"),
        ];
        let outcome = offline_loader().load(&files, None, Some("  ")).await.unwrap();
        let texts: Vec<&str> = outcome.documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["bravo", "alpha"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].name, "slides.pptx");
    }

    #[tokio::test]
    async fn test_broken_pdf_fails_load() {
        let files = vec![FileBlob::new("broken.pdf", b"%PDF-1.4 truncated".to_vec())];
        let err = offline_loader().load(&files, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }

    #[tokio::test]
    async fn test_temp_copies_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let blob = FileBlob::new("cleanup-check.txt", "some text");
        load_file_in(&blob, dir.path()).await.unwrap();
        let broken = FileBlob::new("cleanup-check.pdf", b"garbage".to_vec());
        assert!(load_file_in(&broken, dir.path()).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
