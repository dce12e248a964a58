//! Web page fetcher.
//!
//! GETs a single URL and turns the response into [`Document`]s according to
//! its content type: HTML goes through [`extract::html_main_content`], PDF
//! through the per-page PDF extractor, anything textual is taken verbatim.
//! Every failure (bad scheme, transport error, timeout, non-2xx status, no
//! extractable text) is an [`Error::Fetch`].

use std::io::Write;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::extract;
use crate::models::{Document, SourceKind, META_PAGE, META_TITLE};

pub struct WebFetcher {
    client: Client,
    max_chars: usize,
}

impl WebFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_chars: config.max_chars,
        })
    }

    /// Fetch `url` and extract its text. PDFs yield one document per page.
    pub async fn fetch(&self, url: &str) -> Result<Vec<Document>> {
        let parsed = Url::parse(url).map_err(|e| Error::Fetch(format!("invalid URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Fetch(format!(
                "unsupported URL scheme '{}': {}",
                parsed.scheme(),
                url
            )));
        }

        debug!(url, "fetching");
        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Fetch(format!("timed out fetching {}", url))
            } else {
                Error::Fetch(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP {} for {}", status.as_u16(), url)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                Error::Fetch(format!("timed out reading {}", url))
            } else {
                Error::Fetch(format!("failed to read body of {}: {}", url, e))
            }
        })?;

        let documents = if is_pdf_response(&content_type, url) {
            self.pdf_documents(url, &body).await?
        } else if content_type.is_empty() || content_type.contains("html") {
            let html = extract::plain_text(&body);
            let page = extract::html_main_content(&html, self.max_chars);
            let mut doc = Document::new(page.text, SourceKind::Web, url);
            if let Some(title) = page.title {
                doc = doc.with_meta(META_TITLE, title);
            }
            vec![doc]
        } else if content_type.starts_with("text/") {
            let text = extract::truncate_chars(&extract::plain_text(&body), self.max_chars);
            vec![Document::new(text, SourceKind::Web, url)]
        } else {
            return Err(Error::Fetch(format!(
                "no extractable text at {} (content type {})",
                url, content_type
            )));
        };

        let documents: Vec<Document> = documents
            .into_iter()
            .filter(|d| !d.text.trim().is_empty())
            .collect();
        if documents.is_empty() {
            return Err(Error::Fetch(format!("no extractable text at {}", url)));
        }

        let chars: usize = documents.iter().map(|d| d.text.chars().count()).sum();
        info!(url, chars, documents = documents.len(), "fetched page");
        Ok(documents)
    }

    async fn pdf_documents(&self, url: &str, body: &[u8]) -> Result<Vec<Document>> {
        let body = body.to_vec();
        let name = url.to_string();
        let pages = extract::run_blocking(url, move || {
            let mut tmp = tempfile::Builder::new().suffix(".pdf").tempfile()?;
            tmp.write_all(&body)?;
            tmp.flush()?;
            extract::pdf_pages(tmp.path(), &name)
        })
        .await
        .map_err(|e| Error::Fetch(format!("could not extract PDF from {}: {}", url, e)))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(page, text)| {
                Document::new(text, SourceKind::Web, url).with_meta(META_PAGE, page.to_string())
            })
            .collect())
    }
}

/// A declared content type wins; the `.pdf` path suffix only decides when
/// the server sent no type or a generic binary one.
fn is_pdf_response(content_type: &str, url: &str) -> bool {
    match content_type {
        extract::MIME_PDF => true,
        "" | "application/octet-stream" => url_path_is_pdf(url),
        _ => false,
    }
}

fn url_path_is_pdf(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".pdf"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let fetcher = WebFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let config = FetchConfig {
            timeout_secs: 2,
            ..Default::default()
        };
        let fetcher = WebFetcher::new(&config).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[test]
    fn test_url_path_is_pdf() {
        assert!(url_path_is_pdf("https://example.com/paper.PDF?x=1"));
        assert!(!url_path_is_pdf("https://example.com/pdf/index.html"));
    }

    #[test]
    fn test_declared_content_type_beats_pdf_suffix() {
        let url = "https://example.com/paper.pdf";
        assert!(!is_pdf_response("text/html", url));
        assert!(!is_pdf_response("text/plain", url));
        assert!(is_pdf_response("", url));
        assert!(is_pdf_response("application/octet-stream", url));
        assert!(is_pdf_response("application/pdf", "https://example.com/download"));
        assert!(!is_pdf_response("application/octet-stream", "https://example.com/blob"));
    }
}
