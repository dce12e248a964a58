//! Format-specific text extraction.
//!
//! The loader hands over bytes (or a temp file path) plus a format hint;
//! this module returns plain UTF-8 text:
//!
//! - **PDF**: one string per page via `pdf-extract`.
//! - **Plain text**: lossy UTF-8 decode, BOM stripped.
//! - **HTML**: main-content text via `scraper`, trying semantic containers
//!   before falling back to `<body>` with navigation and script noise removed.
//!
//! Extraction never panics on bad input: callers run PDF parsing through
//! [`run_blocking`] and a panic there is reported as [`Error::Extract`].

use std::path::Path;

use scraper::{ElementRef, Html, Node, Selector};

use crate::error::{Error, Result};

pub const MIME_PDF: &str = "application/pdf";

/// Content containers tried in priority order before falling back to `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    "#mw-content-text",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article__body",
    ".content-body",
    "#article-body",
    "#content",
    ".prose",
];

/// A container must yield at least this much text to be preferred over `<body>`.
const MIN_CONTAINER_CHARS: usize = 200;

/// Elements whose text is never content.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
    "svg", "iframe", "button",
];

/// Elements that end a paragraph in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "li",
    "ul", "ol", "tr", "table", "blockquote", "pre", "br", "hr", "dd", "dt", "figcaption",
];

/// Extract the text of each page of the PDF at `path`.
///
/// Pages are returned in order; a page with no text layer yields an empty
/// string so page numbers stay aligned with the file. This blocks, so async
/// callers go through [`run_blocking`].
pub fn pdf_pages(path: &Path, source_name: &str) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path).map_err(|e| Error::Extract {
        source_name: source_name.to_string(),
        message: format!("PDF extraction failed: {}", e),
    })
}

/// Run file I/O and parsing for `source_name` on the blocking pool.
///
/// A panic inside `job` comes back as [`Error::Extract`].
pub async fn run_blocking<T, F>(source_name: &str, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| Error::Extract {
            source_name: source_name.to_string(),
            message: format!("extraction task aborted: {}", e),
        })?
}

/// Decode plain text, replacing invalid UTF-8 sequences.
pub fn plain_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Text and title pulled from an HTML page.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlPage {
    pub title: Option<String>,
    pub text: String,
}

/// Extract the main readable content of an HTML document.
///
/// Paragraph structure is kept as blank-line separated blocks so the chunker
/// can still cut on paragraph boundaries. Output is capped at `max_chars`
/// characters.
pub fn html_main_content(html: &str, max_chars: usize) -> HtmlPage {
    let document = Html::parse_document(html);
    let title = page_title(&document);

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element_text(element);
            if text.chars().count() >= MIN_CONTAINER_CHARS {
                return HtmlPage {
                    title,
                    text: truncate_chars(&text, max_chars),
                };
            }
        }
    }

    let text = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next().map(element_text))
        .unwrap_or_default();

    HtmlPage {
        title,
        text: truncate_chars(&text, max_chars),
    }
}

fn page_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// Visible text of `element` with noise elements skipped.
fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);

    // '\n' marks block ends; every other whitespace run becomes one space.
    raw.split('\n')
        .map(|block| block.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(el) => {
                let name = el.name();
                if NOISE_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Keep at most `max_chars` characters, cutting back to a word boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_end, _)) => {
            let head = &text[..byte_end];
            match head.rfind(char::is_whitespace) {
                Some(cut) if cut > 0 => head[..cut].trim_end().to_string(),
                _ => head.to_string(),
            }
        }
    }
}
