//! Overlapping fixed-size text chunker.
//!
//! Splits each [`Document`] into [`Chunk`]s of at most `size` characters.
//! Consecutive chunks of the same document share exactly `overlap`
//! characters, so no context is lost at a split point.
//!
//! # Algorithm
//!
//! 1. Start at character 0 of the document.
//! 2. Take a window of `size` characters. If it reaches the end of the
//!    text, emit it and stop.
//! 3. Otherwise look for a natural cut inside the window, trying a
//!    paragraph break, then a line break, then any whitespace. A cut is only
//!    accepted if the chunk keeps at least `max(size / 2, overlap + 1)`
//!    characters; otherwise the window is hard-cut at `size`.
//! 4. Emit the chunk and start the next one `overlap` characters before
//!    the cut (so after a hard cut, `size - overlap` after the last start).
//!
//! Lengths and offsets are counted in Unicode scalar values, never bytes,
//! so multi-byte characters are never split.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::split_documents;
//! use docqa::models::{Document, SourceKind};
//!
//! let doc = Document::new("0123456789abcdefghij", SourceKind::File, "notes.txt");
//! let chunks = split_documents(&[doc], 10, 2).unwrap();
//! assert_eq!(chunks[0].text, "0123456789");
//! assert_eq!(chunks[1].text, "89abcdefgh");
//! assert_eq!(chunks[1].source(), "notes.txt");
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Split all documents, preserving document order and chunk order.
///
/// Fails with [`Error::InvalidConfig`] unless `0 < size` and `overlap < size`.
/// Blank documents contribute no chunks.
pub fn split_documents(docs: &[Document], size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if size == 0 {
        return Err(Error::InvalidConfig("chunk size must be > 0".into()));
    }
    if overlap >= size {
        return Err(Error::InvalidConfig(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    let mut chunks = Vec::new();
    for (document_index, doc) in docs.iter().enumerate() {
        chunks.extend(chunk_document(document_index, doc, size, overlap));
    }
    Ok(chunks)
}

fn chunk_document(document_index: usize, doc: &Document, size: usize, overlap: usize) -> Vec<Chunk> {
    if doc.text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = doc.text.chars().collect();
    let total = chars.len();
    let min_len = (size / 2).max(overlap + 1);

    let mut chunks = Vec::with_capacity(total / (size - overlap) + 1);
    let mut start = 0;
    loop {
        let mut end = (start + size).min(total);
        if end < total {
            end = natural_cut(&chars, start + min_len, end).unwrap_or(end);
        }

        let text: String = chars[start..end].iter().collect();
        chunks.push(make_chunk(doc, document_index, chunks.len(), start, text));

        if end == total {
            break;
        }
        // end - start >= min_len > overlap, so this always advances
        start = end - overlap;
    }
    chunks
}

/// Find the latest cut position in `[lo, hi]` that falls right after a
/// separator, trying separators from strongest to weakest.
fn natural_cut(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let after_paragraph = |p: usize| p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n';
    let after_newline = |p: usize| p >= 1 && chars[p - 1] == '\n';
    let after_space = |p: usize| p >= 1 && chars[p - 1].is_whitespace();

    let separators: [&dyn Fn(usize) -> bool; 3] = [&after_paragraph, &after_newline, &after_space];
    separators
        .iter()
        .find_map(|is_cut| (lo..=hi).rev().find(|&p| is_cut(p)))
}

fn make_chunk(
    doc: &Document,
    document_index: usize,
    chunk_index: usize,
    start: usize,
    text: String,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        text,
        metadata: doc.metadata.clone(),
        document_index,
        chunk_index,
        start,
        hash,
    }
}
