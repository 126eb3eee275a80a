//! Paragraph-boundary text chunker.
//!
//! Splits an artifact's text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`);
//! paragraphs longer than the limit are hard-split at a line or word break.
//! Consecutive chunks share up to `overlap_tokens` of trailing context so an
//! answer spanning a boundary can still be retrieved.
//!
//! Each chunk carries a SHA-256 hash of its text; the index uses it to embed
//! repeated passages only once.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks, returning contiguous indices starting at 0.
/// Whitespace-only text yields no chunks.
pub fn chunk_text(source: &Path, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let max_chars = config.max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = config.overlap_tokens * CHARS_PER_TOKEN;

    let mut pieces: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = split_point(remaining, max_chars);
                let piece = remaining[..split_at].trim();
                if !piece.is_empty() {
                    pieces.push(piece.to_string());
                }
                remaining = &remaining[split_at..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    let mut chunks = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        let text = if i > 0 && overlap_chars > 0 {
            let tail = overlap_tail(&pieces[i - 1], overlap_chars);
            if tail.is_empty() {
                piece.clone()
            } else {
                format!("{}\n{}", tail, piece)
            }
        } else {
            piece.clone()
        };
        chunks.push(make_chunk(source, i as i64, &text));
    }
    chunks
}

/// Byte offset at which to cut `s` so the head is at most `max_chars` bytes,
/// preferring a newline, then a space. Always on a char boundary and > 0.
fn split_point(s: &str, max_chars: usize) -> usize {
    if s.len() <= max_chars {
        return s.len();
    }
    let limit = floor_boundary(s, max_chars);
    let head = &s[..limit];
    let cut = head
        .rfind('\n')
        .or_else(|| head.rfind(' '))
        .map(|pos| pos + 1)
        .unwrap_or(limit);
    if cut == 0 {
        // a single char wider than the limit
        s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
    } else {
        cut
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Last `overlap_chars` bytes of `prev`, starting at a word boundary.
fn overlap_tail(prev: &str, overlap_chars: usize) -> &str {
    if prev.len() <= overlap_chars {
        return prev;
    }
    let mut start = prev.len() - overlap_chars;
    while start < prev.len() && !prev.is_char_boundary(start) {
        start += 1;
    }
    let tail = &prev[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

fn make_chunk(source: &Path, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source: source.to_path_buf(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_tokens: usize, overlap_tokens: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens,
            overlap_tokens,
        }
    }

    fn src() -> &'static Path {
        Path::new("books/doc.txt")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text(src(), "Hello, world!", &cfg(700, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_name(), "doc.txt");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text(src(), "", &cfg(700, 0)).is_empty());
        assert!(chunk_text(src(), " \n\n \n", &cfg(700, 0)).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(src(), text, &cfg(700, 0));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(src(), &text, &cfg(10, 2));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_overlap_carries_previous_tail() {
        // max_chars = 20, overlap = 8 chars
        let text = "alpha beta gamma\n\ndelta epsilon zeta";
        let chunks = chunk_text(src(), text, &cfg(5, 2));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "alpha beta gamma");
        assert!(chunks[1].text.starts_with("gamma\n"));
        assert!(chunks[1].text.ends_with("delta epsilon zeta"));
    }

    #[test]
    fn test_long_paragraph_hard_split_multibyte() {
        let text = "ñandú ".repeat(40);
        let chunks = chunk_text(src(), &text, &cfg(3, 0));
        assert!(chunks.len() > 1);
        let rejoined: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined.matches("ñandú").count(), 40);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text(src(), text, &cfg(2, 0));
        let c2 = chunk_text(src(), text, &cfg(2, 0));
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
