//! Text Chunking Strategies
//!
//! Splits extracted text into overlapping passages. Three strategies are
//! supported: sentence-aware, paragraph-aware, and fixed-size windows.
//! Sizes are counted in Unicode scalar values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Strategy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Sentence,
    Paragraph,
    Fixed,
}

impl FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("Unknown chunking strategy: {other}")),
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentence => write!(f, "sentence"),
            Self::Paragraph => write!(f, "paragraph"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// Chunk text using the given strategy.
///
/// Empty or whitespace-only input yields an empty list. Callers must ensure
/// `overlap < chunk_size` (enforced at configuration load).
pub fn chunk_text(
    text: &str,
    strategy: ChunkStrategy,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    debug_assert!(overlap < chunk_size);

    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chunks = match strategy {
        ChunkStrategy::Sentence => chunk_by_sentences(text, chunk_size, overlap),
        ChunkStrategy::Paragraph => chunk_by_paragraphs(text, chunk_size, overlap),
        ChunkStrategy::Fixed => chunk_by_fixed_size(text, chunk_size, overlap),
    };

    log::debug!("Created {} chunks using {} strategy", chunks.len(), strategy);
    chunks
}

/// Split at `[.!?]` followed by whitespace and an ASCII uppercase letter.
/// The separating whitespace is consumed.
fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].1.is_ascii_uppercase() {
                sentences.push(&text[start..pos + c.len_utf8()]);
                start = chars[j].0;
                i = j;
                continue;
            }
        }
        i += 1;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Greedily pack sentences up to `chunk_size`; seed each new chunk with the
/// trailing sentences of the previous one whose total length fits `overlap`.
fn chunk_by_sentences(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sentences = split_sentences(text);

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;

    for sentence in sentences {
        let sentence_size = sentence.chars().count();

        if current_size + sentence_size > chunk_size && !current.is_empty() {
            chunks.push(current.join(" "));

            let mut seed: Vec<&str> = Vec::new();
            let mut seed_size = 0;
            for s in current.iter().rev().copied() {
                let len = s.chars().count();
                if seed_size + len <= overlap {
                    seed.insert(0, s);
                    seed_size += len;
                } else {
                    break;
                }
            }
            current = seed;
            current_size = seed_size;
        }

        current.push(sentence);
        current_size += sentence_size;
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Pack blank-line-separated paragraphs; carry the previous chunk's last
/// paragraph forward only when it fits within `overlap`.
fn chunk_by_paragraphs(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_size = para.chars().count();

        if current_size + para_size > chunk_size && !current.is_empty() {
            chunks.push(current.join("\n\n"));

            match current.last().copied() {
                Some(last) if last.chars().count() <= overlap => {
                    current = vec![last];
                    current_size = last.chars().count();
                }
                _ => {
                    current = Vec::new();
                    current_size = 0;
                }
            }
        }

        current.push(para);
        current_size += para_size;
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

/// Slide a `chunk_size` window with stride `chunk_size - overlap`.
fn chunk_by_fixed_size(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += stride;
    }
    chunks
}
