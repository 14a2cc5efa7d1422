//! Document chunking strategies.
//!
//! A [`Chunker`] splits text into bounded, overlapping passages. Every
//! strategy keeps the same invariants:
//!
//! - the first chunk starts at offset 0
//! - each later chunk starts at the previous chunk's end minus `overlap`
//! - no chunk is longer than `max_len`
//! - the last chunk ends at the end of the text and may be shorter
//!
//! Offsets and lengths count Unicode scalar values, never bytes, so a chunk
//! boundary can not fall inside a multi-byte character. Strategies differ
//! only in *where* inside the allowed window a chunk ends:
//!
//! - [`SplitStrategy::FixedWidth`] always cuts at `max_len`
//! - [`SplitStrategy::SentenceAware`] prefers the last sentence end in the window
//! - [`SplitStrategy::ParagraphAware`] prefers blank lines, then line breaks,
//!   then sentence ends, then whitespace
//!
//! All of them fall back to a hard cut when no preferred boundary exists.

use std::iter::FusedIterator;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// How a chunk end is chosen inside its allowed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Cut exactly every `max_len` characters.
    FixedWidth,
    /// End chunks after sentence punctuation followed by whitespace.
    SentenceAware,
    /// End chunks at paragraph, line, sentence or word boundaries.
    ParagraphAware,
}

/// A boundary kind, tried in order of preference.
#[derive(Debug, Clone, Copy)]
enum Break {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
}

impl SplitStrategy {
    fn preferred_breaks(self) -> &'static [Break] {
        match self {
            Self::FixedWidth => &[],
            Self::SentenceAware => &[Break::Sentence],
            Self::ParagraphAware => {
                &[Break::Paragraph, Break::Line, Break::Sentence, Break::Whitespace]
            }
        }
    }
}

/// A bounded passage of a document.
///
/// `start` and `end` are character offsets into the source text; `text`
/// borrows the corresponding slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of this chunk in the sequence, starting at 0.
    pub index: usize,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    /// The chunk text.
    pub text: &'a str,
}

impl Chunk<'_> {
    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Splits text into overlapping chunks using a [`SplitStrategy`].
///
/// # Example
///
/// ```rust
/// use mria_rag::chunking::{Chunker, SplitStrategy};
///
/// let chunker = Chunker::new(20, 5, SplitStrategy::FixedWidth)?;
/// let chunks: Vec<_> = chunker.chunks("A cat sat on a mat. The mat was red.").collect();
/// assert_eq!(chunks.len(), 3);
/// assert_eq!(chunks[1].start, chunks[0].end - 5);
/// # Ok::<(), mria_rag::RagError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_len: usize,
    overlap: usize,
    strategy: SplitStrategy,
}

impl Chunker {
    /// Create a new `Chunker`.
    ///
    /// # Arguments
    ///
    /// * `max_len` - maximum number of characters per chunk
    /// * `overlap` - number of characters shared by consecutive chunks
    /// * `strategy` - where inside the window a chunk should end
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidArgument`] if `max_len == 0` or
    /// `overlap >= max_len`.
    pub fn new(max_len: usize, overlap: usize, strategy: SplitStrategy) -> Result<Self> {
        if max_len == 0 {
            return Err(RagError::InvalidArgument("max_len must be greater than zero".into()));
        }
        if overlap >= max_len {
            return Err(RagError::InvalidArgument(format!(
                "overlap ({overlap}) must be less than max_len ({max_len})"
            )));
        }
        Ok(Self { max_len, overlap, strategy })
    }

    /// Return the maximum chunk length in characters.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Return the overlap in characters.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Return the split strategy.
    pub fn strategy(&self) -> SplitStrategy {
        self.strategy
    }

    /// Return a copy of this chunker using a different strategy.
    pub fn with_strategy(self, strategy: SplitStrategy) -> Self {
        Self { strategy, ..self }
    }

    /// Lazily split `text` into chunks.
    ///
    /// Empty text yields an empty sequence. The returned iterator is
    /// `Clone`; cloning it before consumption restarts the sequence.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        let offsets: Arc<[usize]> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let next_start = if text.is_empty() { None } else { Some(0) };
        Chunks { text, offsets, chunker: *self, next_start, index: 0 }
    }
}

/// Split `text` into fixed-width chunks of at most `max_len` characters,
/// consecutive chunks sharing `overlap` characters.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] if `max_len == 0` or
/// `overlap >= max_len`.
pub fn chunk(text: &str, max_len: usize, overlap: usize) -> Result<Chunks<'_>> {
    Ok(Chunker::new(max_len, overlap, SplitStrategy::FixedWidth)?.chunks(text))
}

/// Lazy iterator over the chunks of a text. See [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every character, plus `text.len()` as a sentinel.
    offsets: Arc<[usize]>,
    chunker: Chunker,
    next_start: Option<usize>,
    index: usize,
}

impl<'a> Chunks<'a> {
    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_at(&self, pos: usize) -> char {
        self.text[self.offsets[pos]..].chars().next().unwrap_or('\0')
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.offsets[start]..self.offsets[end]]
    }

    /// Whether a chunk may end right before character `pos`.
    fn is_break(&self, kind: Break, pos: usize) -> bool {
        let prev = self.char_at(pos - 1);
        match kind {
            Break::Paragraph => pos >= 2 && prev == '\n' && self.char_at(pos - 2) == '\n',
            Break::Line => prev == '\n',
            Break::Sentence => {
                pos >= 2 && prev.is_whitespace() && matches!(self.char_at(pos - 2), '.' | '!' | '?')
            }
            Break::Whitespace => prev.is_whitespace(),
        }
    }

    /// Pick the end of a chunk starting at `start`, given the hard limit.
    ///
    /// The end must stay above `start + overlap` so the next chunk begins
    /// strictly after this one.
    fn find_end(&self, start: usize, hard_end: usize) -> usize {
        let lowest = start + self.chunker.overlap + 1;
        for &kind in self.chunker.strategy.preferred_breaks() {
            if let Some(pos) = (lowest..=hard_end).rev().find(|&pos| self.is_break(kind, pos)) {
                return pos;
            }
        }
        hard_end
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let start = self.next_start?;
        let total = self.char_count();
        let hard_end = (start + self.chunker.max_len).min(total);
        let end = if hard_end == total { total } else { self.find_end(start, hard_end) };

        self.next_start = (end < total).then(|| end - self.chunker.overlap);
        let chunk = Chunk { index: self.index, start, end, text: self.slice(start, end) };
        self.index += 1;
        Some(chunk)
    }
}

impl FusedIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    const MAT: &str = "A cat sat on a mat. The mat was red.";

    #[test]
    fn rejects_invalid_sizes() {
        assert!(matches!(chunk(MAT, 0, 0), Err(RagError::InvalidArgument(_))));
        assert!(matches!(chunk(MAT, 5, 5), Err(RagError::InvalidArgument(_))));
        assert!(matches!(chunk(MAT, 5, 9), Err(RagError::InvalidArgument(_))));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(chunk("", 10, 2).unwrap().count(), 0);
    }

    #[test]
    fn fixed_width_offsets() {
        let chunks: Vec<_> = chunk(MAT, 20, 5).unwrap().collect();
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 20), (15, 35), (30, 36)]);
        assert_eq!(chunks[1].text, "mat. The mat was red");
        assert_eq!(chunks[2].text, "s red.");
    }

    #[test]
    fn text_shorter_than_window_is_one_chunk() {
        let chunks: Vec<_> = chunk("short", 100, 10).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
    }

    #[test]
    fn sentence_aware_prefers_sentence_end() {
        let chunker = Chunker::new(30, 4, SplitStrategy::SentenceAware).unwrap();
        let text = "First one. Second sentence is long enough to wrap.";
        let first = chunker.chunks(text).next().unwrap();
        assert_eq!(first.text, "First one. ");
    }

    #[test]
    fn paragraph_aware_prefers_blank_line() {
        let chunker = Chunker::new(40, 5, SplitStrategy::ParagraphAware).unwrap();
        let text = "# Intro\nShort para.\n\nNext paragraph keeps on going for a while.";
        let first = chunker.chunks(text).next().unwrap();
        assert_eq!(first.text, "# Intro\nShort para.\n\n");
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ✓✓✓";
        let chunks: Vec<_> = chunk(text, 7, 2).unwrap().collect();
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 7));
        assert_eq!(chunks.last().map(|c| c.end), Some(text.chars().count()));
    }

    #[test]
    fn iterator_is_restartable() {
        let chunks = chunk(MAT, 10, 3).unwrap();
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);
    }
}
