//! Pre-tokenization of raw text into chunks.
//!
//! Chunks are the unit of BPE: merges are learned and applied inside a
//! chunk and never across a chunk boundary.

use std::iter;

use fancy_regex::Regex;

use crate::types::Token;

/// Split pattern for Devanagari text.
///
/// Alternatives, in priority order:
/// 1. English contraction suffixes.
/// 2. An optional space and a run of numerals.
/// 3. An optional space and a run of Devanagari clusters: a base letter
///    followed by any dependent vowel signs, viramas and other marks, so a
///    consonant stays together with its matras.
/// 4. An optional space and a run of letters.
/// 5. An optional space and a run of anything that is not whitespace,
///    letter or numeral.
/// 6. Whitespace not followed by non-whitespace.
/// 7. Any remaining whitespace.
pub const DEVANAGARI_SPLIT_PATTERN: &str = concat!(
    r"'s|'t|'re|'ve|'m|'ll|'d",
    r"| ?\p{N}+",
    r"| ?(?:",
    r"[\x{0904}-\x{0939}\x{093D}\x{0950}\x{0958}-\x{0961}\x{0970}-\x{097F}",
    r"\x{A8F2}-\x{A8FE}\x{11B00}-\x{11B09}\x{1CD3}\x{1CE9}-\x{1CEC}\x{1CEE}-\x{1CF3}",
    r"\x{1CF5}-\x{1CF6}\x{1CFA}]",
    r"[\x{0900}-\x{0903}\x{093A}-\x{093C}\x{093E}-\x{094F}\x{0951}-\x{0957}\x{0962}-\x{0963}",
    r"\x{A8E0}-\x{A8F1}\x{A8FF}\x{1CD0}-\x{1CD2}\x{1CD4}-\x{1CE8}\x{1CED}\x{1CF4}",
    r"\x{1CF7}-\x{1CF9}]*",
    r")+",
    r"| ?\p{L}+",
    r"| ?[^\s\p{L}\p{N}]+",
    r"|\s+(?!\S)",
    r"|\s+",
);

/// Characters per window when splitting a training corpus.
pub const DEFAULT_WINDOW_CHARS: usize = 1_000_000;

/// Matches ending this close to a window edge are re-split with the next
/// window. Covers the longest contraction ("'ll") plus one character of
/// lookahead.
const WINDOW_GUARD_BYTES: usize = 4;

/// Regex-based text splitter.
#[derive(Debug, Clone)]
pub struct Splitter {
    pattern: Regex,
}

impl Splitter {
    /// Compiles `pattern` into a splitter.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error if `pattern` is invalid.
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Compiles the default [`DEVANAGARI_SPLIT_PATTERN`].
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error if the pattern is rejected by the
    /// regex engine.
    pub fn devanagari() -> Result<Self, fancy_regex::Error> {
        Self::new(DEVANAGARI_SPLIT_PATTERN)
    }

    /// Source of the compiled pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Splits `text` into its ordered, non-overlapping chunks.
    ///
    /// # Errors
    ///
    /// Returns the regex error if matching fails (e.g. backtracking limit
    /// exceeded).
    pub fn split<'t>(&self, text: &'t str) -> Result<Vec<&'t str>, fancy_regex::Error> {
        let mut chunks = Vec::new();

        for mat in self.pattern.find_iter(text) {
            let m = mat?;
            if !m.as_str().is_empty() {
                chunks.push(m.as_str());
            }
        }

        Ok(chunks)
    }

    /// Splits `text` window by window, `window_chars` characters at a time.
    ///
    /// A match that reaches into the last few bytes of a window might
    /// continue past it, so it is held back and re-matched together with the
    /// next window. The output equals [`Splitter::split`] on the whole text
    /// while matching never runs over more than one window plus a carried
    /// partial chunk. A `window_chars` of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns the regex error if matching fails.
    pub fn split_windowed<'t>(
        &self,
        text: &'t str,
        window_chars: usize,
    ) -> Result<Vec<&'t str>, fancy_regex::Error> {
        let mut chunks = Vec::new();
        let mut start = 0;

        for end in window_boundaries(text, window_chars.max(1)) {
            let is_last = end == text.len();
            let window = &text[start..end];
            let mut carry_from = None;

            for mat in self.pattern.find_iter(window) {
                let m = mat?;
                let (m_start, m_end) = (start + m.start(), start + m.end());

                if !is_last && m_end + WINDOW_GUARD_BYTES > end {
                    carry_from = Some(m_start);
                    break;
                }
                if m_end > m_start {
                    chunks.push(&text[m_start..m_end]);
                }
            }

            start = carry_from.unwrap_or(end);
        }

        Ok(chunks)
    }
}

/// Byte offsets at which successive windows of `window_chars` characters
/// end. The last offset is always `text.len()`.
fn window_boundaries(text: &str, window_chars: usize) -> impl Iterator<Item = usize> + '_ {
    text.char_indices()
        .map(|(i, _)| i)
        .skip(window_chars)
        .step_by(window_chars)
        .chain(iter::once(text.len()))
}

/// Converts a chunk into its UTF-8 bytes as byte tokens.
pub fn chunk_to_tokens(chunk: &str) -> Vec<Token> {
    chunk.bytes().map(Token::from).collect()
}
