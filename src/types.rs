//! Type aliases and shared types for BPE training and encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

use std::fmt;

/// Represents a token identifier in the vocabulary.
///
/// IDs 0-255 always denote raw bytes. Learned merges are assigned
/// consecutively from 256 in training order. Special tokens use
/// caller-assigned IDs.
pub type Token = usize;

/// Frequency count for token pairs during training.
pub type TokenFreq = usize;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub type MergeOrder = usize;

/// A sequence of raw bytes.
pub type ByteSeq = Vec<u8>;

/// Number of single-byte tokens at the bottom of every vocabulary.
pub const BYTE_VOCAB_SIZE: usize = 256;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenPair(pub Token, pub Token);

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}
