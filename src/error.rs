//! Error types for BPE tokenizer and trainer operations.

use indicatif::style::TemplateError;
use thiserror::Error;

use crate::types::{Token, TokenPair};

/// Errors that can occur while training a vocabulary.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Requested vocabulary is smaller than the 256 single-byte tokens.
    #[error("vocab size must be at least 256, got {0}")]
    VocabSizeTooSmall(usize),
    /// Training window of zero characters.
    #[error("window size must be at least one character")]
    EmptyWindow,
    /// Regex engine failed during text splitting (e.g. backtracking limit exceeded).
    #[error("regex match failed: {0}")]
    RegexMatch(#[from] fancy_regex::Error),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(#[from] TemplateError),
}

/// Errors that can occur during text encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A special-token policy string other than "all", "none" or "none_raise".
    #[error("allowed_special={0:?} not understood")]
    InvalidSpecialPolicy(String),
    /// Input contains a registered special token under the "none_raise" policy.
    #[error("special token {0:?} found in text but special tokens are disallowed")]
    ForbiddenSpecialToken(String),
    /// Regex engine failed during text splitting (e.g. backtracking limit exceeded).
    #[error("regex match failed: {0}")]
    RegexMatch(#[from] fancy_regex::Error),
}

/// Errors that can occur during token decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Token ID is neither in the vocabulary nor a registered special token.
    #[error("invalid token id: {0}")]
    UnknownToken(Token),
}

/// Errors that can occur when initializing a tokenizer.
#[derive(Debug, Error)]
pub enum TokenizerInitError {
    /// The regex pattern failed to compile.
    #[error("invalid split pattern: {0}")]
    InvalidPattern(#[from] fancy_regex::Error),
    /// A merge rule breaks the consecutive-ID invariant or references an
    /// unknown token.
    #[error("invalid merge {pair} -> {token}")]
    InvalidMerge { pair: TokenPair, token: Token },
}
