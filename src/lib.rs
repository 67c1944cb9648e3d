//! Byte-pair encoding tokenizer for Devanagari text.
//!
//! Text is split into chunks with a pattern that keeps Devanagari consonants
//! together with their vowel signs, and BPE merges are learned and applied
//! within chunks. See [`DevanagariTokenizer`] for the entry points.
//!
//! With the `python` feature this crate also builds the `_hinditok`
//! extension module.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(unused_must_use)]

mod converter;
pub mod error;
pub mod progress;
pub mod splitter;
pub mod stats;
mod tokenizer;
mod trainer;
pub mod types;

#[cfg(feature = "python")]
mod python;

pub use error::{DecodeError, EncodeError, TokenizerInitError, TrainError};
pub use progress::{MergeEvent, NoProgress, ProgressSink};
pub use splitter::{DEVANAGARI_SPLIT_PATTERN, Splitter};
pub use tokenizer::{AllowedSpecial, DevanagariTokenizer};
pub use trainer::{TrainSummary, TrainerConfig};
pub use types::{ByteSeq, Token, TokenPair};
