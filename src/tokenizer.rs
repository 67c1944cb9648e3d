//! Devanagari BPE tokenizer.
//!
//! This module ties the pipeline together:
//! 1. Regex pattern matching to split text into chunks.
//! 2. UTF-8 byte conversion for each chunk.
//! 3. BPE merge application on byte sequences.
//!
//! Special tokens are cut out of the text before splitting, according to an
//! [`AllowedSpecial`] policy, and emitted as their reserved IDs.

use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
    str::FromStr,
};

use fancy_regex::Regex;
use rayon::prelude::*;

use crate::{
    converter::BPEConverter,
    error::{DecodeError, EncodeError, TokenizerInitError, TrainError},
    progress::{NoProgress, ProgressSink, progress_bar},
    splitter::{Splitter, chunk_to_tokens},
    trainer::{BPETrainer, TrainSummary, TrainerConfig},
    types::{ByteSeq, Token, TokenPair},
};

/// Which registered special tokens [`DevanagariTokenizer::encode`] recognizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowedSpecial {
    /// Every registered special token.
    All,
    /// No special tokens; their literal text is encoded as ordinary text.
    None,
    /// No special tokens, and the input must not contain any of them.
    #[default]
    NoneRaise,
    /// Only these strings. Entries that are not registered are ignored.
    Subset(HashSet<String>),
}

impl FromStr for AllowedSpecial {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            "none_raise" => Ok(Self::NoneRaise),
            other => Err(EncodeError::InvalidSpecialPolicy(other.to_string())),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for AllowedSpecial {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::Subset(iter.into_iter().map(Into::into).collect())
    }
}

/// BPE tokenizer with a Devanagari-aware split pattern.
///
/// Holds the split pattern, the learned merges with their vocabulary, and
/// the special-token table. Merges and vocabulary only change by training
/// (or rebuilding with [`DevanagariTokenizer::from_merges`]); the special
/// token table only changes by [`DevanagariTokenizer::register_special_tokens`].
#[derive(Debug, Clone)]
pub struct DevanagariTokenizer {
    splitter: Splitter,
    converter: BPEConverter,
    special_tokens: HashMap<String, Token>,
    inverse_special_tokens: HashMap<Token, String>,
}

impl DevanagariTokenizer {
    /// Creates an untrained tokenizer with the Devanagari split pattern.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidPattern`] if the pattern is
    /// rejected by the regex engine.
    pub fn new() -> Result<Self, TokenizerInitError> {
        Ok(Self::from_parts(Splitter::devanagari()?, BPEConverter::default()))
    }

    /// Creates an untrained tokenizer with a custom split pattern.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidPattern`] if `pattern` fails to
    /// compile.
    pub fn with_pattern(pattern: &str) -> Result<Self, TokenizerInitError> {
        Ok(Self::from_parts(Splitter::new(pattern)?, BPEConverter::default()))
    }

    /// Rebuilds a trained tokenizer from its merge rules.
    ///
    /// # Arguments
    ///
    /// * `merges` - BPE merge rules as `(pair, merged_token)` in training
    ///   order. The k-th rule must mint token `256 + k`.
    /// * `pattern` - Regex pattern string used to split text into chunks.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidPattern`] if `pattern` fails to
    /// compile, or [`TokenizerInitError::InvalidMerge`] for the first rule
    /// that breaks the ID sequence or references a token not yet defined.
    pub fn from_merges(
        merges: impl IntoIterator<Item = (TokenPair, Token)>,
        pattern: &str,
    ) -> Result<Self, TokenizerInitError> {
        let converter = BPEConverter::new(merges)?;
        Ok(Self::from_parts(Splitter::new(pattern)?, converter))
    }

    fn from_parts(splitter: Splitter, converter: BPEConverter) -> Self {
        Self {
            splitter,
            converter,
            special_tokens: HashMap::new(),
            inverse_special_tokens: HashMap::new(),
        }
    }

    /// Learns `vocab_size - 256` merges from `text`.
    ///
    /// With `verbose`, every merge is logged at info level and a progress bar
    /// is drawn.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::VocabSizeTooSmall`] if `vocab_size` is below 256,
    /// [`TrainError::RegexMatch`] if splitting fails, or
    /// [`TrainError::ProgressBarSetup`] if the progress bar cannot be styled.
    pub fn train(
        &mut self,
        text: &str,
        vocab_size: usize,
        verbose: bool,
    ) -> Result<TrainSummary, TrainError> {
        let config = TrainerConfig {
            vocab_size,
            verbose,
            ..TrainerConfig::default()
        };

        if verbose {
            let mut pb = progress_bar(config.num_merges()? as u64, "Merging pairs")?;
            self.train_with_config(text, &config, &mut pb)
        } else {
            self.train_with_config(text, &config, &mut NoProgress)
        }
    }

    /// Learns merges from `text` as configured, reporting each merge to
    /// `progress`.
    ///
    /// Replaces any previously learned merges and vocabulary. On error the
    /// tokenizer is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::VocabSizeTooSmall`] or [`TrainError::EmptyWindow`]
    /// for an invalid config, or [`TrainError::RegexMatch`] if splitting fails.
    pub fn train_with_config(
        &mut self,
        text: &str,
        config: &TrainerConfig,
        progress: &mut dyn ProgressSink,
    ) -> Result<TrainSummary, TrainError> {
        let num_merges = config.num_merges()?;
        let chunks = self.splitter.split_windowed(text, config.window_chars)?;
        log::debug!("split {} bytes into {} chunks", text.len(), chunks.len());

        let mut trainer = BPETrainer::new(chunks);
        let input_len = trainer.token_count();
        let merges = trainer.train(num_merges, config.verbose, progress);

        let summary = TrainSummary {
            merges,
            input_len,
            output_len: trainer.token_count(),
        };
        log::info!(
            "input_len: {}, output_len: {}, compression ratio: {:.2}X",
            summary.input_len,
            summary.output_len,
            summary.compression_ratio()
        );

        let (merge_history, vocab) = trainer.into_parts();
        self.converter = BPEConverter::from_parts(merge_history, vocab);

        Ok(summary)
    }

    /// Replaces the special-token table and its inverse.
    ///
    /// IDs are not checked against the trained vocabulary. When an ID is both,
    /// decoding yields the vocabulary bytes.
    pub fn register_special_tokens(&mut self, special_tokens: HashMap<String, Token>) {
        self.inverse_special_tokens = special_tokens
            .iter()
            .map(|(s, &tok)| (tok, s.clone()))
            .collect();
        self.special_tokens = special_tokens;
        log::debug!("registered {} special tokens", self.special_tokens.len());
    }

    /// Registered special tokens.
    pub fn special_tokens(&self) -> &HashMap<String, Token> {
        &self.special_tokens
    }

    /// Encodes `text` without special-token handling.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::RegexMatch`] if the regex engine fails during
    /// text splitting (e.g. backtracking limit exceeded).
    pub fn encode_ordinary(&self, text: &str) -> Result<Vec<Token>, EncodeError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_tokens = Vec::with_capacity(text.len() / 2);
        for chunk in self.splitter.split(text)? {
            all_tokens.extend(self.encode_chunk(chunk));
        }

        Ok(all_tokens)
    }

    /// Encodes many texts in parallel with [`DevanagariTokenizer::encode_ordinary`].
    ///
    /// # Errors
    ///
    /// Returns the first [`EncodeError::RegexMatch`] raised by any text.
    pub fn encode_ordinary_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Token>>, EncodeError> {
        texts
            .par_iter()
            .map(|text| self.encode_ordinary(text))
            .collect()
    }

    /// Encodes `text`, emitting the special tokens `allowed_special` admits
    /// as their reserved IDs.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::ForbiddenSpecialToken`] under
    /// [`AllowedSpecial::NoneRaise`] if the text contains a registered special
    /// token (the one occurring first), or [`EncodeError::RegexMatch`] if
    /// splitting fails.
    pub fn encode(
        &self,
        text: &str,
        allowed_special: &AllowedSpecial,
    ) -> Result<Vec<Token>, EncodeError> {
        let special: HashMap<&str, Token> = match allowed_special {
            AllowedSpecial::All => self
                .special_tokens
                .iter()
                .map(|(s, &tok)| (s.as_str(), tok))
                .collect(),
            AllowedSpecial::None => HashMap::new(),
            AllowedSpecial::NoneRaise => {
                if let Some(found) = self.first_special_in(text) {
                    return Err(EncodeError::ForbiddenSpecialToken(found.to_string()));
                }
                HashMap::new()
            }
            AllowedSpecial::Subset(allowed) => self
                .special_tokens
                .iter()
                .filter(|(s, _)| allowed.contains(s.as_str()))
                .map(|(s, &tok)| (s.as_str(), tok))
                .collect(),
        };

        if special.is_empty() {
            return self.encode_ordinary(text);
        }

        let mut all_tokens = Vec::with_capacity(text.len() / 2);
        for (segment, special_id) in split_on_special_tokens(text, &special)? {
            match special_id {
                Some(id) => all_tokens.push(id),
                None => all_tokens.extend(self.encode_ordinary(segment)?),
            }
        }

        Ok(all_tokens)
    }

    /// Decodes `tokens` into text, replacing invalid UTF-8 with U+FFFD.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an ID that is neither in the
    /// vocabulary nor a registered special token.
    pub fn decode(&self, tokens: &[Token]) -> Result<String, DecodeError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decodes `tokens` into the raw concatenated bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an ID that is neither in the
    /// vocabulary nor a registered special token.
    pub fn decode_bytes(&self, tokens: &[Token]) -> Result<ByteSeq, DecodeError> {
        self.converter.decode(tokens, &self.inverse_special_tokens)
    }

    /// Learned merges in training order.
    pub fn merges(&self) -> &[(TokenPair, Token)] {
        self.converter.merges()
    }

    /// Byte expansion of every vocabulary ID.
    pub fn vocab(&self) -> &[ByteSeq] {
        self.converter.vocab()
    }

    /// Number of vocabulary IDs, special tokens excluded.
    pub fn vocab_size(&self) -> usize {
        self.converter.vocab().len()
    }

    /// Source of the split pattern.
    pub fn pattern(&self) -> &str {
        self.splitter.pattern()
    }

    #[inline]
    fn encode_chunk(&self, chunk: &str) -> Vec<Token> {
        self.converter.encode(chunk_to_tokens(chunk))
    }

    /// The registered special token that occurs first in `text`; the longest
    /// one if several start at the same offset.
    fn first_special_in(&self, text: &str) -> Option<&str> {
        self.special_tokens
            .keys()
            .filter(|s| !s.is_empty())
            .filter_map(|s| text.find(s.as_str()).map(|pos| (pos, Reverse(s.len()), s.as_str())))
            .min()
            .map(|(_, _, s)| s)
    }
}

/// Segments text into alternating normal and special-token spans.
///
/// Scans `text` for literal occurrences of the `special` keys, longer
/// tokens first where two could match at the same offset. Each matched
/// special token is emitted with its ID; the spans between are emitted as
/// normal segments. Empty normal spans are skipped.
///
/// # Errors
///
/// Returns [`EncodeError::RegexMatch`] if the alternation fails to compile
/// or a match error occurs during scanning.
fn split_on_special_tokens<'t>(
    text: &'t str,
    special: &HashMap<&str, Token>,
) -> Result<Vec<(&'t str, Option<Token>)>, EncodeError> {
    let mut keys: Vec<&str> = special.keys().copied().filter(|s| !s.is_empty()).collect();
    if keys.is_empty() {
        return Ok(vec![(text, None)]);
    }
    keys.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    // escape regex metachars in special tokens
    let pattern = keys
        .iter()
        .map(|s| fancy_regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    let re = Regex::new(&pattern)?;

    let mut segments = Vec::new();
    let mut segment_start = 0;

    for mat in re.find_iter(text) {
        let mat = mat?;
        let Some(&id) = special.get(mat.as_str()) else {
            continue;
        };

        if mat.start() > segment_start {
            segments.push((&text[segment_start..mat.start()], None));
        }
        segments.push((mat.as_str(), Some(id)));
        segment_start = mat.end();
    }

    if segment_start < text.len() {
        segments.push((&text[segment_start..], None));
    }

    Ok(segments)
}
