//! Core BPE training loop.
//!
//! Every iteration recounts adjacent pairs over all chunks, mints a new token
//! for the most frequent pair and rewrites every chunk with it. Chunks are
//! de-duplicated up front and carry a multiplicity, and both counting and
//! rewriting fan out over chunks with Rayon.

use std::collections::{HashMap, hash_map::Entry};

use rayon::prelude::*;

use crate::{
    error::TrainError,
    progress::{MergeEvent, ProgressSink},
    splitter::{DEFAULT_WINDOW_CHARS, chunk_to_tokens},
    stats::{PairStats, merge},
    types::{BYTE_VOCAB_SIZE, ByteSeq, Token, TokenFreq, TokenPair},
};

/// Configuration for BPE training.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerConfig {
    /// Target vocabulary size, including the 256 byte tokens.
    pub vocab_size: usize,
    /// Characters of text split per window.
    pub window_chars: usize,
    /// Log every merge at info level instead of debug.
    pub verbose: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            vocab_size: BYTE_VOCAB_SIZE,
            window_chars: DEFAULT_WINDOW_CHARS,
            verbose: false,
        }
    }
}

impl TrainerConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            ..Self::default()
        }
    }

    /// Number of merges needed to reach `vocab_size`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::VocabSizeTooSmall`] if `vocab_size` is below 256,
    /// or [`TrainError::EmptyWindow`] if `window_chars` is zero.
    pub fn num_merges(&self) -> Result<usize, TrainError> {
        if self.window_chars == 0 {
            return Err(TrainError::EmptyWindow);
        }
        self.vocab_size
            .checked_sub(BYTE_VOCAB_SIZE)
            .ok_or(TrainError::VocabSizeTooSmall(self.vocab_size))
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSummary {
    /// Merges learned; fewer than requested if the corpus ran out of pairs.
    pub merges: usize,
    /// Corpus length in tokens before any merge (its UTF-8 byte length).
    pub input_len: usize,
    /// Corpus length in tokens after all merges.
    pub output_len: usize,
}

impl TrainSummary {
    /// Ratio of input to output token count; 1.0 for an empty corpus.
    pub fn compression_ratio(&self) -> f64 {
        if self.output_len == 0 {
            return 1.0;
        }
        self.input_len as f64 / self.output_len as f64
    }
}

/// A distinct chunk of the corpus and how many times it occurs.
#[derive(Debug, Clone)]
struct Word {
    ids: Vec<Token>,
    count: TokenFreq,
}

/// Result of one merge iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MergeRecord {
    pub(crate) pair: TokenPair,
    pub(crate) token: Token,
    pub(crate) count: TokenFreq,
}

/// BPE training state.
#[derive(Debug)]
pub(crate) struct BPETrainer {
    /// Distinct chunks in order of first appearance.
    words: Vec<Word>,

    /// Next available merge token ID.
    next_tok: Token,

    /// History of merges in training order.
    merge_history: Vec<(TokenPair, Token)>,

    /// Token ID -> expanded bytes.
    vocab: Vec<ByteSeq>,
}

impl BPETrainer {
    /// Creates a trainer over the chunks of a corpus, in corpus order.
    pub(crate) fn new<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut words: Vec<Word> = Vec::new();

        for chunk in chunks {
            match index.entry(chunk) {
                Entry::Occupied(entry) => {
                    if let Some(word) = words.get_mut(*entry.get()) {
                        word.count += 1;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(words.len());
                    words.push(Word {
                        ids: chunk_to_tokens(chunk),
                        count: 1,
                    });
                }
            }
        }

        let vocab = (0..=u8::MAX).map(|b| vec![b]).collect();

        Self {
            words,
            next_tok: BYTE_VOCAB_SIZE,
            merge_history: Vec::new(),
            vocab,
        }
    }

    /// Perform one merge operation.
    ///
    /// Returns `None` without changing anything if no pair remains.
    pub(crate) fn merge_step(&mut self) -> Option<MergeRecord> {
        let stats = self.count_pairs();
        let (pair, count) = stats.most_frequent()?;

        let new_tok = self.next_tok;
        self.next_tok += 1;

        self.words.par_iter_mut().for_each(|word| {
            if contains_pair(&word.ids, pair) {
                word.ids = merge(&word.ids, pair, new_tok);
            }
        });

        let mut bytes = self.vocab.get(pair.0).cloned().unwrap_or_default();
        if let Some(right) = self.vocab.get(pair.1) {
            bytes.extend_from_slice(right);
        }
        self.vocab.push(bytes);
        self.merge_history.push((pair, new_tok));

        Some(MergeRecord {
            pair,
            token: new_tok,
            count,
        })
    }

    /// Train BPE with up to `num_merges` merges.
    ///
    /// Stops early when no adjacent pair is left. Returns the number of
    /// merges made.
    pub(crate) fn train(
        &mut self,
        num_merges: usize,
        verbose: bool,
        progress: &mut dyn ProgressSink,
    ) -> usize {
        let mut merged = 0;

        for index in 0..num_merges {
            let Some(record) = self.merge_step() else {
                log::info!("no more pairs to merge after {index} merges");
                break;
            };
            merged += 1;

            let expansion = self.token_bytes(record.token).unwrap_or_default();
            if verbose {
                log::info!(
                    "merge {}/{}: {} -> {} ({:?}) had {} occurrences",
                    index + 1,
                    num_merges,
                    record.pair,
                    record.token,
                    String::from_utf8_lossy(expansion),
                    record.count
                );
            } else {
                log::debug!(
                    "merge {}/{}: {} -> {} had {} occurrences",
                    index + 1,
                    num_merges,
                    record.pair,
                    record.token,
                    record.count
                );
            }

            progress.on_merge(&MergeEvent {
                index,
                total: num_merges,
                pair: record.pair,
                token: record.token,
                count: record.count,
            });
        }

        progress.on_finish();
        merged
    }

    /// Total number of tokens across all chunk occurrences.
    pub(crate) fn token_count(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.ids.len() * word.count)
            .sum()
    }

    /// Returns the complete history of merge operations in training order.
    #[cfg(test)]
    pub(crate) fn get_merge_history(&self) -> &[(TokenPair, Token)] {
        &self.merge_history
    }

    /// Consumes the trainer, returning the merge history and vocabulary.
    pub(crate) fn into_parts(self) -> (Vec<(TokenPair, Token)>, Vec<ByteSeq>) {
        (self.merge_history, self.vocab)
    }

    fn token_bytes(&self, token: Token) -> Option<&[u8]> {
        self.vocab.get(token).map(Vec::as_slice)
    }

    /// Counts pairs over all chunks, weighted by chunk multiplicity.
    ///
    /// Each Rayon split counts its own chunks; the partial counts are then
    /// combined with [`PairStats::absorb`], which is order independent.
    fn count_pairs(&self) -> PairStats {
        self.words
            .par_iter()
            .enumerate()
            .fold(PairStats::new, |mut stats, (i, word)| {
                stats.count_weighted(i, &word.ids, word.count);
                stats
            })
            .reduce(PairStats::new, PairStats::absorb)
    }
}

fn contains_pair(ids: &[Token], pair: TokenPair) -> bool {
    ids.windows(2).any(|w| w[0] == pair.0 && w[1] == pair.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{progress::NoProgress, stats::get_stats};

    /// Train without de-duplication or parallelism, one chunk at a time.
    fn train_sequential(chunks: &[&str], num_merges: usize) -> Vec<(TokenPair, Token)> {
        let mut ids: Vec<Vec<Token>> = chunks.iter().map(|c| chunk_to_tokens(c)).collect();
        let mut merges = Vec::new();

        for i in 0..num_merges {
            let mut stats = PairStats::new();
            for chunk_ids in &ids {
                get_stats(chunk_ids, &mut stats);
            }
            let Some((pair, _)) = stats.most_frequent() else {
                break;
            };
            let idx = BYTE_VOCAB_SIZE + i;
            ids = ids.iter().map(|chunk_ids| merge(chunk_ids, pair, idx)).collect();
            merges.push((pair, idx));
        }

        merges
    }

    #[test]
    fn test_basic_merge() {
        let mut trainer = BPETrainer::new(["aaabdaaabac"]);
        assert_eq!(trainer.token_count(), 11);

        let merged = trainer.train(2, false, &mut NoProgress);
        assert_eq!(merged, 2);
        assert_eq!(
            trainer.get_merge_history(),
            &[(TokenPair(97, 97), 256), (TokenPair(256, 97), 257)]
        );
        // [257, b, d, 257, b, a, c]
        assert_eq!(trainer.token_count(), 7);
    }

    #[test]
    fn test_vocab_expansion() {
        let mut trainer = BPETrainer::new(["abab", "abab"]);
        trainer.train(2, false, &mut NoProgress);

        let (merges, vocab) = trainer.into_parts();
        assert_eq!(merges, vec![(TokenPair(97, 98), 256), (TokenPair(256, 256), 257)]);
        assert_eq!(vocab.len(), 258);
        assert_eq!(vocab[97], b"a".to_vec());
        assert_eq!(vocab[256], b"ab".to_vec());
        assert_eq!(vocab[257], b"abab".to_vec());
    }

    #[test]
    fn test_empty_corpus() {
        let mut trainer = BPETrainer::new(std::iter::empty());
        assert_eq!(trainer.train(10, false, &mut NoProgress), 0);
        assert_eq!(trainer.token_count(), 0);
        assert!(trainer.get_merge_history().is_empty());
    }

    #[test]
    fn test_stops_when_pairs_exhausted() {
        // "abc" has two pairs; after two merges a single token remains
        let mut trainer = BPETrainer::new(["abc"]);
        assert_eq!(trainer.train(5, false, &mut NoProgress), 2);
        assert_eq!(trainer.token_count(), 1);
        assert_eq!(trainer.merge_step(), None);
    }

    #[test]
    fn test_merges_never_cross_chunks() {
        // "a" + "b" as separate chunks never produce the pair (a, b)
        let mut trainer = BPETrainer::new(["a", "b", "a", "b"]);
        assert_eq!(trainer.train(3, false, &mut NoProgress), 0);
        assert_eq!(trainer.token_count(), 4);
    }

    #[test]
    fn test_deduplicated_matches_sequential() {
        let chunks = [
            "नमस्ते", " दुनिया", "नमस्ते", " hello", " दुनिया", " hel", "lo", "नमस्ते", " world",
        ];
        let mut trainer = BPETrainer::new(chunks);
        trainer.train(30, false, &mut NoProgress);

        assert_eq!(trainer.get_merge_history(), train_sequential(&chunks, 30).as_slice());
    }

    #[test]
    fn test_progress_receives_every_merge() {
        struct Recorder {
            events: Vec<MergeEvent>,
            finished: bool,
        }

        impl ProgressSink for Recorder {
            fn on_merge(&mut self, event: &MergeEvent) {
                self.events.push(*event);
            }

            fn on_finish(&mut self) {
                self.finished = true;
            }
        }

        let mut recorder = Recorder {
            events: Vec::new(),
            finished: false,
        };
        let mut trainer = BPETrainer::new(["aaabdaaabac"]);
        trainer.train(3, false, &mut recorder);

        assert!(recorder.finished);
        assert_eq!(recorder.events.len(), 3);
        assert_eq!(recorder.events[0].index, 0);
        assert_eq!(recorder.events[0].total, 3);
        assert_eq!(recorder.events[0].pair, TokenPair(97, 97));
        assert_eq!(recorder.events[0].count, 4);
        assert_eq!(recorder.events[2].token, 258);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(TrainerConfig::new(256).num_merges().ok(), Some(0));
        assert_eq!(TrainerConfig::new(300).num_merges().ok(), Some(44));
        assert!(matches!(
            TrainerConfig::new(255).num_merges(),
            Err(TrainError::VocabSizeTooSmall(255))
        ));

        let config = TrainerConfig {
            window_chars: 0,
            ..TrainerConfig::new(300)
        };
        assert!(matches!(config.num_merges(), Err(TrainError::EmptyWindow)));
    }

    #[test]
    fn test_compression_ratio() {
        let summary = TrainSummary {
            merges: 2,
            input_len: 11,
            output_len: 7,
        };
        assert!((summary.compression_ratio() - 11.0 / 7.0).abs() < 1e-12);

        let empty = TrainSummary {
            merges: 0,
            input_len: 0,
            output_len: 0,
        };
        assert_eq!(empty.compression_ratio(), 1.0);
    }
}
