//! Pair counting and merge application.
//!
//! These two primitives are shared by the trainer, which recounts pairs
//! every iteration, and by the reference encoder used in tests.

use std::collections::{HashMap, hash_map::Entry};

use crate::types::{Token, TokenFreq, TokenPair};

/// Location of the first occurrence of a pair: (sequence index, position).
///
/// Ordering these locations reproduces the order in which a sequential
/// scan over the corpus would first encounter each pair.
pub type FirstSeen = (usize, usize);

/// Count and first occurrence of one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairCount {
    pub count: TokenFreq,
    pub first_seen: FirstSeen,
}

/// Frequency accumulator over adjacent token pairs.
///
/// The accumulator is never reset by counting; callers combining several
/// sequences count each one against the same `PairStats`.
#[derive(Debug, Default, Clone)]
pub struct PairStats {
    counts: HashMap<TokenPair, PairCount>,

    /// Sequence index handed to the next call of [`PairStats::count_sequence`].
    next_seq: usize,
}

impl PairStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every adjacent pair of `ids` as the next sequence of the corpus.
    ///
    /// Sequences shorter than two tokens contribute nothing.
    pub fn count_sequence(&mut self, ids: &[Token]) {
        let seq_idx = self.next_seq;
        self.count_weighted(seq_idx, ids, 1);
    }

    /// Counts every adjacent pair of `ids` `weight` times, attributing first
    /// occurrences to sequence `seq_idx`.
    ///
    /// Used by the trainer, where `ids` stands for `weight` identical chunks
    /// that first appeared at corpus position `seq_idx`.
    pub(crate) fn count_weighted(&mut self, seq_idx: usize, ids: &[Token], weight: TokenFreq) {
        for (pos, window) in ids.windows(2).enumerate() {
            let pair = TokenPair(window[0], window[1]);
            let first_seen = (seq_idx, pos);
            match self.counts.entry(pair) {
                Entry::Occupied(mut entry) => {
                    let stat = entry.get_mut();
                    stat.count += weight;
                    stat.first_seen = stat.first_seen.min(first_seen);
                }
                Entry::Vacant(entry) => {
                    entry.insert(PairCount {
                        count: weight,
                        first_seen,
                    });
                }
            }
        }
        self.next_seq = self.next_seq.max(seq_idx + 1);
    }

    /// Combines two accumulators: counts are summed and the earliest first
    /// occurrence is kept, so the result does not depend on combine order.
    pub fn absorb(mut self, mut other: Self) -> Self {
        // fold the smaller map into the larger one
        if self.counts.len() < other.counts.len() {
            std::mem::swap(&mut self, &mut other);
        }

        for (pair, theirs) in other.counts {
            match self.counts.entry(pair) {
                Entry::Occupied(mut entry) => {
                    let ours = entry.get_mut();
                    ours.count += theirs.count;
                    ours.first_seen = ours.first_seen.min(theirs.first_seen);
                }
                Entry::Vacant(entry) => {
                    entry.insert(theirs);
                }
            }
        }
        self.next_seq = self.next_seq.max(other.next_seq);

        self
    }

    /// Returns the count of `pair`, if it was seen.
    pub fn get(&self, pair: TokenPair) -> Option<TokenFreq> {
        self.counts.get(&pair).map(|stat| stat.count)
    }

    /// Returns the full record of `pair`, if it was seen.
    pub fn get_record(&self, pair: TokenPair) -> Option<PairCount> {
        self.counts.get(&pair).copied()
    }

    /// Number of distinct pairs seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates over `(pair, count)` in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (TokenPair, TokenFreq)> + '_ {
        self.counts.iter().map(|(&pair, stat)| (pair, stat.count))
    }

    /// Returns the pair with the highest count.
    ///
    /// Ties go to the pair that occurred first in the corpus, which is the
    /// order a sequential scan inserts pairs in.
    pub fn most_frequent(&self) -> Option<(TokenPair, TokenFreq)> {
        self.counts
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.count
                    .cmp(&b.count)
                    .then_with(|| b.first_seen.cmp(&a.first_seen))
            })
            .map(|(&pair, stat)| (pair, stat.count))
    }
}

/// Adds the adjacent pair counts of `ids` to `stats`.
pub fn get_stats(ids: &[Token], stats: &mut PairStats) {
    stats.count_sequence(ids);
}

/// Replaces every occurrence of `pair` in `ids` with `idx`.
///
/// Scans left to right and never revisits a consumed position, so for
/// `[a, a, a]` and pair `(a, a)` only the first two tokens merge.
pub fn merge(ids: &[Token], pair: TokenPair, idx: Token) -> Vec<Token> {
    let mut merged = Vec::with_capacity(ids.len());
    let mut i = 0;

    while i < ids.len() {
        if i + 1 < ids.len() && ids[i] == pair.0 && ids[i + 1] == pair.1 {
            merged.push(idx);
            i += 2;
        } else {
            merged.push(ids[i]);
            i += 1;
        }
    }

    merged
}
