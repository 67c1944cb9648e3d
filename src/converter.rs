//! Merge table, vocabulary and the chunk encoder built on them.
//!
//! A chunk is encoded with a min-heap of merge candidates keyed by
//! `(rank, start)`, invalidated lazily: an entry whose pair no longer sits
//! at its position is dropped when popped. See "Byte Pair Encoding is
//! Suboptimal for Language Model Pretraining"
//! https://aclanthology.org/2023.findings-acl.38.pdf for the linked-list
//! formulation this follows.
//!
//! A merge of `(a, b)` is learned after both `a` and `b` exist, so every
//! candidate created by applying a merge ranks after it. Popping by rank
//! therefore applies merges exactly as the quadratic "apply the
//! lowest-ranked pair everywhere, left to right, repeat" loop does.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, HashMap},
};

use crate::{
    error::{DecodeError, TokenizerInitError},
    types::{BYTE_VOCAB_SIZE, ByteSeq, MergeOrder, Token, TokenPair},
};

/// A pair at `start` that some merge rule applies to.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    rank: MergeOrder,
    start: usize,
    pair: TokenPair,
}

impl Candidate {
    fn key(&self) -> Reverse<(MergeOrder, usize)> {
        Reverse((self.rank, self.start))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // BinaryHeap pops the greatest; lowest rank, then leftmost, must come first
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Merge rules of a trained tokenizer and the vocabulary they produce.
#[derive(Debug, Clone)]
pub(crate) struct BPEConverter {
    /// pair -> (token, rank)
    ranks: HashMap<TokenPair, (Token, MergeOrder)>,

    merge_history: Vec<(TokenPair, Token)>,

    /// Token ID -> expanded bytes. The first 256 entries are the bytes
    /// themselves.
    vocab: Vec<ByteSeq>,
}

impl Default for BPEConverter {
    fn default() -> Self {
        Self::from_parts(Vec::new(), byte_vocab())
    }
}

impl BPEConverter {
    /// Validates `merge_history` and builds its vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidMerge`] unless the k-th rule mints
    /// token `256 + k` from two tokens that already exist.
    pub(crate) fn new(
        merge_history: impl IntoIterator<Item = (TokenPair, Token)>,
    ) -> Result<Self, TokenizerInitError> {
        let mut vocab = byte_vocab();
        let mut history = Vec::new();

        for (rank, (pair, token)) in merge_history.into_iter().enumerate() {
            if token != BYTE_VOCAB_SIZE + rank || pair.0 >= token || pair.1 >= token {
                return Err(TokenizerInitError::InvalidMerge { pair, token });
            }

            let expansion = [vocab[pair.0].as_slice(), vocab[pair.1].as_slice()].concat();
            vocab.push(expansion);
            history.push((pair, token));
        }

        Ok(Self::from_parts(history, vocab))
    }

    /// Wraps trainer output, which is valid by construction.
    pub(crate) fn from_parts(merge_history: Vec<(TokenPair, Token)>, vocab: Vec<ByteSeq>) -> Self {
        let ranks = merge_history
            .iter()
            .enumerate()
            .map(|(rank, &(pair, token))| (pair, (token, rank)))
            .collect();

        Self {
            ranks,
            merge_history,
            vocab,
        }
    }

    /// Applies the merge rules to the byte tokens of one chunk.
    pub(crate) fn encode(&self, tokens: Vec<Token>) -> Vec<Token> {
        if tokens.len() < 2 || self.ranks.is_empty() {
            return tokens;
        }

        let mut heap: BinaryHeap<Candidate> = tokens
            .windows(2)
            .enumerate()
            .filter_map(|(start, w)| self.candidate(start, TokenPair(w[0], w[1])))
            .collect();

        // None marks a token absorbed into its left neighbour
        let mut slots: Vec<Option<Token>> = tokens.into_iter().map(Some).collect();

        while let Some(Candidate { start, pair, .. }) = heap.pop() {
            let Some(left) = slots.get(start).copied().flatten() else {
                continue;
            };
            let Some((right_at, right)) = next_live(&slots, start) else {
                continue;
            };
            if TokenPair(left, right) != pair {
                continue;
            }
            let Some(&(merged, _)) = self.ranks.get(&pair) else {
                continue;
            };

            slots[start] = Some(merged);
            slots[right_at] = None;

            if let Some((prev, tok)) = prev_live(&slots, start) {
                heap.extend(self.candidate(prev, TokenPair(tok, merged)));
            }
            if let Some((_, tok)) = next_live(&slots, start) {
                heap.extend(self.candidate(start, TokenPair(merged, tok)));
            }
        }

        slots.into_iter().flatten().collect()
    }

    fn candidate(&self, start: usize, pair: TokenPair) -> Option<Candidate> {
        self.ranks
            .get(&pair)
            .map(|&(_, rank)| Candidate { rank, start, pair })
    }

    /// Merge rules in training order.
    pub(crate) fn merges(&self) -> &[(TokenPair, Token)] {
        &self.merge_history
    }

    pub(crate) fn vocab(&self) -> &[ByteSeq] {
        &self.vocab
    }

    /// Concatenates the expansions of `tokens`.
    ///
    /// An ID is looked up in the vocabulary first and in `special_tokens`
    /// second.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for the first ID found in neither.
    pub(crate) fn decode(
        &self,
        tokens: &[Token],
        special_tokens: &HashMap<Token, String>,
    ) -> Result<ByteSeq, DecodeError> {
        let mut bytes = Vec::with_capacity(tokens.len() * 2);

        for &token in tokens {
            let expansion = match self.vocab.get(token) {
                Some(expansion) => expansion.as_slice(),
                None => special_tokens
                    .get(&token)
                    .map(String::as_bytes)
                    .ok_or(DecodeError::UnknownToken(token))?,
            };
            bytes.extend_from_slice(expansion);
        }

        Ok(bytes)
    }
}

fn byte_vocab() -> Vec<ByteSeq> {
    (0..=u8::MAX).map(|b| vec![b]).collect()
}

/// First live slot after `i`, with its token.
fn next_live(slots: &[Option<Token>], i: usize) -> Option<(usize, Token)> {
    slots
        .iter()
        .enumerate()
        .skip(i + 1)
        .find_map(|(j, slot)| slot.map(|tok| (j, tok)))
}

/// Last live slot before `i`, with its token.
fn prev_live(slots: &[Option<Token>], i: usize) -> Option<(usize, Token)> {
    slots
        .iter()
        .take(i)
        .enumerate()
        .rev()
        .find_map(|(j, slot)| slot.map(|tok| (j, tok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{PairStats, get_stats, merge};

    fn converter(history: Vec<(TokenPair, Token)>) -> BPEConverter {
        BPEConverter::new(history).expect("merge history should be valid")
    }

    fn ids(text: &[u8]) -> Vec<Token> {
        text.iter().map(|&b| Token::from(b)).collect()
    }

    /// Quadratic reference: apply the lowest-ranked pair present everywhere,
    /// then start over.
    fn encode_naive(converter: &BPEConverter, mut ids: Vec<Token>) -> Vec<Token> {
        loop {
            let mut stats = PairStats::new();
            get_stats(&ids, &mut stats);
            let lowest = stats
                .iter()
                .filter_map(|(pair, _)| {
                    converter
                        .ranks
                        .get(&pair)
                        .map(|&(tok, rank)| (rank, pair, tok))
                })
                .min();
            let Some((_, pair, tok)) = lowest else {
                return ids;
            };
            ids = merge(&ids, pair, tok);
        }
    }

    #[test]
    fn test_encode_nested_merge() {
        let conv = converter(vec![(TokenPair(97, 98), 256), (TokenPair(256, 97), 257)]);
        assert_eq!(conv.encode(ids(b"aba")), vec![257]);
    }

    #[test]
    fn test_encode_short_input_unchanged() {
        let conv = converter(vec![(TokenPair(97, 98), 256)]);
        assert_eq!(conv.encode(vec![7]), vec![7]);
        assert_eq!(conv.encode(vec![]), Vec::<Token>::new());
    }

    #[test]
    fn test_encode_without_applicable_rule() {
        let conv = converter(vec![(TokenPair(5, 6), 256)]);
        assert_eq!(conv.encode(vec![0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_encode_looks_past_absorbed_right_slot() {
        let conv = converter(vec![(TokenPair(0, 1), 256), (TokenPair(256, 0), 257)]);
        assert_eq!(conv.encode(vec![0, 1, 0, 9]), vec![257, 9]);
    }

    #[test]
    fn test_encode_looks_past_absorbed_left_slot() {
        let conv = converter(vec![
            (TokenPair(0, 1), 256),
            (TokenPair(2, 3), 257),
            (TokenPair(256, 257), 258),
        ]);
        assert_eq!(conv.encode(vec![0, 1, 2, 3]), vec![258]);
    }

    #[test]
    fn test_encode_runs_pair_from_the_left() {
        let conv = converter(vec![(TokenPair(97, 97), 256)]);
        assert_eq!(conv.encode(ids(b"aaa")), vec![256, 97]);
        assert_eq!(conv.encode(ids(b"aaaa")), vec![256, 256]);
    }

    #[test]
    fn test_encode_rank_beats_frequency() {
        // (b, c) occurs twice but (a, b) was learned first
        let conv = converter(vec![(TokenPair(97, 98), 256), (TokenPair(98, 99), 257)]);
        assert_eq!(conv.encode(ids(b"bcabc")), vec![257, 256, 99]);
    }

    #[test]
    fn test_encode_matches_naive_loop() {
        let conv = converter(vec![
            (TokenPair(97, 97), 256),
            (TokenPair(256, 97), 257),
            (TokenPair(97, 98), 258),
            (TokenPair(256, 256), 259),
            (TokenPair(98, 97), 260),
            (TokenPair(257, 98), 261),
            (TokenPair(260, 97), 262),
            (TokenPair(259, 258), 263),
        ]);

        let inputs: [&[u8]; 5] = [
            b"aaabdaaabac",
            b"aaaaaaaab",
            b"abababa",
            b"baaabaaaab",
            b"aabaabaa",
        ];
        for text in inputs {
            assert_eq!(
                conv.encode(ids(text)),
                encode_naive(&conv, ids(text)),
                "input {:?}",
                String::from_utf8_lossy(text)
            );
        }
    }

    #[test]
    fn test_new_rejects_skipped_id() {
        let result = BPEConverter::new(vec![(TokenPair(97, 98), 257)]);
        assert!(matches!(
            result,
            Err(TokenizerInitError::InvalidMerge { token: 257, .. })
        ));
    }

    #[test]
    fn test_new_rejects_undefined_part() {
        let result = BPEConverter::new(vec![(TokenPair(97, 300), 256)]);
        assert!(matches!(
            result,
            Err(TokenizerInitError::InvalidMerge {
                pair: TokenPair(97, 300),
                token: 256
            })
        ));
    }

    #[test]
    fn test_decode_bytes_and_merges() {
        let conv = converter(vec![(TokenPair(97, 98), 256), (TokenPair(256, 99), 257)]);
        let bytes = conv
            .decode(&[257, 256, 100], &HashMap::new())
            .expect("ids should decode");
        assert_eq!(bytes, b"abcabd".to_vec());
    }

    #[test]
    fn test_decode_falls_back_to_special() {
        let conv = converter(vec![(TokenPair(97, 98), 256)]);
        let special = HashMap::from([(1000, String::from("<|eot|>"))]);
        let bytes = conv.decode(&[256, 1000, 99], &special).expect("ids should decode");
        assert_eq!(bytes, b"ab<|eot|>c".to_vec());
    }

    #[test]
    fn test_decode_prefers_vocab_over_special() {
        let conv = BPEConverter::default();
        let special = HashMap::from([(97, String::from("<|x|>"))]);
        let bytes = conv.decode(&[97], &special).expect("ids should decode");
        assert_eq!(bytes, b"a".to_vec());
    }

    #[test]
    fn test_decode_unknown_id() {
        let conv = converter(vec![(TokenPair(97, 98), 256)]);
        let result = conv.decode(&[97, 999], &HashMap::new());
        assert!(matches!(result, Err(DecodeError::UnknownToken(999))));
    }

    #[test]
    fn test_vocab_layout() {
        let conv = converter(vec![(TokenPair(97, 98), 256), (TokenPair(256, 99), 257)]);
        assert_eq!(conv.vocab().len(), 258);
        assert_eq!(conv.vocab()[97], vec![97]);
        assert_eq!(conv.vocab()[256], b"ab".to_vec());
        assert_eq!(conv.vocab()[257], b"abc".to_vec());
        assert_eq!(conv.merges().len(), 2);
    }
}
