use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::constant::{BATCH_DIM, SEQ_DIM};
use crate::error::Error;

/// Which end of a sequence receives padding tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingSide {
    /// Pad before the prompt, keeping the most recent tokens aligned at the end
    Left,
    #[default]
    Right,
}

impl FromStr for PaddingSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(PaddingSide::Left),
            "right" => Ok(PaddingSide::Right),
            other => Err(Error::InvalidConfig {
                message: format!("unknown padding side {other:?}"),
            }),
        }
    }
}

impl fmt::Display for PaddingSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaddingSide::Left => write!(f, "left"),
            PaddingSide::Right => write!(f, "right"),
        }
    }
}

/// Token ids of one batch padded to a common width, plus the matching attention mask.
///
/// Shape is `(batch, seq)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedBatch {
    input_ids: Vec<Vec<u32>>,
    attention_mask: Vec<Vec<u8>>,
}

impl TokenizedBatch {
    /// Pad `sequences` to `width`, or to the longest sequence when `width` is `None`.
    ///
    /// A sequence longer than the requested width widens the batch rather than being cut.
    pub fn pad(
        sequences: Vec<Vec<u32>>,
        pad_token_id: u32,
        width: Option<usize>,
        side: PaddingSide,
    ) -> Self {
        let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
        let width = width.map_or(longest, |width| width.max(longest));

        let mut input_ids = Vec::with_capacity(sequences.len());
        let mut attention_mask = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let amount = width - sequence.len();
            let padding = std::iter::repeat_n(pad_token_id, amount);
            let (ids, mask): (Vec<u32>, Vec<u8>) = match side {
                PaddingSide::Left => (
                    padding.chain(sequence.iter().copied()).collect(),
                    std::iter::repeat_n(0, amount).chain(std::iter::repeat_n(1, sequence.len())).collect(),
                ),
                PaddingSide::Right => (
                    sequence.iter().copied().chain(padding).collect(),
                    std::iter::repeat_n(1, sequence.len()).chain(std::iter::repeat_n(0, amount)).collect(),
                ),
            };
            input_ids.push(ids);
            attention_mask.push(mask);
        }

        Self {
            input_ids,
            attention_mask,
        }
    }

    pub fn input_ids(&self) -> &[Vec<u32>] {
        &self.input_ids
    }

    pub fn attention_mask(&self) -> &[Vec<u8>] {
        &self.attention_mask
    }

    /// `(batch, seq)`
    pub fn shape(&self) -> (usize, usize) {
        let dims = [
            self.input_ids.len(),
            self.input_ids.first().map_or(0, Vec::len),
        ];
        (dims[BATCH_DIM], dims[SEQ_DIM])
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Keep only the given rows, preserving the padded width.
    pub(crate) fn select(&self, rows: &[usize]) -> Self {
        Self {
            input_ids: rows.iter().map(|&row| self.input_ids[row].clone()).collect(),
            attention_mask: rows.iter().map(|&row| self.attention_mask[row].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_to_longest_right() {
        let batch = TokenizedBatch::pad(vec![vec![1, 2, 3], vec![4]], 0, None, PaddingSide::Right);

        assert_eq!(batch.shape(), (2, 3));
        assert_eq!(batch.input_ids(), &[vec![1, 2, 3], vec![4, 0, 0]]);
        assert_eq!(batch.attention_mask(), &[vec![1, 1, 1], vec![1, 0, 0]]);
    }

    #[test]
    fn test_pad_left_keeps_tokens_at_end() {
        let batch = TokenizedBatch::pad(vec![vec![7], vec![8, 9]], 99, None, PaddingSide::Left);

        assert_eq!(batch.input_ids(), &[vec![99, 7], vec![8, 9]]);
        assert_eq!(batch.attention_mask(), &[vec![0, 1], vec![1, 1]]);
    }

    #[test]
    fn test_fixed_width_never_truncates() {
        let batch = TokenizedBatch::pad(vec![vec![1, 2], vec![3]], 0, Some(4), PaddingSide::Right);
        assert_eq!(batch.shape(), (2, 4));

        let batch = TokenizedBatch::pad(vec![vec![1, 2, 3]], 0, Some(2), PaddingSide::Right);
        assert_eq!(batch.shape(), (1, 3));
    }

    #[test]
    fn test_empty_batch() {
        let batch = TokenizedBatch::pad(vec![], 0, None, PaddingSide::Right);
        assert!(batch.is_empty());
        assert_eq!(batch.shape(), (0, 0));
    }

    #[test]
    fn test_select_rows() {
        let batch = TokenizedBatch::pad(vec![vec![1], vec![2, 2], vec![3, 3, 3]], 0, None, PaddingSide::Right);
        let selected = batch.select(&[2, 0]);

        assert_eq!(selected.input_ids(), &[vec![3, 3, 3], vec![1, 0, 0]]);
    }

    #[test]
    fn test_padding_side_parse() {
        assert_eq!("LEFT".parse::<PaddingSide>().unwrap(), PaddingSide::Left);
        assert!("middle".parse::<PaddingSide>().is_err());
    }
}
