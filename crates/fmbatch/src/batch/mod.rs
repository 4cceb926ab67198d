//! # Batching
//!
//! Turns a slice of [`Query`] values into batches of atomic [`Instance`]s plus a
//! [`SchedulingPlan`] that maps batch outputs back to submission order.
//!
//! Two strategies implement [`Batcher`]:
//!
//! - [`StaticBatcher`] chunks instances in submission order into fixed-size batches.
//! - [`DynamicBatcher`] sorts instances by length and greedily packs them under a
//!   memory budget where the cost of a batch is `max_len² × instances`.
//!
//! Both keep every candidate of a ranked query as its own instance, so a ranked query
//! with `k` candidates contributes `k` slots.

mod dynamic_batcher;
mod instance;
mod merge;
mod plan;
mod static_batcher;
mod tokenized;

pub use dynamic_batcher::DynamicBatcher;
pub use instance::Instance;
pub use merge::softmax;
pub use plan::{QuerySpan, SchedulingPlan};
pub use static_batcher::StaticBatcher;
pub use tokenized::{PaddingSide, TokenizedBatch};

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::backend::{PromptContent, Tokenizer};
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::query::Query;

/// One unit of work handed to the backend.
#[derive(Debug, Clone)]
pub struct Batch<P> {
    instances: Vec<Instance<P>>,
    tokens: Option<TokenizedBatch>,
}

impl<P> Batch<P> {
    pub(crate) fn new(instances: Vec<Instance<P>>) -> Self {
        Self {
            instances,
            tokens: None,
        }
    }

    /// Build a batch and pad its token ids, if every instance was tokenized.
    pub(crate) fn tokenized(
        instances: Vec<Instance<P>>,
        pad_token_id: u32,
        width: Option<usize>,
        side: PaddingSide,
    ) -> Self {
        let sequences: Option<Vec<Vec<u32>>> = instances
            .iter()
            .map(|instance| instance.tokens().map(<[u32]>::to_vec))
            .collect();
        let tokens = sequences.map(|sequences| TokenizedBatch::pad(sequences, pad_token_id, width, side));

        Self { instances, tokens }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[Instance<P>] {
        &self.instances
    }

    pub fn prompts(&self) -> impl Iterator<Item = &P> {
        self.instances.iter().map(Instance::prompt)
    }

    /// Padded ids and attention mask, when the run was pre-tokenized
    pub fn tokens(&self) -> Option<&TokenizedBatch> {
        self.tokens.as_ref()
    }

    /// Longest instance in the batch
    pub fn max_len(&self) -> usize {
        self.instances.iter().map(Instance::len).max().unwrap_or(0)
    }
}

impl<P: Clone> Batch<P> {
    /// A batch holding only the given rows, in the given order.
    pub(crate) fn select(&self, rows: &[usize]) -> Self {
        Self {
            instances: rows.iter().map(|&row| self.instances[row].clone()).collect(),
            tokens: self.tokens.as_ref().map(|tokens| tokens.select(rows)),
        }
    }
}

/// Which batching strategy a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPolicy {
    Static,
    #[default]
    Dynamic,
}

impl FromStr for BatchPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(BatchPolicy::Static),
            "dynamic" => Ok(BatchPolicy::Dynamic),
            other => Err(Error::InvalidConfig {
                message: format!("unknown batch policy {other:?}"),
            }),
        }
    }
}

impl fmt::Display for BatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPolicy::Static => write!(f, "static"),
            BatchPolicy::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A strategy for grouping queries into batches.
///
/// Implementations hold their own size limits. Building batches never mutates them;
/// only [`shrink`](Batcher::shrink) does, after the backend reported resource exhaustion.
///
/// # Type Parameters
///
/// * `P` - The prompt content carried by each query
///
/// # Example
///
/// ```ignore
/// use fmbatch::batch::{Batcher, StaticBatcher};
/// use fmbatch::query::Query;
///
/// let queries: Vec<Query<String>> = ["q1", "q2", "q3"].into_iter().map(Query::from).collect();
/// let (batches, plan) = StaticBatcher::new(2).batch(&queries)?;
/// assert_eq!(batches.len(), 2);
/// assert!(plan.is_identity());
/// ```
pub trait Batcher<P>: Send + Sync {
    /// Group the instances of `queries` into batches.
    ///
    /// Every instance appears in exactly one batch, and the returned plan restores
    /// submission order from the concatenated batch outputs.
    fn batch(&self, queries: &[Query<P>]) -> Result<(Vec<Batch<P>>, SchedulingPlan)>;

    /// Reduce the limits after an out-of-memory failure.
    fn shrink(&mut self, policy: &RetryPolicy);

    fn policy(&self) -> BatchPolicy;
}

/// Expand every query into instances and record how many slots each one takes.
pub(crate) fn expand_all<P: PromptContent>(
    queries: &[Query<P>],
    tokenizer: Option<&dyn Tokenizer<P>>,
    max_token_length: usize,
) -> (Vec<Instance<P>>, Vec<QuerySpan>) {
    let instances = queries
        .iter()
        .flat_map(|query| query.expand(tokenizer, max_token_length))
        .collect();
    let spans = queries.iter().map(QuerySpan::of).collect();
    (instances, spans)
}

/// Multiply a size limit, never going below one.
pub(crate) fn scaled(size: usize, factor: f64) -> usize {
    ((size as f64 * factor).floor() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ByteTokenizer;

    impl Tokenizer<String> for ByteTokenizer {
        fn encode(&self, prompt: &String) -> Vec<u32> {
            prompt.bytes().map(u32::from).collect()
        }

        fn pad_token_id(&self) -> u32 {
            0
        }
    }

    #[test]
    fn test_batch_tokenized_pads_to_longest() {
        let instances = vec![
            Instance::measure(&"ab".to_string(), Some(&ByteTokenizer), 16),
            Instance::measure(&"c".to_string(), Some(&ByteTokenizer), 16),
        ];
        let batch = Batch::tokenized(instances, 0, None, PaddingSide::Right);

        assert_eq!(batch.max_len(), 2);
        let tokens = batch.tokens().unwrap();
        assert_eq!(tokens.input_ids(), &[vec![97, 98], vec![99, 0]]);
    }

    #[test]
    fn test_batch_without_tokens_skips_padding() {
        let instances = vec![Instance::measure(&"ab".to_string(), None, 16)];
        let batch = Batch::tokenized(instances, 0, None, PaddingSide::Right);

        assert!(batch.tokens().is_none());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_select_keeps_rows_aligned() {
        let instances = ["a", "bb", "ccc"]
            .iter()
            .map(|p| Instance::measure(&p.to_string(), Some(&ByteTokenizer), 16))
            .collect();
        let batch = Batch::tokenized(instances, 0, None, PaddingSide::Right);
        let selected = batch.select(&[2, 0]);

        let prompts: Vec<_> = selected.prompts().cloned().collect();
        assert_eq!(prompts, vec!["ccc", "a"]);
        assert_eq!(selected.tokens().unwrap().shape(), (2, 3));
    }

    #[test]
    fn test_batch_policy_parse() {
        assert_eq!("Static".parse::<BatchPolicy>().unwrap(), BatchPolicy::Static);
        assert_eq!(BatchPolicy::default(), BatchPolicy::Dynamic);
        assert!("greedy".parse::<BatchPolicy>().is_err());
    }

    #[test]
    fn test_scaled_never_reaches_zero() {
        assert_eq!(scaled(1024, 0.8), 819);
        assert_eq!(scaled(819, 0.8), 655);
        assert_eq!(scaled(1, 0.5), 1);
    }
}
