use std::sync::Arc;
use tracing::{debug, warn};
use crate::backend::{PromptContent, Tokenizer};
use crate::config::RetryPolicy;
use crate::error::Result;
use crate::query::Query;
use super::{expand_all, scaled, Batch, BatchPolicy, Batcher, PaddingSide, SchedulingPlan};

/// Fixed-size chunking in submission order.
///
/// Pre-tokenized batches are padded to `max_token_length` regardless of their content,
/// so every batch has the same shape.
pub struct StaticBatcher<P> {
    max_batch_size: usize,
    tokenizer: Option<Arc<dyn Tokenizer<P>>>,
    max_token_length: usize,
    padding_side: PaddingSide,
}

impl<P> StaticBatcher<P> {
    /// A batcher emitting chunks of at most `max_batch_size` instances (at least one).
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            tokenizer: None,
            max_token_length: 512,
            padding_side: PaddingSide::default(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer<P>>, max_token_length: usize) -> Self {
        self.tokenizer = Some(tokenizer);
        self.max_token_length = max_token_length;
        self
    }

    pub fn with_padding_side(mut self, padding_side: PaddingSide) -> Self {
        self.padding_side = padding_side;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

impl<P> Batcher<P> for StaticBatcher<P>
where P: PromptContent
{
    fn batch(&self, queries: &[Query<P>]) -> Result<(Vec<Batch<P>>, SchedulingPlan)> {
        let (instances, spans) = expand_all(queries, self.tokenizer.as_deref(), self.max_token_length);

        let mut batches = Vec::with_capacity(instances.len().div_ceil(self.max_batch_size));
        let mut remaining = instances.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: Vec<_> = remaining.by_ref().take(self.max_batch_size).collect();
            let batch = match &self.tokenizer {
                Some(tokenizer) => Batch::tokenized(
                    chunk,
                    tokenizer.pad_token_id(),
                    Some(self.max_token_length),
                    self.padding_side,
                ),
                None => Batch::new(chunk),
            };
            batches.push(batch);
        }
        debug!(batches = batches.len(), max_batch_size = self.max_batch_size, "built static batches");

        Ok((batches, SchedulingPlan::identity(spans)))
    }

    fn shrink(&mut self, policy: &RetryPolicy) {
        let previous = self.max_batch_size;
        self.max_batch_size = scaled(previous, policy.static_shrink);
        warn!(previous, max_batch_size = self.max_batch_size, "shrunk static batch size");
    }

    fn policy(&self) -> BatchPolicy {
        BatchPolicy::Static
    }
}
