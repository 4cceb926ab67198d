use std::sync::Arc;
use tracing::{debug, warn};
use crate::backend::{DeviceMemory, PromptContent, Tokenizer};
use crate::config::{RetryPolicy, SchedulerConfig};
use crate::error::Result;
use crate::query::Query;
use super::{expand_all, scaled, Batch, BatchPolicy, Batcher, Instance, PaddingSide, SchedulingPlan};

/// Length-sorted greedy packing under a memory budget.
///
/// Instances are sorted longest first (ties keep submission order) and appended to the
/// open batch while `max_len² × instances` stays below the budget and the batch is
/// smaller than `max_batch_size`. The cost counts the instances already in the batch,
/// so an instance larger than the whole budget still gets a batch of its own.
///
/// When any query is ranked the budget is divided by the candidate count of the first
/// ranked query, as each of its candidates occupies a slot.
pub struct DynamicBatcher<P> {
    max_batch_size: usize,
    limit_size: f64,
    tokenizer: Option<Arc<dyn Tokenizer<P>>>,
    max_token_length: usize,
    padding_side: PaddingSide,
    device: Option<Arc<dyn DeviceMemory>>,
}

impl<P> DynamicBatcher<P> {
    pub fn new(max_batch_size: usize, limit_size: f64) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            limit_size,
            tokenizer: None,
            max_token_length: 512,
            padding_side: PaddingSide::default(),
            device: None,
        }
    }

    /// Derive the budget from the device's free memory, falling back to the configured default.
    pub fn for_device(max_batch_size: usize, device: Arc<dyn DeviceMemory>, config: &SchedulerConfig) -> Self {
        let limit_size = config.limit_size_for(device.free_bytes());
        Self::new(max_batch_size, limit_size)
            .with_padding_side(config.padding_side)
            .with_device_memory(device)
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

    /// Release the device's cached allocations after each batching pass.
    pub fn with_device_memory(mut self, device: Arc<dyn DeviceMemory>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn limit_size(&self) -> f64 {
        self.limit_size
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Group instance indices, already sorted by descending length, under `limit`.
    fn pack(&self, instances: &[Instance<P>], sorted: &[usize], limit: f64) -> Vec<Vec<usize>> {
        let mut groups = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_max = 0usize;

        for &index in sorted {
            let len = instances[index].len();
            let widest = current_max.max(len);
            let cost = (widest as f64).powi(2) * current.len() as f64;

            if !current.is_empty() && (cost >= limit || current.len() >= self.max_batch_size) {
                debug!(size = current.len(), max_len = current_max, cost, limit, "closed dynamic batch");
                groups.push(std::mem::take(&mut current));
                current_max = len;
            } else {
                current_max = widest;
            }
            current.push(index);
        }
        if !current.is_empty() {
            debug!(size = current.len(), max_len = current_max, limit, "closed dynamic batch");
            groups.push(current);
        }
        groups
    }
}

impl<P> Batcher<P> for DynamicBatcher<P>
where P: PromptContent
{
    fn batch(&self, queries: &[Query<P>]) -> Result<(Vec<Batch<P>>, SchedulingPlan)> {
        let (instances, spans) = expand_all(queries, self.tokenizer.as_deref(), self.max_token_length);

        let candidate_size = queries
            .iter()
            .find(|query| query.is_ranked())
            .map_or(1, Query::instance_count);
        let limit = self.limit_size / candidate_size as f64;

        let mut order: Vec<usize> = (0..instances.len()).collect();
        order.sort_by(|&a, &b| instances[b].len().cmp(&instances[a].len()));

        let groups = self.pack(&instances, &order, limit);

        let mut slots: Vec<Option<Instance<P>>> = instances.into_iter().map(Some).collect();
        let batches = groups
            .iter()
            .map(|group| {
                let members: Vec<Instance<P>> = group.iter().filter_map(|&index| slots[index].take()).collect();
                match &self.tokenizer {
                    Some(tokenizer) => Batch::tokenized(members, tokenizer.pad_token_id(), None, self.padding_side),
                    None => Batch::new(members),
                }
            })
            .collect::<Vec<_>>();

        if let Some(device) = &self.device {
            device.release_cache();
        }

        Ok((batches, SchedulingPlan::new(order, spans)))
    }

    fn shrink(&mut self, policy: &RetryPolicy) {
        self.limit_size *= policy.dynamic_shrink;
        self.max_batch_size = scaled(self.max_batch_size, policy.dynamic_shrink);
        warn!(limit_size = self.limit_size, max_batch_size = self.max_batch_size, "shrunk dynamic batch limits");
    }

    fn policy(&self) -> BatchPolicy {
        BatchPolicy::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use proptest::prelude::*;

    fn completions(prompts: &[&str]) -> Vec<Query<String>> {
        prompts.iter().map(|p| Query::from(*p)).collect()
    }

    fn prompts(batches: &[Batch<String>]) -> Vec<Vec<String>> {
        batches.iter().map(|b| b.prompts().cloned().collect()).collect()
    }

    struct FixedDevice {
        free: Option<u64>,
        releases: AtomicUsize,
    }

    impl DeviceMemory for FixedDevice {
        fn free_bytes(&self) -> Option<u64> {
            self.free
        }

        fn release_cache(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_sorted_longest_first_and_restored() {
        let queries = completions(&["abc", "abcdefghij", "abcde"]);
        let (batches, plan) = DynamicBatcher::new(1024, 65536.0).batch(&queries).unwrap();

        assert_eq!(prompts(&batches), vec![vec!["abcdefghij", "abcde", "abc"]]);
        assert_eq!(plan.order(), &[1, 2, 0]);

        let emitted: Vec<String> = batches.into_iter().flat_map(|b| b.prompts().cloned().collect::<Vec<_>>()).collect();
        let restored = plan.restore(emitted).unwrap();
        assert_eq!(restored, vec!["abc", "abcdefghij", "abcde"]);
    }

    #[test]
    fn test_budget_closes_batches() {
        // 10² × 1 = 100 >= 100 closes after the first instance
        let queries = completions(&["aaaaaaaaaa", "bbbbbbbbbb", "cc"]);
        let (batches, _) = DynamicBatcher::new(1024, 100.0).batch(&queries).unwrap();

        assert_eq!(prompts(&batches), vec![vec!["aaaaaaaaaa"], vec!["bbbbbbbbbb"], vec!["cc"]]);
    }

    #[test]
    fn test_oversized_instance_gets_own_batch() {
        let queries = completions(&["x".repeat(1000).as_str(), "y"]);
        let (batches, _) = DynamicBatcher::new(1024, 10.0).batch(&queries).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].max_len(), 1000);
    }

    #[test]
    fn test_max_batch_size_caps_batches() {
        let queries = completions(&["a", "b", "c", "d", "e"]);
        let (batches, _) = DynamicBatcher::new(2, 65536.0).batch(&queries).unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        // equal lengths keep submission order
        assert_eq!(prompts(&batches)[0], vec!["a", "b"]);
    }

    #[test]
    fn test_ranked_budget_divided_by_candidates() {
        // prompt length 4: cost of adding to a batch of n is 16n, budget 64 / 2 = 32
        let queries = vec![
            Query::ranked("abcd".to_string(), ["yes", "no"]).unwrap(),
            Query::ranked("wxyz".to_string(), ["yes", "no"]).unwrap(),
        ];
        let batcher = DynamicBatcher::new(1024, 64.0);
        let (batches, plan) = batcher.batch(&queries).unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2]);
        assert_eq!(plan.instance_count(), 4);
        // building batches leaves the configured budget untouched
        assert_eq!(batcher.limit_size(), 64.0);
    }

    #[test]
    fn test_budget_from_device_and_cache_release() {
        let device = Arc::new(FixedDevice {
            free: Some(65536 * 100),
            releases: AtomicUsize::new(0),
        });
        let batcher = DynamicBatcher::for_device(16, device.clone(), &SchedulerConfig::default());
        assert_eq!(batcher.limit_size(), 100.0);

        batcher.batch(&completions(&["a", "b"])).unwrap();
        assert_eq!(device.releases.load(Ordering::SeqCst), 1);

        let blind = Arc::new(FixedDevice { free: None, releases: AtomicUsize::new(0) });
        let batcher = DynamicBatcher::<String>::for_device(16, blind, &SchedulerConfig::default());
        assert_eq!(batcher.limit_size(), 65536.0);
    }

    #[test]
    fn test_shrink_scales_both_limits() {
        let mut batcher = DynamicBatcher::<String>::new(10, 1000.0);
        batcher.shrink(&RetryPolicy::default());

        assert_eq!(batcher.max_batch_size(), 9);
        assert!((batcher.limit_size() - 900.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        let (batches, plan) = DynamicBatcher::<String>::new(4, 100.0).batch(&[]).unwrap();
        assert!(batches.is_empty());
        assert_eq!(plan.query_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_every_instance_batched_once_and_restored(
            lengths in prop::collection::vec(1usize..64, 0..48),
            max_batch_size in 1usize..16,
            limit in 1.0f64..20000.0,
        ) {
            let queries: Vec<Query<String>> = lengths
                .iter()
                .enumerate()
                .map(|(i, len)| Query::completion(format!("{i}:{}", "x".repeat(*len))))
                .collect();
            let (batches, plan) = DynamicBatcher::new(max_batch_size, limit).batch(&queries).unwrap();

            let total: usize = batches.iter().map(Batch::len).sum();
            prop_assert_eq!(total, queries.len());
            prop_assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= max_batch_size));

            let emitted: Vec<String> = batches.iter().flat_map(|b| b.prompts().cloned().collect::<Vec<_>>()).collect();
            let restored = plan.restore(emitted).unwrap();
            let submitted: Vec<String> = queries.iter().map(|q| q.prompt().clone()).collect();
            prop_assert_eq!(restored, submitted);
        }

        #[test]
        fn prop_multi_instance_batches_respect_budget(
            lengths in prop::collection::vec(1usize..64, 1..48),
            limit in 1.0f64..20000.0,
        ) {
            let queries: Vec<Query<String>> = lengths.iter().map(|len| Query::completion("x".repeat(*len))).collect();
            let (batches, _) = DynamicBatcher::new(1024, limit).batch(&queries).unwrap();

            for batch in &batches {
                let width = batch.max_len() as f64;
                let admitted = (batch.len() - 1) as f64;
                // the last admitted instance saw a cost of width² × (len - 1)
                let cost = width * width * admitted;
                prop_assert!(batch.len() == 1 || cost < limit);
            }
        }
    }
}
