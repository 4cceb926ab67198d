//! # Orchestrator
//!
//! Drives one scheduling run end to end: pick the mode, pick a batcher, build batches,
//! run them one at a time against the backend, and map the outputs back onto the
//! submitted queries.
//!
//! When the backend reports resource exhaustion the whole run is rebuilt from the
//! original queries with smaller limits. Results from the failed attempt are discarded,
//! so a run either returns one response per query or fails.

use std::sync::Arc;
use derive_builder::Builder;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use crate::backend::{DeviceMemory, PromptContent, Tokenizer};
use crate::batch::{Batch, BatchPolicy, Batcher, DynamicBatcher, StaticBatcher};
use crate::cache::EmbeddingCache;
use crate::config::SchedulerConfig;
use crate::error::{Error, InferenceError, Result};
use crate::inference::{Inference, Mode, Record, Reduction};
use crate::query::Query;
use crate::response::{Embedding, Response};

/// Per-call options of [`Orchestrator::forward`].
///
/// ```ignore
/// let options = ForwardOptionsBuilder::default()
///     .batch_policy(BatchPolicy::Static)
///     .batch_size(64)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(derive(Debug), build_fn(error = "crate::error::Error"))]
pub struct ForwardOptions {
    #[builder(default)]
    pub batch_policy: BatchPolicy,
    /// Instance cap per batch
    #[builder(default = "1024")]
    pub batch_size: usize,
    /// Requested mode; a ranked first query forces [`Mode::Score`]
    #[builder(default)]
    pub mode: Mode,
    /// Tokenize prompts for length estimates and padded batches when a tokenizer is attached
    #[builder(default = "true")]
    pub pretokenize: bool,
    #[builder(default)]
    pub reduction: Reduction,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            batch_policy: BatchPolicy::default(),
            batch_size: 1024,
            mode: Mode::default(),
            pretokenize: true,
            reduction: Reduction::default(),
        }
    }
}

impl ForwardOptions {
    fn with_mode(mode: Mode, batch_policy: BatchPolicy, batch_size: usize) -> Self {
        Self {
            batch_policy,
            batch_size,
            mode,
            ..Self::default()
        }
    }
}

/// Schedules queries onto one inference backend.
///
/// # Type Parameters
///
/// * `P` - The prompt content of the queries
/// * `M` - The backend, any [`Inference<P>`] (an `Arc<M>` works too)
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::new(model)
///     .with_tokenizer(Arc::new(tokenizer))
///     .with_device_memory(Arc::new(cuda));
///
/// let responses = orchestrator
///     .generate(&queries, BatchPolicy::Dynamic, 1024)
///     .await?;
/// assert_eq!(responses.len(), queries.len());
/// ```
pub struct Orchestrator<P, M> {
    model: M,
    config: SchedulerConfig,
    tokenizer: Option<Arc<dyn Tokenizer<P>>>,
    device: Option<Arc<dyn DeviceMemory>>,
    cache: Option<Mutex<EmbeddingCache<(Reduction, String)>>>,
}

impl<P, M> Orchestrator<P, M>
where
    P: PromptContent,
    M: Inference<P>,
{
    pub fn new(model: M) -> Self {
        Self {
            model,
            config: SchedulerConfig::default(),
            tokenizer: None,
            device: None,
            cache: None,
        }
    }

    /// Replace the scheduler configuration, rejecting invalid settings.
    pub fn with_config(mut self, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        if let Some(cache) = &mut self.cache {
            *cache.get_mut() = EmbeddingCache::new(config.embedding_cache_capacity);
        }
        self.config = config;
        Ok(self)
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer<P>>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_device_memory(mut self, device: Arc<dyn DeviceMemory>) -> Self {
        self.device = Some(device);
        self
    }

    /// Memoize embeddings of prompts that provide a cache key.
    pub fn with_embedding_cache(mut self) -> Self {
        self.cache = Some(Mutex::new(EmbeddingCache::new(self.config.embedding_cache_capacity)));
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Run `queries` and return one response per query, in submission order.
    pub async fn forward(&self, queries: &[Query<P>], options: &ForwardOptions) -> Result<Vec<Response>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        if options.batch_size == 0 {
            return Err(Error::InvalidConfig {
                message: "batch_size must be at least 1".to_string(),
            });
        }

        let mode = select_mode(queries, options.mode);
        check_mode(queries, mode)?;

        let run_id = Uuid::new_v4();
        let span = info_span!("forward", %run_id, %mode, queries = queries.len());
        self.run(queries, mode, options).instrument(span).await
    }

    /// [`forward`](Self::forward) driven to completion on the current thread.
    pub fn forward_blocking(&self, queries: &[Query<P>], options: &ForwardOptions) -> Result<Vec<Response>> {
        futures::executor::block_on(self.forward(queries, options))
    }

    pub async fn generate(&self, queries: &[Query<P>], batch_policy: BatchPolicy, batch_size: usize) -> Result<Vec<Response>> {
        self.forward(queries, &ForwardOptions::with_mode(Mode::Generate, batch_policy, batch_size)).await
    }

    pub async fn score(&self, queries: &[Query<P>], batch_policy: BatchPolicy, batch_size: usize) -> Result<Vec<Response>> {
        self.forward(queries, &ForwardOptions::with_mode(Mode::Score, batch_policy, batch_size)).await
    }

    /// Embed every query. Ranked queries yield the embedding attached to their merged response.
    pub async fn encode(
        &self,
        queries: &[Query<P>],
        batch_policy: BatchPolicy,
        batch_size: usize,
        reduction: Reduction,
    ) -> Result<Vec<Embedding>> {
        let options = ForwardOptions {
            reduction,
            ..ForwardOptions::with_mode(Mode::Encode, batch_policy, batch_size)
        };
        self.forward(queries, &options)
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, response)| response.into_embedding().ok_or(Error::MissingEmbedding { index }))
            .collect()
    }

    /// Run a single query: generate for a completion query, score for a ranked one.
    pub async fn run_one(&self, query: Query<P>) -> Result<Response> {
        let queries = [query];
        let mut responses = self.forward(&queries, &ForwardOptions::with_mode(Mode::Generate, BatchPolicy::Static, 1024)).await?;
        responses.pop().ok_or(Error::ReorderLengthMismatch { expected: 1, actual: 0 })
    }

    async fn run(&self, queries: &[Query<P>], mode: Mode, options: &ForwardOptions) -> Result<Vec<Response>> {
        let mut batcher = self.select_batcher(options);
        let max_attempts = self.config.retry.max_attempts;
        let mut attempt = 1;

        loop {
            let (batches, plan) = batcher.batch(queries)?;
            info!(attempt, policy = %batcher.policy(), batches = batches.len(), instances = plan.instance_count(), "running batches");

            match self.run_batches(&batches, mode, options.reduction).await {
                Ok(records) => {
                    let responses = plan.reorder(records)?;
                    self.release_device_cache();
                    return Ok(responses);
                }
                Err(err) if err.is_resource_exhausted() => {
                    self.release_device_cache();
                    if attempt >= max_attempts {
                        return Err(Error::ResourceExhaustion {
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }
                    warn!(attempt, max_attempts, error = %err, "backend out of memory, rebuilding smaller batches");
                    batcher.shrink(&self.config.retry);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn select_batcher(&self, options: &ForwardOptions) -> Box<dyn Batcher<P>> {
        let capabilities = self.model.capabilities();
        let tokenizer = self.tokenizer.clone().filter(|_| options.pretokenize);
        let max_token_length = self.config.max_token_length;

        if options.batch_policy == BatchPolicy::Dynamic {
            if capabilities.dynamic_batching {
                let mut batcher = match self.device.clone() {
                    Some(device) => DynamicBatcher::for_device(options.batch_size, device, &self.config),
                    None => DynamicBatcher::new(options.batch_size, self.config.default_limit_size)
                        .with_padding_side(self.config.padding_side),
                };
                if let Some(tokenizer) = tokenizer.clone() {
                    batcher = batcher.with_tokenizer(tokenizer, max_token_length);
                }
                return Box::new(batcher);
            }
            warn!("backend does not support dynamic batching, falling back to static");
        }

        let batch_size = capabilities
            .max_batch_size
            .map_or(options.batch_size, |cap| cap.min(options.batch_size));
        let mut batcher = StaticBatcher::new(batch_size).with_padding_side(self.config.padding_side);
        if let Some(tokenizer) = tokenizer {
            batcher = batcher.with_tokenizer(tokenizer, max_token_length);
        }
        Box::new(batcher)
    }

    async fn run_batches(&self, batches: &[Batch<P>], mode: Mode, reduction: Reduction) -> std::result::Result<Vec<Record>, InferenceError> {
        let mut records = Vec::with_capacity(batches.iter().map(Batch::len).sum());

        for (batch_id, batch) in batches.iter().enumerate() {
            let produced: Vec<Record> = match mode {
                Mode::Generate => self.model.generate_batch(batch).await?.into_iter().map(Record::Completion).collect(),
                Mode::Score => self.model.score_batch(batch).await?.into_iter().map(Record::Score).collect(),
                Mode::Encode => self.encode_batch(batch, reduction).await?.into_iter().map(Record::Embedding).collect(),
            };
            if produced.len() != batch.len() {
                return Err(InferenceError::MalformedResponse {
                    expected: batch.len(),
                    actual: produced.len(),
                });
            }
            debug!(batch_id, size = batch.len(), max_len = batch.max_len(), "batch complete");
            records.extend(produced);
        }
        Ok(records)
    }

    /// Encode a batch, serving memoized instances and sending only the misses to the backend.
    async fn encode_batch(&self, batch: &Batch<P>, reduction: Reduction) -> std::result::Result<Vec<Embedding>, InferenceError> {
        let Some(cache) = &self.cache else {
            return self.model.encode_batch(batch, reduction).await;
        };

        let keys: Vec<Option<(Reduction, String)>> = batch
            .prompts()
            .map(|prompt| prompt.cache_key().map(|key| (reduction, key)))
            .collect();

        let mut cache = cache.lock().await;
        cache
            .get_or_embed(&keys, |missing| async move {
                if missing.len() == batch.len() {
                    self.model.encode_batch(batch, reduction).await
                } else {
                    self.model.encode_batch(&batch.select(&missing), reduction).await
                }
            })
            .await
    }

    fn release_device_cache(&self) {
        if let Some(device) = &self.device {
            device.release_cache();
        }
    }
}

/// A ranked first query forces score mode; otherwise the requested mode stands.
fn select_mode<P>(queries: &[Query<P>], requested: Mode) -> Mode {
    match queries.first() {
        Some(query) if query.is_ranked() => Mode::Score,
        _ => requested,
    }
}

/// Score runs take only ranked queries, generate and encode runs only completions.
fn check_mode<P>(queries: &[Query<P>], mode: Mode) -> Result<()> {
    let wants_ranked = mode == Mode::Score;
    match queries.iter().position(|query| query.is_ranked() != wants_ranked) {
        Some(index) => Err(Error::ModeMismatch { index, mode }),
        None => Ok(()),
    }
}
