//! Deterministic in-process model for exercising the scheduler.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use async_trait::async_trait;
use crate::batch::Batch;
use crate::error::InferenceError;
use crate::response::{CompletionResponse, Embedding};
use super::{BackendCapabilities, Inference, Reduction, ScoreRecord};

/// Echoes prompts back and records every batch it is handed.
///
/// * generate: the prompt upper-cased, scored by its length
/// * score: logit 2.0 when the prompt mentions the candidate, 0.5 otherwise
/// * encode: `[prompt length, 0.0 for mean or 1.0 for concat]`, one short when truncating
pub(crate) struct MockModel {
    capabilities: BackendCapabilities,
    oom_failures: AtomicUsize,
    fatal: AtomicBool,
    truncating: AtomicBool,
    batch_sizes: Mutex<Vec<usize>>,
    encoded: Mutex<Vec<String>>,
}

impl MockModel {
    pub(crate) fn new() -> Self {
        Self::with_capabilities(BackendCapabilities::default())
    }

    pub(crate) fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            oom_failures: AtomicUsize::new(0),
            fatal: AtomicBool::new(false),
            truncating: AtomicBool::new(false),
            batch_sizes: Mutex::new(Vec::new()),
            encoded: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `count` calls with resource exhaustion.
    pub(crate) fn fail_next(self, count: usize) -> Self {
        self.oom_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every call with a non-recoverable backend error.
    pub(crate) fn broken(self) -> Self {
        self.fatal.store(true, Ordering::SeqCst);
        self
    }

    /// Drop the last embedding of every encoded batch.
    pub(crate) fn truncating(self) -> Self {
        self.truncating.store(true, Ordering::SeqCst);
        self
    }

    /// Sizes of every batch received, failed calls included
    pub(crate) fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    /// Prompts that actually reached `encode_batch`
    pub(crate) fn encoded(&self) -> Vec<String> {
        self.encoded.lock().unwrap().clone()
    }

    fn admit(&self, batch: &Batch<String>) -> Result<(), InferenceError> {
        self.batch_sizes.lock().unwrap().push(batch.len());
        if self.fatal.load(Ordering::SeqCst) {
            return Err(InferenceError::Backend(Box::new(std::io::Error::other("device lost"))));
        }
        let exhausted = self
            .oom_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if exhausted {
            return Err(InferenceError::resource_exhausted("CUDA out of memory"));
        }
        Ok(())
    }
}

#[async_trait]
impl Inference<String> for MockModel {
    async fn generate_batch(&self, batch: &Batch<String>) -> Result<Vec<CompletionResponse>, InferenceError> {
        self.admit(batch)?;
        Ok(batch
            .prompts()
            .map(|prompt| CompletionResponse::new(prompt.to_uppercase()).with_score(prompt.len() as f64))
            .collect())
    }

    async fn score_batch(&self, batch: &Batch<String>) -> Result<Vec<ScoreRecord>, InferenceError> {
        self.admit(batch)?;
        Ok(batch
            .instances()
            .iter()
            .map(|instance| {
                let candidate = instance.candidate().unwrap_or_default();
                let logit = if instance.prompt().contains(candidate) { 2.0 } else { 0.5 };
                ScoreRecord::new(logit).with_hidden_state(vec![instance.prompt().len() as f32])
            })
            .collect())
    }

    async fn encode_batch(&self, batch: &Batch<String>, reduction: Reduction) -> Result<Vec<Embedding>, InferenceError> {
        self.admit(batch)?;
        self.encoded.lock().unwrap().extend(batch.prompts().cloned());
        let marker = match reduction {
            Reduction::Mean => 0.0,
            Reduction::Concat => 1.0,
        };
        let mut embeddings: Vec<Embedding> = batch.prompts().map(|prompt| vec![prompt.len() as f32, marker]).collect();
        if self.truncating.load(Ordering::SeqCst) {
            embeddings.pop();
        }
        Ok(embeddings)
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }
}
