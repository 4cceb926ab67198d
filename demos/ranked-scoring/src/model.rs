use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use fmbatch::batch::Batch;
use fmbatch::inference::ScoreRecord;
use fmbatch::response::CompletionResponse;
use fmbatch::{Inference, InferenceError};

/// A stand-in model that scores a candidate by how many of its words occur in the prompt.
///
/// The first batch it sees fails with an out-of-memory error, to show the scheduler
/// shrinking and retrying.
pub struct WordOverlap {
    exhausted_once: AtomicBool,
}

impl WordOverlap {
    pub fn new() -> Self {
        Self {
            exhausted_once: AtomicBool::new(false),
        }
    }

    fn check_memory(&self, batch: &Batch<String>) -> Result<(), InferenceError> {
        if !self.exhausted_once.swap(true, Ordering::SeqCst) {
            return Err(InferenceError::resource_exhausted(format!(
                "cannot fit {} instances of width {}",
                batch.len(),
                batch.max_len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Inference<String> for WordOverlap {
    async fn generate_batch(&self, batch: &Batch<String>) -> Result<Vec<CompletionResponse>, InferenceError> {
        self.check_memory(batch)?;
        Ok(batch
            .prompts()
            .map(|prompt| CompletionResponse::new(prompt.split_whitespace().rev().collect::<Vec<_>>().join(" ")))
            .collect())
    }

    async fn score_batch(&self, batch: &Batch<String>) -> Result<Vec<ScoreRecord>, InferenceError> {
        self.check_memory(batch)?;
        Ok(batch
            .instances()
            .iter()
            .map(|instance| {
                let prompt = instance.prompt().to_lowercase();
                let overlap = instance
                    .candidate()
                    .unwrap_or_default()
                    .split_whitespace()
                    .filter(|word| prompt.contains(&word.to_lowercase()))
                    .count();
                ScoreRecord::new(overlap as f64)
            })
            .collect())
    }
}
