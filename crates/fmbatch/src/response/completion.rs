use serde::{Deserialize, Serialize};
use super::Embedding;

/// The result of a completion query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    prediction: String,
    score: Option<f64>,
    embedding: Option<Embedding>,
}

impl CompletionResponse {
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            score: None,
            embedding: None,
        }
    }

    /// Attach the model's confidence in the prediction.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn prediction(&self) -> &str {
        &self.prediction
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }
}
