use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use super::Embedding;

/// The merged result of a ranked query.
///
/// `scores` is the softmax of `logits` over the query's candidates, so it sums to one,
/// and `prediction` is the candidate with the highest score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResponse {
    prediction: String,
    scores: BTreeMap<String, f64>,
    logits: BTreeMap<String, f64>,
    embeddings: Option<Embedding>,
}

impl RankedResponse {
    pub fn new(
        prediction: String,
        scores: BTreeMap<String, f64>,
        logits: BTreeMap<String, f64>,
        embeddings: Option<Embedding>,
    ) -> Self {
        Self {
            prediction,
            scores,
            logits,
            embeddings,
        }
    }

    pub fn prediction(&self) -> &str {
        &self.prediction
    }

    /// Normalized probability per candidate
    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    /// Raw per-candidate scores as produced by the backend
    pub fn logits(&self) -> &BTreeMap<String, f64> {
        &self.logits
    }

    pub fn embeddings(&self) -> Option<&Embedding> {
        self.embeddings.as_ref()
    }
}
