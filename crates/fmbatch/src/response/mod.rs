//! # Responses
//!
//! [`Response`] is what a run hands back for each submitted query, in submission order.

mod completion;
mod ranked;

pub use completion::CompletionResponse;
pub use ranked::RankedResponse;

use serde::{Deserialize, Serialize};

/// A dense vector produced by encoding a prompt.
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    // Ranked must be tried first: its payload is a superset of a completion's fields.
    Ranked(RankedResponse),
    Completion(CompletionResponse),
    Embedding(Embedding),
}

impl Response {
    pub fn prediction(&self) -> Option<&str> {
        match self {
            Response::Ranked(response) => Some(response.prediction()),
            Response::Completion(response) => Some(response.prediction()),
            Response::Embedding(_) => None,
        }
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        match self {
            Response::Ranked(response) => response.embeddings(),
            Response::Completion(response) => response.embedding(),
            Response::Embedding(embedding) => Some(embedding),
        }
    }

    pub fn into_embedding(self) -> Option<Embedding> {
        match self {
            Response::Embedding(embedding) => Some(embedding),
            other => other.embedding().cloned(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse either response variant; a payload with `scores` is a ranked response.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<CompletionResponse> for Response {
    fn from(response: CompletionResponse) -> Self {
        Response::Completion(response)
    }
}

impl From<RankedResponse> for Response {
    fn from(response: RankedResponse) -> Self {
        Response::Ranked(response)
    }
}
