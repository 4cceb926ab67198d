//! # Inference backends
//!
//! The scheduler talks to a model through the [`Inference`] trait, one batch at a time.
//! A backend implements the modes it supports and reports what kind of batching it can
//! take through [`BackendCapabilities`].

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::backend::PromptContent;
use crate::batch::Batch;
use crate::error::{Error, InferenceError};
use crate::response::{CompletionResponse, Embedding};

/// What the backend is asked to produce for each instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Generate,
    Score,
    Encode,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Generate => write!(f, "generate"),
            Mode::Score => write!(f, "score"),
            Mode::Encode => write!(f, "encode"),
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generate" => Ok(Mode::Generate),
            "score" => Ok(Mode::Score),
            "encode" => Ok(Mode::Encode),
            other => Err(Error::InvalidConfig {
                message: format!("unknown mode {other:?}"),
            }),
        }
    }
}

/// How per-token hidden states are collapsed into one embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    #[default]
    Mean,
    Concat,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Mean => write!(f, "mean"),
            Reduction::Concat => write!(f, "concat"),
        }
    }
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Reduction::Mean),
            "concat" => Ok(Reduction::Concat),
            other => Err(Error::InvalidConfig {
                message: format!("unknown reduction {other:?}"),
            }),
        }
    }
}

/// The raw score of one prompt/candidate pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub logit: f64,
    pub hidden_state: Option<Embedding>,
}

impl ScoreRecord {
    pub fn new(logit: f64) -> Self {
        Self {
            logit,
            hidden_state: None,
        }
    }

    pub fn with_hidden_state(mut self, hidden_state: Embedding) -> Self {
        self.hidden_state = Some(hidden_state);
        self
    }
}

/// One backend output, before ranked records are merged per query.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Completion(CompletionResponse),
    Score(ScoreRecord),
    Embedding(Embedding),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Completion(_) => "completion",
            Record::Score(_) => "score",
            Record::Embedding(_) => "embedding",
        }
    }
}

/// What a backend can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether batches may vary in size and padded width
    pub dynamic_batching: bool,
    /// Hard cap on instances per batch, applied to static batching
    pub max_batch_size: Option<usize>,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            dynamic_batching: true,
            max_batch_size: None,
        }
    }
}

impl BackendCapabilities {
    /// A remote API that serves one request at a time.
    pub fn remote() -> Self {
        Self {
            dynamic_batching: false,
            max_batch_size: Some(1),
        }
    }
}

/// A model that runs batched inference.
///
/// Each method receives a whole batch and must return exactly one output per instance,
/// in the batch's order. Out-of-memory conditions must be reported as
/// [`InferenceError::ResourceExhausted`]; the scheduler then shrinks its batches and
/// retries. Any other error aborts the run.
///
/// Modes a backend does not implement fail with [`InferenceError::Unsupported`].
///
/// # Type Parameters
///
/// * `P` - The prompt content the backend consumes
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use fmbatch::batch::Batch;
/// use fmbatch::error::InferenceError;
/// use fmbatch::inference::Inference;
/// use fmbatch::response::CompletionResponse;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Inference<String> for Echo {
///     async fn generate_batch(&self, batch: &Batch<String>) -> Result<Vec<CompletionResponse>, InferenceError> {
///         Ok(batch.prompts().map(|p| CompletionResponse::new(p.clone())).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait Inference<P>: Send + Sync
where P: PromptContent
{
    /// Produce a completion per instance.
    async fn generate_batch(&self, _batch: &Batch<P>) -> Result<Vec<CompletionResponse>, InferenceError> {
        Err(InferenceError::Unsupported { mode: Mode::Generate })
    }

    /// Score each prompt/candidate instance.
    async fn score_batch(&self, _batch: &Batch<P>) -> Result<Vec<ScoreRecord>, InferenceError> {
        Err(InferenceError::Unsupported { mode: Mode::Score })
    }

    /// Embed each instance, collapsing hidden states with `reduction`.
    async fn encode_batch(&self, _batch: &Batch<P>, _reduction: Reduction) -> Result<Vec<Embedding>, InferenceError> {
        Err(InferenceError::Unsupported { mode: Mode::Encode })
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}

#[async_trait]
impl<P, T> Inference<P> for Arc<T>
where
    P: PromptContent,
    T: Inference<P> + ?Sized,
{
    async fn generate_batch(&self, batch: &Batch<P>) -> Result<Vec<CompletionResponse>, InferenceError> {
        (**self).generate_batch(batch).await
    }

    async fn score_batch(&self, batch: &Batch<P>) -> Result<Vec<ScoreRecord>, InferenceError> {
        (**self).score_batch(batch).await
    }

    async fn encode_batch(&self, batch: &Batch<P>, reduction: Reduction) -> Result<Vec<Embedding>, InferenceError> {
        (**self).encode_batch(batch, reduction).await
    }

    fn capabilities(&self) -> BackendCapabilities {
        (**self).capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GenerateOnly;

    #[async_trait]
    impl Inference<String> for GenerateOnly {
        async fn generate_batch(&self, batch: &Batch<String>) -> Result<Vec<CompletionResponse>, InferenceError> {
            Ok(batch.prompts().map(|p| CompletionResponse::new(p.clone())).collect())
        }
    }

    #[tokio::test]
    async fn test_unimplemented_modes_are_unsupported() {
        let batch = Batch::new(vec![]);
        let err = GenerateOnly.score_batch(&batch).await.unwrap_err();

        assert!(matches!(err, InferenceError::Unsupported { mode: Mode::Score }));
        assert_eq!(err.to_string(), "backend does not support score mode");
        assert!(GenerateOnly.capabilities().dynamic_batching);
    }

    #[tokio::test]
    async fn test_arc_forwards_to_inner() {
        let model: Arc<dyn Inference<String>> = Arc::new(GenerateOnly);
        let batch = Batch::new(vec![]);

        assert!(model.generate_batch(&batch).await.unwrap().is_empty());
        assert!(model.encode_batch(&batch, Reduction::Mean).await.is_err());
    }

    #[test]
    fn test_mode_and_reduction_parse() {
        assert_eq!("ENCODE".parse::<Mode>().unwrap(), Mode::Encode);
        assert_eq!("concat".parse::<Reduction>().unwrap(), Reduction::Concat);
        assert!(matches!("rank".parse::<Mode>(), Err(Error::InvalidConfig { .. })));
        assert_eq!(BackendCapabilities::remote().max_batch_size, Some(1));
    }
}
