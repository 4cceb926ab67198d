use serde::Serialize;
use crate::error::{Error, Result};

/// A query scoring a fixed, ordered set of candidates against one prompt.
///
/// Each candidate becomes its own atomic instance during batching, and the per-candidate
/// scores are merged back into a single [`RankedResponse`](crate::response::RankedResponse).
///
/// Queries may carry different candidate sets, but the dynamic packer divides its budget
/// by the candidate count of the first ranked query in a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedQuery<P> {
    prompt: P,
    candidates: Vec<String>,
}

impl<P> RankedQuery<P> {
    /// Create a ranked query, rejecting an empty candidate list.
    pub fn new<I, S>(prompt: P, candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates: Vec<String> = candidates.into_iter().map(Into::into).collect();
        if candidates.is_empty() {
            return Err(Error::EmptyCandidates);
        }
        Ok(Self { prompt, candidates })
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Number of atomic instances this query expands to.
    pub fn candidate_size(&self) -> usize {
        self.candidates.len()
    }

    /// Candidates joined with the `|||` answer-choice delimiter used by prompt templates.
    pub fn answer_choices(&self) -> String {
        self.candidates.join("|||")
    }
}
