//! # Queries
//!
//! A [`Query`] is one logical request. Completion queries expand to a single atomic
//! instance; ranked queries expand to one instance per candidate, all sharing the
//! prompt's length estimate.
//!
//! Untyped input (for example a JSON payload received over the wire) is converted with
//! `Query::<String>::try_from(value)`, which is the only place an unrecognised shape can
//! show up and fails with [`Error::UnsupportedQueryType`].

mod completion;
mod ranked;

pub use completion::CompletionQuery;
pub use ranked::RankedQuery;

use serde::Serialize;
use serde_json::Value;
use crate::backend::{PromptContent, Tokenizer};
use crate::batch::Instance;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Query<P> {
    Completion(CompletionQuery<P>),
    Ranked(RankedQuery<P>),
}

impl<P> Query<P> {
    /// Wrap plain prompt content as a completion query.
    pub fn completion(prompt: P) -> Self {
        Query::Completion(CompletionQuery::new(prompt))
    }

    pub fn ranked<I, S>(prompt: P, candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Query::Ranked(RankedQuery::new(prompt, candidates)?))
    }

    pub fn prompt(&self) -> &P {
        match self {
            Query::Completion(query) => query.prompt(),
            Query::Ranked(query) => query.prompt(),
        }
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, Query::Ranked(_))
    }

    /// Number of atomic instances this query contributes to a batch.
    pub fn instance_count(&self) -> usize {
        match self {
            Query::Completion(_) => 1,
            Query::Ranked(query) => query.candidate_size(),
        }
    }
}

impl<P> Query<P>
where P: PromptContent
{
    /// Expand into atomic instances with their length estimates.
    ///
    /// With a tokenizer the estimate is the (truncated) token count, otherwise the
    /// content's own [`len_estimate`](PromptContent::len_estimate). Every candidate of a
    /// ranked query carries the prompt's estimate.
    pub(crate) fn expand(
        &self,
        tokenizer: Option<&dyn Tokenizer<P>>,
        max_token_length: usize,
    ) -> Vec<Instance<P>> {
        match self {
            Query::Completion(query) => {
                vec![Instance::measure(query.prompt(), tokenizer, max_token_length)]
            }
            Query::Ranked(query) => {
                let measured = Instance::measure(query.prompt(), tokenizer, max_token_length);
                query.candidates()
                    .iter()
                    .map(|candidate| measured.with_candidate(candidate.clone()))
                    .collect()
            }
        }
    }
}

impl<P> From<CompletionQuery<P>> for Query<P> {
    fn from(query: CompletionQuery<P>) -> Self {
        Query::Completion(query)
    }
}

impl<P> From<RankedQuery<P>> for Query<P> {
    fn from(query: RankedQuery<P>) -> Self {
        Query::Ranked(query)
    }
}

impl From<String> for Query<String> {
    fn from(prompt: String) -> Self {
        Query::completion(prompt)
    }
}

impl From<&str> for Query<String> {
    fn from(prompt: &str) -> Self {
        Query::completion(prompt.to_string())
    }
}

impl TryFrom<Value> for Query<String> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(prompt) => Ok(Query::completion(prompt)),
            // paired `[prompt, candidate]` form
            Value::Array(items) => match items.as_slice() {
                [Value::String(prompt), Value::String(candidate)] => {
                    Query::ranked(prompt.clone(), [candidate.clone()])
                }
                _ => Err(unsupported("array")),
            },
            Value::Object(mut fields) => {
                let prompt = match fields.remove("prompt") {
                    Some(Value::String(prompt)) => prompt,
                    Some(other) => return Err(unsupported(json_type_name(&other))),
                    None => return Err(unsupported("object without prompt")),
                };
                match fields.remove("candidates") {
                    None | Some(Value::Null) => Ok(Query::completion(prompt)),
                    Some(Value::Array(candidates)) => {
                        let candidates = candidates
                            .into_iter()
                            .map(|candidate| match candidate {
                                Value::String(candidate) => Ok(candidate),
                                other => Err(unsupported(json_type_name(&other))),
                            })
                            .collect::<Result<Vec<_>>>()?;
                        Query::ranked(prompt, candidates)
                    }
                    Some(other) => Err(unsupported(json_type_name(&other))),
                }
            }
            other => Err(unsupported(json_type_name(&other))),
        }
    }
}

fn unsupported(type_name: &str) -> Error {
    Error::UnsupportedQueryType {
        type_name: type_name.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
