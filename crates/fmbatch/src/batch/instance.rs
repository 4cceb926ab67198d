use crate::backend::{PromptContent, Tokenizer};

/// One atomic unit sent to the backend: a prompt, optionally paired with a candidate.
///
/// Instances only live for one scheduling run.
#[derive(Debug, Clone)]
pub struct Instance<P> {
    prompt: P,
    candidate: Option<String>,
    tokens: Option<Vec<u32>>,
    len: usize,
}

impl<P> Instance<P>
where P: PromptContent
{
    /// Measure a prompt, tokenizing it when a tokenizer is available.
    pub(crate) fn measure(
        prompt: &P,
        tokenizer: Option<&dyn Tokenizer<P>>,
        max_token_length: usize,
    ) -> Self {
        let tokens = tokenizer.map(|tokenizer| {
            let mut ids = tokenizer.encode(prompt);
            ids.truncate(max_token_length);
            ids
        });
        let len = match &tokens {
            Some(ids) => ids.len(),
            None => prompt.len_estimate(),
        };

        Self {
            prompt: prompt.clone(),
            candidate: None,
            tokens,
            len,
        }
    }

    /// Pair a copy of this instance with a candidate, keeping the prompt's length.
    pub(crate) fn with_candidate(&self, candidate: String) -> Self {
        Self {
            candidate: Some(candidate),
            ..self.clone()
        }
    }
}

impl<P> Instance<P> {
    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    pub fn candidate(&self) -> Option<&str> {
        self.candidate.as_deref()
    }

    /// Token ids, present only when the run was pre-tokenized
    pub fn tokens(&self) -> Option<&[u32]> {
        self.tokens.as_deref()
    }

    /// Length estimate used for packing
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
