use serde::{Deserialize, Serialize};

/// A query asking the model to complete a single prompt.
///
/// The prompt is opaque to the scheduler: text, token ids or a tensor all work as long
/// as the payload implements [`PromptContent`](crate::backend::PromptContent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionQuery<P> {
    prompt: P,
}

impl<P> CompletionQuery<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    pub fn into_prompt(self) -> P {
        self.prompt
    }
}
