use std::fmt::Debug;

/// The trait that must be fulfilled by any prompt payload to be scheduled.
///
/// The scheduler never looks inside a prompt beyond these two questions.
pub trait PromptContent: Debug + Clone + Send + Sync + 'static {
    /// Length estimate used for packing when no tokenizer is supplied
    fn len_estimate(&self) -> usize;

    /// Key under which this prompt's embedding may be memoized, if any
    fn cache_key(&self) -> Option<String> {
        None
    }
}

impl PromptContent for String {
    fn len_estimate(&self) -> usize {
        self.chars().count()
    }

    fn cache_key(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl<T> PromptContent for Vec<T>
where T: Debug + Clone + Send + Sync + 'static
{
    fn len_estimate(&self) -> usize {
        self.len()
    }
}

/// Converts a prompt into token ids for length estimation and pre-tokenized batches.
pub trait Tokenizer<P>: Send + Sync {
    /// Encode the prompt into token ids
    fn encode(&self, prompt: &P) -> Vec<u32>;

    /// Token id used to pad shorter sequences in a batch
    fn pad_token_id(&self) -> u32;
}

/// Handle on the device whose memory the scheduler is budgeting.
pub trait DeviceMemory: Send + Sync {
    /// Free device memory in bytes, or `None` when it cannot be measured
    fn free_bytes(&self) -> Option<u64>;

    /// Release cached allocations held by the device allocator
    fn release_cache(&self) {}
}
