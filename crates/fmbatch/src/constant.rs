//! # Constants with reserved meanings in padded batches

/// In a tokenized batch shape, the `0th` dimension is the batch dimension
pub const BATCH_DIM: usize = 0;

/// In a tokenized batch shape, the `1st` dimension is the sequence dimension
pub const SEQ_DIM: usize = 1;
