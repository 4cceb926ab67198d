//! # fmbatch
//!
//! Adaptive, memory-aware batching of foundation model queries.
//!
//! ## Overview
//!
//! Callers submit a sequence of queries and get back one response per query, in the
//! order they were submitted. In between, the library groups the queries into batches
//! sized to fit the device, runs the batches one at a time against an inference backend,
//! and recovers from out-of-memory failures by rebuilding smaller batches.
//!
//! Key components include:
//!
//! - [`Query`](query::Query): a completion query, or a ranked query scoring a set of candidates
//! - [`StaticBatcher`](batch::StaticBatcher) and [`DynamicBatcher`](batch::DynamicBatcher)
//! - [`SchedulingPlan`](batch::SchedulingPlan): restores submission order and merges ranked scores
//! - [`Orchestrator`](orchestrator::Orchestrator): the retrying run loop
//! - [`EmbeddingCache`](cache::EmbeddingCache): an optional memo for encode runs
//!
//! ## Architecture
//!
//! ### Assumptions
//! Padded token batches reserve two dimensions with special meanings:
//!  - The `0th` dimension is the batch dimension
//!  - The `1st` dimension is the sequence dimension
//!
//! ### Backend Traits
//!
//! [`PromptContent`](backend::PromptContent) is all the scheduler needs to know about a
//! prompt: a length estimate and, optionally, a memo key. A
//! [`Tokenizer`](backend::Tokenizer) sharpens the length estimate and lets batches carry
//! padded token ids; a [`DeviceMemory`](backend::DeviceMemory) handle sets the packing
//! budget from free device memory.
//!
//! ### Inference
//!
//! A model plugs in through [`Inference`](inference::Inference). It reports
//! out-of-memory as a typed [`InferenceError::ResourceExhausted`](error::InferenceError),
//! which is the only failure the scheduler retries.
//!
//! ## Features
//!
//! - **candle** - `PromptContent` for candle tensors and candle conversion of padded batches
//! - **burn** - `PromptContent` for burn tensors and burn conversion of padded batches
//!
//! ## Configuration
//!
//! Memory heuristics, token limits and the retry policy live in
//! [`SchedulerConfig`](config::SchedulerConfig), which can be deserialized or read from
//! `FMBATCH_*` environment variables.
//!
//! ## Logging
//!
//! Events are emitted through [`tracing`]. Each run opens a `forward` span carrying a
//! random `run_id`; retries are logged at `warn`, per-batch progress at `debug`.

pub mod backend;
pub mod batch;
pub mod cache;
pub mod config;
pub mod constant;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod query;
pub mod response;

pub use batch::BatchPolicy;
pub use config::SchedulerConfig;
pub use error::{Error, InferenceError, Result};
pub use inference::{Inference, Mode, Reduction};
pub use orchestrator::{ForwardOptions, ForwardOptionsBuilder, Orchestrator};
pub use query::Query;
pub use response::{Embedding, Response};
