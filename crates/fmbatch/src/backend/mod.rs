//! # Injected capabilities
//!
//! This module holds the interfaces the scheduler consumes from its collaborators,
//! allowing the batching logic to work in a payload- and device-agnostic manner.
//!
//! - [`PromptContent`] describes any prompt payload (text, token ids, tensors)
//! - [`Tokenizer`] turns prompts into token ids
//! - [`DeviceMemory`] reports free device memory and releases cached allocations
//!
//! ## Feature Flags
//!
//! - `candle`: implements [`PromptContent`] for candle tensors and converts tokenized
//!   batches into candle tensors
//! - `burn`: the same for burn tensors

mod core_trait;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle tensor support.
///
/// This module is only available when the `candle` feature flag is enabled.
pub mod candle;

#[cfg_attr(docsrs, doc(cfg(feature = "burn")))]
#[cfg(feature = "burn")]
/// Burn tensor support.
///
/// This module is only available when the `burn` feature flag is enabled.
/// Burn tensors carry their rank as a const generic, so implementations are
/// generated for ranks one through four.
pub mod burn;

// Re-export the core traits for convenient imports
pub use core_trait::*;
