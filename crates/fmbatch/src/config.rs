//! # Scheduler configuration
//!
//! Every tunable of the packing heuristic and the out-of-memory backoff lives in
//! [`SchedulerConfig`]. The memory constants were tuned empirically and depend on the
//! hardware and the backend, so they can be overridden from serialized config or from
//! `FMBATCH_*` environment variables.

use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::error::{Error, Result};
use crate::batch::PaddingSide;

/// Bytes of free device memory per unit of packing cost (`max_len² × instances`).
pub const DEFAULT_BYTES_PER_TOKEN_SQ: f64 = 65536.0;

/// Packing budget used when no device-memory signal is available.
pub const DEFAULT_LIMIT_SIZE: f64 = 65536.0;

/// Out-of-memory backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Multiplier applied to the dynamic budget and max batch size after a failure
    pub dynamic_shrink: f64,
    /// Multiplier applied to the static chunk size after a failure
    pub static_shrink: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            dynamic_shrink: 0.9,
            static_shrink: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Bytes of device memory per (token² × instance); converts free bytes to a budget
    pub bytes_per_token_sq: f64,
    /// Budget used when no device memory probe reports free bytes
    pub default_limit_size: f64,
    /// Truncation length for tokenized prompts, and the pad width of static batches
    pub max_token_length: usize,
    pub padding_side: PaddingSide,
    pub embedding_cache_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            bytes_per_token_sq: DEFAULT_BYTES_PER_TOKEN_SQ,
            default_limit_size: DEFAULT_LIMIT_SIZE,
            max_token_length: 512,
            padding_side: PaddingSide::Right,
            embedding_cache_capacity: 32,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config from `FMBATCH_*` environment variables layered over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Layer the values returned by `lookup` over the defaults.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String>
    {
        let mut config = Self::default();

        override_from(&lookup, "FMBATCH_BYTES_PER_TOKEN_SQ", &mut config.bytes_per_token_sq);
        override_from(&lookup, "FMBATCH_DEFAULT_LIMIT_SIZE", &mut config.default_limit_size);
        override_from(&lookup, "FMBATCH_MAX_TOKEN_LENGTH", &mut config.max_token_length);
        override_from(&lookup, "FMBATCH_PADDING_SIDE", &mut config.padding_side);
        override_from(&lookup, "FMBATCH_EMBEDDING_CACHE_CAPACITY", &mut config.embedding_cache_capacity);
        override_from(&lookup, "FMBATCH_MAX_ATTEMPTS", &mut config.retry.max_attempts);
        override_from(&lookup, "FMBATCH_DYNAMIC_SHRINK", &mut config.retry.dynamic_shrink);
        override_from(&lookup, "FMBATCH_STATIC_SHRINK", &mut config.retry.static_shrink);

        config
    }

    /// Reject settings that would stall or corrupt a run.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("bytes_per_token_sq", self.bytes_per_token_sq),
            ("default_limit_size", self.default_limit_size),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        for (name, value) in [("dynamic_shrink", self.retry.dynamic_shrink), ("static_shrink", self.retry.static_shrink)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(invalid(format!("{name} must lie in (0, 1), got {value}")));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1".to_string()));
        }
        if self.max_token_length == 0 {
            return Err(invalid("max_token_length must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Convert a free-memory reading into a packing budget.
    pub fn limit_size_for(&self, free_bytes: Option<u64>) -> f64 {
        match free_bytes {
            Some(bytes) => bytes as f64 / self.bytes_per_token_sq,
            None => self.default_limit_size,
        }
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidConfig { message }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparsable config override"),
        }
    }
}
