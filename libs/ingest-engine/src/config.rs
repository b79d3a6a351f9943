use std::time::Duration;

use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::EngineError;

// ═══════════════════════════════════════════════════════════════
//  Buffer Config
// ═══════════════════════════════════════════════════════════════

/// Настройки accumulation буфера.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Records per batch: reaching it triggers a flush inside `add`.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Periodic flush of a partially filled buffer. 0 = disabled.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Bound of the buffer → dispatcher channel. A full channel makes
    /// producers wait (back-pressure).
    #[serde(default = "default_max_pending_batches")]
    pub max_pending_batches: usize,
}

fn default_capacity() -> usize {
    500
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_max_pending_batches() -> usize {
    4
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            flush_interval_ms: default_flush_interval_ms(),
            max_pending_batches: default_max_pending_batches(),
        }
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Option<Duration> {
        (self.flush_interval_ms > 0).then(|| Duration::from_millis(self.flush_interval_ms))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Retry Config
// ═══════════════════════════════════════════════════════════════

/// Настройки retry/backoff для transport ошибок.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout, counted as a transport error. 0 = disabled.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_send_timeout_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_retries,
        )
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Engine Config
// ═══════════════════════════════════════════════════════════════

/// `[buffer]` + `[retry]` sections of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let cfg: Self = toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.buffer.capacity == 0 {
            return Err(EngineError::Config("buffer.capacity must be at least 1".into()));
        }
        if self.buffer.max_pending_batches == 0 {
            return Err(EngineError::Config("buffer.max_pending_batches must be at least 1".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(EngineError::Config(format!(
                "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        Ok(())
    }
}
