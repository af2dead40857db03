//! Configuration types for the drain loop and the benchmark harness.
//!
//! Everything here deserializes with `serde`. Defaults: batches of 10,000
//! records, progress every 10 batches, no imposed read timeout, and
//! 1,000,000 records per run.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Records generated per run when no count is given.
pub const DEFAULT_RECORD_COUNT: u64 = 1_000_000;

/// Maximum records requested per read.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Progress is reported every this many batches' worth of records.
pub const DEFAULT_REPORT_EVERY_BATCHES: u64 = 10;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_record_count() -> u64 {
    DEFAULT_RECORD_COUNT
}

fn default_warmup_records() -> u64 {
    1
}

/// What the drain loop does when reads keep coming back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdlePolicy {
    /// Keep reading until the target is reached.
    #[default]
    KeepWaiting,
    /// Finish successfully after this many consecutive empty reads.
    CompleteAfter(u32),
}

/// Where a source starts when opened without a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartFrom {
    /// Oldest retained record.
    #[default]
    Earliest,
    /// Only records that arrive after the open.
    Latest,
}

impl StartFrom {
    /// Parse from a string (case-insensitive).
    pub fn from_str_config(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "earliest" => Ok(StartFrom::Earliest),
            "latest" => Ok(StartFrom::Latest),
            other => Err(StreamError::Configuration(format!(
                "invalid start.from '{}': must be 'earliest' or 'latest'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StartFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartFrom::Earliest => write!(f, "earliest"),
            StartFrom::Latest => write!(f, "latest"),
        }
    }
}

/// Settings for one run of the batch drain loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Upper bound on records requested per read.
    #[serde(default = "default_batch_size")]
    pub max_batch_size: usize,

    /// Timeout imposed on every read; expiry cancels the read and yields an
    /// empty batch. Only for sources that block forever when idle, and it
    /// must exceed the slowest productive read. `None` relies on the
    /// source's own idle return.
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,

    #[serde(default)]
    pub idle_policy: IdlePolicy,
}

impl DrainConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(StreamError::Configuration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(StreamError::Configuration(
                "idle_timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.idle_policy == IdlePolicy::CompleteAfter(0) {
            return Err(StreamError::Configuration(
                "idle_policy complete_after must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_BATCH_SIZE,
            idle_timeout_ms: None,
            idle_policy: IdlePolicy::KeepWaiting,
        }
    }
}

/// Settings for a full benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Records to generate and then drain.
    #[serde(default = "default_record_count")]
    pub record_count: u64,

    /// Records generated before the bootstrap read. 0 disables the warm-up.
    #[serde(default = "default_warmup_records")]
    pub warmup_records: u64,

    /// Progress interval in records. Defaults to 10 batches' worth.
    #[serde(default)]
    pub report_interval: Option<u64>,

    #[serde(default)]
    pub drain: DrainConfig,
}

impl HarnessConfig {
    pub fn new(record_count: u64) -> Self {
        Self {
            record_count,
            ..Self::default()
        }
    }

    pub fn report_interval(&self) -> u64 {
        self.report_interval.unwrap_or_else(|| {
            DEFAULT_REPORT_EVERY_BATCHES.saturating_mul(self.drain.max_batch_size as u64)
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.drain.validate()
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            record_count: DEFAULT_RECORD_COUNT,
            warmup_records: default_warmup_records(),
            report_interval: None,
            drain: DrainConfig::default(),
        }
    }
}

/// Parse the record-count argument.
///
/// Absent means [`DEFAULT_RECORD_COUNT`]; anything that is not a
/// non-negative integer is a configuration error.
pub fn parse_record_count(arg: Option<&str>) -> Result<u64> {
    match arg {
        None => Ok(DEFAULT_RECORD_COUNT),
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            StreamError::Configuration(format!("invalid record count '{}': {}", raw, e))
        }),
    }
}

/// Look up a required, non-blank key in a connector-style settings map.
pub fn required_setting(settings: &HashMap<String, String>, key: &str) -> Result<String> {
    let value = settings
        .get(key)
        .ok_or_else(|| StreamError::Configuration(format!("missing required '{}'", key)))?;

    if value.trim().is_empty() {
        return Err(StreamError::Configuration(format!(
            "'{}' must not be empty",
            key
        )));
    }
    Ok(value.clone())
}

/// Parse an optional numeric key, falling back to `default`.
pub fn numeric_setting<T>(settings: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    settings
        .get(key)
        .map(|s| {
            s.trim().parse::<T>().map_err(|e| {
                StreamError::Configuration(format!("invalid {}: {}", key, e))
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}
