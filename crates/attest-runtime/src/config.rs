//! Runtime configuration.
//!
//! Every knob has a typed default and an `ATTEST_*` environment override.
//! Durations accept humantime strings ("100ms", "30s").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::ProviderSettings;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// LLM backend selection
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Dispatch pool sizing and backpressure
    #[serde(default)]
    pub pool: PoolConfig,

    /// Evidence retrieval behavior
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Claim verification behavior
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Result broadcast and history
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl RuntimeConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            provider: ProviderSettings::from_env(),
            pool: PoolConfig::from_env(),
            retrieval: RetrievalConfig::from_env(),
            verification: VerificationConfig::from_env(),
            broadcast: BroadcastConfig::from_env(),
        }
    }
}

/// Dispatch pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of concurrent workers
    pub workers: usize,

    /// Bounded job queue capacity
    pub queue_size: usize,

    /// How long `submit` may block on a full queue before returning Busy
    #[serde(with = "duration_str")]
    pub submit_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 64,
            submit_timeout: Duration::from_millis(100),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            workers: env_usize("ATTEST_WORKER_COUNT", d.workers),
            queue_size: env_usize("ATTEST_QUEUE_SIZE", d.queue_size),
            submit_timeout: env_duration("ATTEST_SUBMIT_TIMEOUT", d.submit_timeout),
        }
    }
}

/// Evidence retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages to keep per claim
    pub top_k: usize,

    /// Minimum relevance for a passage to count as evidence
    pub score_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.3,
        }
    }
}

impl RetrievalConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            top_k: env_usize("ATTEST_TOP_K", d.top_k),
            score_threshold: env_f64("ATTEST_SCORE_THRESHOLD", d.score_threshold),
        }
    }
}

/// Claim verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Per-job fan-out limit for concurrent claim retrieval/verification
    pub claim_concurrency: usize,

    /// Unknown results at or above this count mark the record degraded...
    pub degraded_min_unknown: usize,

    /// ...but only when the claim count is below this
    pub degraded_max_claims: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            claim_concurrency: 4,
            degraded_min_unknown: 3,
            degraded_max_claims: 5,
        }
    }
}

impl VerificationConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            claim_concurrency: env_usize("ATTEST_CLAIM_CONCURRENCY", d.claim_concurrency),
            degraded_min_unknown: env_usize("ATTEST_DEGRADED_MIN_UNKNOWN", d.degraded_min_unknown),
            degraded_max_claims: env_usize("ATTEST_DEGRADED_MAX_CLAIMS", d.degraded_max_claims),
        }
    }
}

/// Broadcast and retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Completed records kept for newly-joining subscribers
    pub history_size: usize,

    /// Capacity of each subscriber's live channel
    pub channel_capacity: usize,

    /// Interval between metric snapshots
    #[serde(with = "duration_str")]
    pub metrics_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            channel_capacity: 256,
            metrics_interval: Duration::from_secs(10),
        }
    }
}

impl BroadcastConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            history_size: env_usize("ATTEST_HISTORY_SIZE", d.history_size),
            channel_capacity: d.channel_capacity,
            metrics_interval: env_duration("ATTEST_METRICS_INTERVAL", d.metrics_interval),
        }
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| humantime::parse_duration(&v).ok())
        .unwrap_or(default)
}

pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
