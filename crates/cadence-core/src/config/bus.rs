//! Message bus configuration.

use serde::{Deserialize, Serialize};

/// Message bus (Redis Streams) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus provider: `"redis"` or `"memory"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis connection URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Stream (topic) that carries job messages.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Consumer group shared by every worker process.
    #[serde(default = "default_group")]
    pub group: String,
    /// Interval in milliseconds between reads when the stream is idle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Maximum entries fetched per read.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Unacknowledged entries idle longer than this are reclaimed and redelivered.
    #[serde(default = "default_claim_idle")]
    pub claim_idle_ms: u64,
    /// Interval in milliseconds between reclaim sweeps.
    #[serde(default = "default_reclaim_interval")]
    pub reclaim_interval_ms: u64,
    /// Approximate maximum stream length kept by `XADD`.
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            topic: default_topic(),
            group: default_group(),
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            claim_idle_ms: default_claim_idle(),
            reclaim_interval_ms: default_reclaim_interval(),
            max_len: default_max_len(),
        }
    }
}

fn default_provider() -> String {
    "redis".to_string()
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_topic() -> String {
    "jobs".to_string()
}

fn default_group() -> String {
    "audio-workers".to_string()
}

fn default_poll_interval() -> u64 {
    250
}

fn default_batch_size() -> usize {
    16
}

fn default_claim_idle() -> u64 {
    60_000
}

fn default_reclaim_interval() -> u64 {
    15_000
}

fn default_max_len() -> usize {
    100_000
}
