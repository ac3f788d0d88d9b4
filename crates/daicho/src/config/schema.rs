//! Configuration structures deserialized from the JSON config file.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config format version; currently "1.0".
    pub version: String,
    /// OCR provider connection settings.
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub jobs: JobConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OCR endpoint.
    pub endpoint: String,
    /// Bearer token; omit for providers that authenticate elsewhere.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upper bound on the total page bytes packed into one chunk.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Upper bound on pages per chunk, regardless of byte size.
    #[serde(default = "default_max_pages_per_chunk")]
    pub max_pages_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            max_pages_per_chunk: default_max_pages_per_chunk(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// OCR worker threads; each drives one provider call at a time.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Per-call timeout handed to the HTTP client.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Retries after the first attempt for transient provider errors.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base backoff delay; doubled on each further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            call_timeout_secs: default_call_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Wall-clock budget for one job, submission to completion.
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// How long finished jobs stay queryable before eviction.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Allowed slack, in yen, when comparing running and reported balances.
    #[serde(default)]
    pub balance_tolerance: i64,
}

fn default_max_chunk_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_max_pages_per_chunk() -> usize {
    4
}

fn default_worker_count() -> usize {
    num_cpus::get().min(4)
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_budget_secs() -> u64 {
    600
}

fn default_retention_secs() -> u64 {
    3600
}
