use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStage;

#[derive(Error, Debug)]
pub enum DaichoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Chunk planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse PDF: {0}")]
    PdfParse(String),

    #[error("Failed to split page {page} out of the source PDF: {reason}")]
    PageSplit { page: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Document has no pages")]
    EmptyDocument,

    #[error("Page {page} is {size} bytes, above the {limit} byte chunk limit")]
    PageTooLarge {
        page: usize,
        size: usize,
        limit: usize,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Worker pool is shut down")]
    PoolShutdown,
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Unknown job '{0}'")]
    UnknownJob(Uuid),

    #[error("Job '{id}' has no result yet (stage: {stage})")]
    NotCompleted { id: Uuid, stage: JobStage },
}

pub type Result<T> = std::result::Result<T, DaichoError>;
