//! daicho reconstructs transaction ledgers from scanned Japanese bank
//! documents.
//!
//! A submitted passbook or statement scan is split into page-bounded
//! chunks, each analyzed concurrently by an external OCR provider. The
//! recognized rows are then merged back into document order and
//! reconciled: Japanese era dates are resolved to the Gregorian calendar,
//! and transaction directions are verified, and where necessary corrected,
//! against the running balance printed on each row.
//!
//! The entry point is [`JobManager`]: build a [`SourceDocument`], submit
//! it, follow progress through polling or the event stream, and fetch the
//! finalized [`LedgerResult`](pipeline::LedgerResult) when the job
//! completes.

pub mod config;
pub mod dates;
pub mod document;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod plan;
pub mod provider;
pub mod reconcile;
pub mod sanitize;
pub mod statement;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config};
pub use document::{DocType, SourceDocument};
pub use error::{
    ConfigError, DaichoError, DocumentError, JobError, PlanError, Result, WorkerError,
};
pub use job::{JobManager, JobProgressEvent, JobStage, JobStatusReport, ManagerSettings};
pub use pipeline::{LedgerPipeline, LedgerResult};
pub use provider::{OcrProvider, ProviderError, RestOcrProvider};
pub use reconcile::LedgerSummary;
pub use statement::{RawTransactionRow, SourceRef, Transaction, Verification};
