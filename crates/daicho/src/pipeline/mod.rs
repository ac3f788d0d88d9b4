//! Post-OCR reconciliation pipeline.

pub mod context;
pub mod progress;
pub mod runner;

pub use context::LedgerContext;
pub use progress::{NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{LedgerPipeline, LedgerResult};
