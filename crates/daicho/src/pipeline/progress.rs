//! Stage reporting seam between the pipeline and its caller.

use crate::job::JobStage;

/// Emitted as the pipeline moves between stages.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Stage { stage: JobStage, detail: String },
}

/// Receives pipeline progress. The job collector bridges these into the job
/// store and the broadcast stream.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Reporter that discards everything; for direct pipeline use in tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}
