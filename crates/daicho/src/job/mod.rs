//! Asynchronous job lifecycle: submission, tracking, events.

pub mod events;
pub mod manager;
pub mod store;
pub mod task;

pub use events::{JobEventBroadcaster, JobProgressEvent};
pub use manager::{JobManager, ManagerSettings};
pub use store::{JobCounts, JobFailure, JobRecord, JobStatusReport, JobStore};
pub use task::{ChunkTask, FailureKind, JobStage, TaskStatus};
