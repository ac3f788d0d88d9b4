//! Per-chunk bookkeeping and job lifecycle enums.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plan::PlannedChunk;
use crate::provider::ChunkPayload;

/// Lifecycle of one dispatched chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One chunk of a job, from plan to payload.
#[derive(Debug, Clone)]
pub struct ChunkTask {
    pub index: usize,
    /// 1-based inclusive page range.
    pub page_start: usize,
    pub page_end: usize,
    pub byte_size: usize,
    pub status: TaskStatus,
    /// Provider calls made for this chunk so far.
    pub attempts: u32,
    /// Raw payload, held until the merge step takes it.
    pub payload: Option<ChunkPayload>,
}

impl ChunkTask {
    pub fn from_plan(chunk: &PlannedChunk) -> Self {
        Self {
            index: chunk.index,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            byte_size: chunk.byte_size,
            status: TaskStatus::Pending,
            attempts: 0,
            payload: None,
        }
    }
}

/// Where a job is in its lifecycle. `completed`, `failed` and `cancelled`
/// are terminal; a terminal job never changes stage again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Dispatching,
    Merging,
    Correcting,
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStage::Completed | JobStage::Failed | JobStage::Cancelled
        )
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Queued => "queued",
            JobStage::Dispatching => "dispatching",
            JobStage::Merging => "merging",
            JobStage::Correcting => "correcting",
            JobStage::Exporting => "exporting",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
            JobStage::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Failure category, at the granularity a caller decides to retry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider permanently rejected a chunk or retries were exhausted.
    Provider,
    /// The job's wall-clock budget ran out.
    Budget,
    /// Dispatch or internal plumbing failed.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Provider => "provider",
            FailureKind::Budget => "budget",
            FailureKind::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_three_final_stages_are_terminal() {
        assert!(JobStage::Completed.is_terminal());
        assert!(JobStage::Failed.is_terminal());
        assert!(JobStage::Cancelled.is_terminal());
        for stage in [
            JobStage::Queued,
            JobStage::Dispatching,
            JobStage::Merging,
            JobStage::Correcting,
            JobStage::Exporting,
        ] {
            assert!(!stage.is_terminal(), "{stage}");
        }
    }

    #[test]
    fn stages_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(JobStage::Dispatching).unwrap(),
            "dispatching"
        );
        assert_eq!(serde_json::to_value(FailureKind::Budget).unwrap(), "budget");
    }

    #[test]
    fn task_starts_pending_with_the_planned_range() {
        let task = ChunkTask::from_plan(&PlannedChunk {
            index: 2,
            page_start: 5,
            page_end: 6,
            byte_size: 1024,
        });
        assert_eq!(task.index, 2);
        assert_eq!(task.page_start, 5);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
        assert!(task.payload.is_none());
    }
}
