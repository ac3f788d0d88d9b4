//! Push stream of job lifecycle events.
//!
//! A broadcast channel fans job progress out to any number of subscribers;
//! slow subscribers lag and drop old events rather than backpressure the
//! collector.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::store::JobStatusReport;
use crate::job::task::JobStage;

const CHANNEL_CAPACITY: usize = 100;

/// One stage transition or chunk tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: Uuid,
    pub stage: JobStage,
    /// 0 to 100.
    pub percent: u8,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobProgressEvent {
    pub fn from_report(job_id: Uuid, report: &JobStatusReport) -> Self {
        Self {
            job_id,
            stage: report.stage,
            percent: report.percent,
            detail: report.detail.clone(),
            timestamp: Utc::now(),
            error: report.error.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// A send with no subscribers is not an error; events are advisory.
    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}
