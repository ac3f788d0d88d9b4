//! Shared test support: a scripted OCR provider, document builders and
//! polling helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use daicho::job::{JobManager, JobStatusReport, ManagerSettings};
use daicho::provider::{AnalyzeRequest, ChunkPayload, OcrProvider, ProviderError, RawRow};
use daicho::worker::RetryPolicy;
use daicho::{DocType, SourceDocument};

/// One scripted response.
pub enum Scripted {
    Rows(Vec<RawRow>),
    /// Rows with the payload's degraded marker set.
    Degraded(Vec<RawRow>),
    RateLimited,
    Timeout,
    Rejected,
}

pub struct ScriptedCall {
    pub delay: Duration,
    pub response: Scripted,
}

impl ScriptedCall {
    pub fn rows(rows: Vec<RawRow>) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Scripted::Rows(rows),
        }
    }

    pub fn degraded(rows: Vec<RawRow>) -> Self {
        Self {
            delay: Duration::ZERO,
            response: Scripted::Degraded(rows),
        }
    }

    pub fn rate_limited() -> Self {
        Self {
            delay: Duration::ZERO,
            response: Scripted::RateLimited,
        }
    }

    pub fn rejected() -> Self {
        Self {
            delay: Duration::ZERO,
            response: Scripted::Rejected,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Scripted provider. Responses are keyed by the chunk's first page; each
/// call consumes the next scripted response for that page. With one page
/// per chunk, chunk N maps to page N + 1.
pub struct MockProvider {
    scripts: Mutex<HashMap<usize, Vec<ScriptedCall>>>,
    /// Page starts in the order calls arrived, for attempt assertions.
    pub calls: Mutex<Vec<usize>>,
}

impl MockProvider {
    pub fn new() -> Self {
        init_logging();
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_page(self, page_start: usize, calls: Vec<ScriptedCall>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(page_start)
            .or_default()
            .extend(calls);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl OcrProvider for MockProvider {
    fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<ChunkPayload, ProviderError> {
        self.calls.lock().unwrap().push(request.page_start);
        let call = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&request.page_start) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => {
                    return Err(ProviderError::Rejected(format!(
                        "no script for page {}",
                        request.page_start
                    )))
                }
            }
        };
        if !call.delay.is_zero() {
            std::thread::sleep(call.delay);
        }
        match call.response {
            Scripted::Rows(rows) => Ok(ChunkPayload {
                rows,
                degraded: false,
            }),
            Scripted::Degraded(rows) => Ok(ChunkPayload {
                rows,
                degraded: true,
            }),
            Scripted::RateLimited => Err(ProviderError::RateLimited { retry_after: None }),
            Scripted::Timeout => Err(ProviderError::Timeout(Duration::from_millis(10))),
            Scripted::Rejected => Err(ProviderError::Rejected("scripted rejection".to_string())),
        }
    }
}

pub fn row(date: &str, desc: &str, withdrawal: &str, deposit: &str, balance: &str) -> RawRow {
    RawRow {
        date_text: date.to_string(),
        description: desc.to_string(),
        withdrawal_text: withdrawal.to_string(),
        deposit_text: deposit.to_string(),
        balance_text: if balance.is_empty() {
            None
        } else {
            Some(balance.to_string())
        },
        low_confidence: false,
    }
}

/// A passbook document with one page per entry of `sizes`.
pub fn document(sizes: &[usize]) -> SourceDocument {
    SourceDocument::from_pages(
        DocType::Passbook,
        sizes.iter().map(|&size| vec![0u8; size]).collect(),
    )
}

/// Settings tuned for fast tests: one page per chunk, short backoff.
pub fn test_settings() -> ManagerSettings {
    ManagerSettings {
        max_chunk_bytes: 10_000,
        max_pages_per_chunk: 1,
        worker_count: 4,
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        },
        job_budget: Duration::from_secs(5),
        retention: Duration::from_secs(60),
        balance_tolerance: 0,
    }
}

/// Polls until the job reaches a terminal stage.
pub fn wait_for_terminal(manager: &JobManager, id: Uuid, timeout: Duration) -> JobStatusReport {
    let deadline = Instant::now() + timeout;
    loop {
        let report = manager.status(id).expect("job exists");
        if report.stage.is_terminal() {
            return report;
        }
        if Instant::now() > deadline {
            panic!("job never reached a terminal stage: {report:?}");
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
