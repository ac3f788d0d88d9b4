//! REST client for the external OCR provider.
//!
//! One POST per chunk: pages go out base64-encoded, rows come back as JSON.
//! Row elements are decoded individually so one garbled element degrades the
//! chunk instead of failing it.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::document::DocType;
use crate::provider::{AnalyzeRequest, ChunkPayload, OcrProvider, ProviderError, RawRow};

/// Default connect timeout for provider calls (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length for logged provider error bodies.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates a provider error body for logging while keeping useful context.
fn truncate_error_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    doc_type: DocType,
    page_start: usize,
    page_end: usize,
    /// Base64-encoded page buffers, in page order.
    pages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    rows: Vec<serde_json::Value>,
}

/// Blocking OCR client over HTTP.
///
/// Worker threads call [`OcrProvider::analyze`] directly; each call drives
/// its own future on a shared runtime, so concurrent calls proceed in
/// parallel up to the pool size.
pub struct RestOcrProvider {
    client: Client,
    runtime: tokio::runtime::Runtime,
    endpoint: String,
    api_key: Option<String>,
    call_timeout: Duration,
}

impl RestOcrProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        call_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(call_timeout)
            .build()
            .map_err(|e| {
                ProviderError::Transport(format!("Failed to create HTTP client: {}", e))
            })?;

        // Callers block on their own futures, so one IO driver thread serves
        // the whole worker pool.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("daicho-provider-io")
            .enable_all()
            .build()
            .map_err(|e| {
                ProviderError::Transport(format!("Failed to start IO runtime: {}", e))
            })?;

        Ok(Self {
            client,
            runtime,
            endpoint: endpoint.into(),
            api_key,
            call_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        Self::new(
            config.provider.endpoint.clone(),
            config.provider.api_key.clone(),
            Duration::from_secs(config.workers.call_timeout_secs),
        )
    }

    async fn analyze_inner(&self, body: &AnalyzeBody) -> Result<ChunkPayload, ProviderError> {
        debug!(
            "Posting pages {}..={} to {}",
            body.page_start, body.page_end, self.endpoint
        );

        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_request_error(e))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers());
            warn!("Provider rate limited the call, retry after {:?}", retry_after);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!(
                "{}: {}",
                status,
                truncate_error_body(&text)
            )));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!(
                "{}: {}",
                status,
                truncate_error_body(&text)
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_request_error(e))?;
        decode_rows(&text)
    }

    fn map_request_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.call_timeout)
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl OcrProvider for RestOcrProvider {
    fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<ChunkPayload, ProviderError> {
        let body = AnalyzeBody {
            doc_type: request.doc_type,
            page_start: request.page_start,
            page_end: request.page_end,
            pages: request.pages.iter().map(|p| BASE64.encode(p)).collect(),
        };

        self.runtime.block_on(self.analyze_inner(&body))
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Decodes a 200 response body into rows, salvaging what it can.
///
/// A body that is not a row listing at all fails the chunk. Individual bad
/// elements are dropped and mark the payload degraded, unless every element
/// is bad, which again fails the chunk.
fn decode_rows(body: &str) -> Result<ChunkPayload, ProviderError> {
    let response: AnalyzeResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::Malformed(format!("Response body is not a row listing: {}", e))
    })?;

    let total = response.rows.len();
    let mut rows = Vec::with_capacity(total);
    for value in response.rows {
        match serde_json::from_value::<RawRow>(value) {
            Ok(row) => rows.push(row),
            Err(e) => debug!("Dropping undecodable row element: {}", e),
        }
    }

    if rows.is_empty() && total > 0 {
        return Err(ProviderError::Malformed(format!(
            "None of the {} row elements were decodable",
            total
        )));
    }

    let degraded = rows.len() < total;
    if degraded {
        warn!(
            "Salvaged {} of {} row elements, chunk marked degraded",
            rows.len(),
            total
        );
    }

    Ok(ChunkPayload { rows, degraded })
}
