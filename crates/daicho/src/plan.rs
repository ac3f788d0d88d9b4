//! Greedy partitioning of document pages into provider-sized chunks.

use crate::error::PlanError;

/// A contiguous run of pages scheduled as one OCR provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChunk {
    pub index: usize,
    /// 1-based inclusive page range.
    pub page_start: usize,
    pub page_end: usize,
    /// Total encoded size of the pages in this chunk.
    pub byte_size: usize,
}

impl PlannedChunk {
    pub fn page_count(&self) -> usize {
        self.page_end - self.page_start + 1
    }
}

/// Partitions `page_sizes` (encoded bytes per page, in page order) into chunks.
///
/// Pages accumulate greedily: a chunk closes when adding the next page would
/// exceed `max_chunk_bytes` or `max_pages_per_chunk`. Every page lands in
/// exactly one chunk, page order is preserved, and pages are never split.
///
/// A single page larger than `max_chunk_bytes` can never be dispatched and
/// fails planning outright.
pub fn plan_chunks(
    page_sizes: &[usize],
    max_chunk_bytes: usize,
    max_pages_per_chunk: usize,
) -> Result<Vec<PlannedChunk>, PlanError> {
    assert!(max_chunk_bytes > 0, "max_chunk_bytes must be > 0");
    assert!(max_pages_per_chunk > 0, "max_pages_per_chunk must be > 0");

    if page_sizes.is_empty() {
        return Err(PlanError::EmptyDocument);
    }

    let mut chunks: Vec<PlannedChunk> = Vec::new();
    let mut start = 0usize;
    let mut bytes = 0usize;
    let mut pages = 0usize;

    for (i, &size) in page_sizes.iter().enumerate() {
        if size > max_chunk_bytes {
            return Err(PlanError::PageTooLarge {
                page: i + 1,
                size,
                limit: max_chunk_bytes,
            });
        }

        if pages > 0 && (bytes + size > max_chunk_bytes || pages == max_pages_per_chunk) {
            chunks.push(PlannedChunk {
                index: chunks.len(),
                page_start: start + 1,
                page_end: i,
                byte_size: bytes,
            });
            start = i;
            bytes = 0;
            pages = 0;
        }

        bytes += size;
        pages += 1;
    }

    chunks.push(PlannedChunk {
        index: chunks.len(),
        page_start: start + 1,
        page_end: page_sizes.len(),
        byte_size: bytes,
    });

    Ok(chunks)
}
