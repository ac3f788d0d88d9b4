//! In-memory representation of the scanned document a job works on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Kind of financial document being analyzed. Forwarded to the OCR provider
/// so it can pick the right layout model; has no effect on chunk planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Passbook,
    Statement,
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocType::Passbook => write!(f, "passbook"),
            DocType::Statement => write!(f, "statement"),
        }
    }
}

/// A scanned document held as one encoded buffer per page.
///
/// Page numbers are 1-based throughout, matching PDF page numbering.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    doc_type: DocType,
    pages: Vec<Vec<u8>>,
}

impl SourceDocument {
    /// Builds a document from pre-split page buffers, e.g. one scan image per page.
    pub fn from_pages(doc_type: DocType, pages: Vec<Vec<u8>>) -> Self {
        Self { doc_type, pages }
    }

    /// Splits a multi-page PDF into one single-page PDF buffer per page.
    ///
    /// The provider receives whole pages and never sees partial-page content,
    /// so splitting happens here rather than at dispatch time.
    pub fn from_pdf_bytes(doc_type: DocType, bytes: &[u8]) -> Result<Self, DocumentError> {
        let source = lopdf::Document::load_mem(bytes)
            .map_err(|e| DocumentError::PdfParse(e.to_string()))?;

        let page_numbers: Vec<u32> = source.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());

        for &keep in &page_numbers {
            let mut single = source.clone();
            let delete: Vec<u32> = page_numbers
                .iter()
                .copied()
                .filter(|&n| n != keep)
                .collect();
            if !delete.is_empty() {
                single.delete_pages(&delete);
            }
            single.prune_objects();
            single.renumber_objects();

            let mut buf = Vec::new();
            single
                .save_to(&mut buf)
                .map_err(|e| DocumentError::PageSplit {
                    page: keep as usize,
                    reason: e.to_string(),
                })?;
            pages.push(buf);
        }

        Ok(Self { doc_type, pages })
    }

    pub fn doc_type(&self) -> DocType {
        self.doc_type
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Encoded size of every page, in page order. Input to chunk planning.
    pub fn page_sizes(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.len()).collect()
    }

    /// Buffers for the 1-based inclusive page range `start..=end`.
    pub fn pages_in(&self, start: usize, end: usize) -> &[Vec<u8>] {
        assert!(
            start >= 1 && start <= end && end <= self.pages.len(),
            "page range {}..={} out of bounds for {} pages",
            start,
            end,
            self.pages.len()
        );
        &self.pages[start - 1..end]
    }
}
