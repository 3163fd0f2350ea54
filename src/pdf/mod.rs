
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{PaperError, Result};

const PAGE_BREAK: char = '\x0C';

/// Raw text extracted from one physical page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page_number: usize,
    pub text: String,
}

/// Extract per-page text from an in-memory PDF
#[inline]
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PaperError::Pdf(format!("Failed to extract PDF text: {}", e)))?;

    let pages = split_pages(&text);
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        warn!("PDF contains no extractable text");
    }

    debug!("Extracted {} pages from PDF", pages.len());
    Ok(pages)
}

/// Split extracted text on form feeds, keeping empty pages so that page
/// numbers stay aligned with the physical document.
#[inline]
pub fn split_pages(text: &str) -> Vec<PageText> {
    let body = text.strip_suffix(PAGE_BREAK).unwrap_or(text);

    body.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, page_text)| PageText {
            page_number: i + 1,
            text: page_text.to_string(),
        })
        .collect()
}
