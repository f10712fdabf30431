//! JSON extraction from rendered page content.
//!
//! The upstream endpoint serves raw JSON to browsers, which Chromium wraps
//! in viewer markup when rendered. The payload is assumed to be exactly one
//! top-level JSON object embedded in the page text, so the first `{` and
//! the last `}` bound it. One parse attempt only — a page without a valid
//! blob is a permanent failure for that fetch, never retried.

use crate::error::ScrapeError;
use serde_json::Value;

/// Locate and parse the JSON object embedded in `html`.
pub fn embedded_json(html: &str) -> Result<Value, ScrapeError> {
    let start = html
        .find('{')
        .ok_or_else(|| ScrapeError::Extraction("no JSON object found in page content".into()))?;
    let end = html
        .rfind('}')
        .ok_or_else(|| ScrapeError::Extraction("no JSON object found in page content".into()))?;

    if end < start {
        return Err(ScrapeError::Extraction(
            "no JSON object found in page content".into(),
        ));
    }

    serde_json::from_str(&html[start..=end])
        .map_err(|e| ScrapeError::Extraction(format!("invalid JSON in page content: {e}")))
}
