//! Canonicalize raw reference strings into fetchable absolute URLs.
//!
//! Rules, applied in order:
//! 1. bare DOI (`10.xxxx/...`) or `doi:` prefix → `https://doi.org/<doi>`
//! 2. no URI scheme → prepend `http://`
//! 3. anything else passes through unchanged
//!
//! Normalization is idempotent: every rule's output is left alone by rule 3.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());
static DOI_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^doi:\s*").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("empty reference string")]
    Empty,
}

/// Normalize one raw reference string.
///
/// # Errors
///
/// Fails only when `raw` is empty or all whitespace.
pub fn normalize(raw: &str) -> Result<String, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    if let Some(m) = DOI_PREFIX.find(trimmed) {
        let doi = trimmed[m.end()..].trim();
        if doi.is_empty() {
            return Err(NormalizeError::Empty);
        }
        return Ok(format!("https://doi.org/{doi}"));
    }
    if trimmed.starts_with("10.") {
        return Ok(format!("https://doi.org/{trimmed}"));
    }
    if !SCHEME.is_match(trimmed) {
        return Ok(format!("http://{trimmed}"));
    }
    Ok(trimmed.to_string())
}
