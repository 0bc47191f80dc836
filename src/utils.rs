//! Small helpers shared by the acquisition engine and the output writers.
//!
//! - Word counting, the single canonical acceptance measure
//! - Filename sanitising for reference identifiers and URLs
//! - Log-friendly truncation
//! - File system validation for the output directory

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static URL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://(www\.)?").unwrap());
static NOT_FILENAME_SAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-.]").unwrap());
static RESERVED_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

const MAX_FILENAME_STEM: usize = 200;

/// Count whitespace-separated words.
///
/// Every acceptance decision in the crate goes through this function, so a
/// document "has 700 words" exactly when `word_count(text) >= 700`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Turn a URL into a flat filename stem.
///
/// The scheme and a leading `www.` are dropped and everything outside
/// `[A-Za-z0-9_.-]` becomes `_`.
pub fn sanitize_url_for_filename(url: &str) -> String {
    let stripped = URL_PREFIX.replace(url, "");
    let flat = NOT_FILENAME_SAFE.replace_all(&stripped, "_");
    flat.chars().take(MAX_FILENAME_STEM).collect()
}

/// Make a reference identifier safe to use as a filename on every platform.
pub fn clean_reference_name(name: &str) -> String {
    let cleaned = RESERVED_FILENAME_CHARS.replace_all(name.trim(), "_");
    cleaned.chars().take(MAX_FILENAME_STEM).collect()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a scratch file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let scratch_path = path.join("..__write_check__");
    match stdfs::File::create(&scratch_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
