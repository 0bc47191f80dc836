//! Command-line interface definitions.
//!
//! Every tuning flag is optional: when absent, the value from the YAML
//! configuration file (or the built-in default) is used. See
//! [`crate::config::AcquisitionConfig::apply_cli`].

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which references a batch processes, relative to the failure ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum RetryMode {
    /// Only the ledger's references when the ledger is non-empty, otherwise all.
    #[default]
    Auto,
    /// Every reference in the input.
    All,
    /// Only references recorded in the failure ledger.
    FailedOnly,
    /// Ledger references first, then the rest.
    FailedFirst,
}

/// Acquire the full text of every reference in a bibliography.
///
/// # Examples
///
/// ```sh
/// # Process references.json into ./scraped
/// paper_harvest -r data/paper/references.json -o data/paper
///
/// # A couple of ad hoc URLs, HTTP only
/// paper_harvest -u 10.1136/bmj.p2739 -u https://example.org/paper --no-browser
///
/// # Slow, human-paced run over last run's failures
/// paper_harvest -r references.json -o out --stealth --mode failed-only
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// JSON file mapping reference ids to `{ "links": [...] }`
    #[arg(short, long, required_unless_present = "url")]
    pub references: Option<PathBuf>,

    /// URL or DOI to acquire; may be repeated instead of --references
    #[arg(short, long)]
    pub url: Vec<String>,

    /// Directory for extracted text, the success index and the failure ledger
    #[arg(short, long, default_value = "scraped_content")]
    pub output_dir: PathBuf,

    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "PAPER_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Which references to process relative to the failure ledger
    #[arg(long, value_enum, default_value_t = RetryMode::Auto)]
    pub mode: RetryMode,

    /// How many references are in flight at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Timeout in seconds for the first attempt of each strategy
    #[arg(long, value_parser = parse_seconds)]
    pub initial_timeout: Option<f64>,

    /// Minimum words for extracted text to be accepted
    #[arg(long)]
    pub min_words: Option<usize>,

    /// Attempts per strategy before escalating
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// One reference at a time with long randomized pauses between them
    #[arg(long)]
    pub stealth: bool,

    /// Plain HTTP only; never launch a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Skip the headful browser strategy
    #[arg(long)]
    pub no_headful: bool,

    /// Do not look for PDF links when a page comes up short
    #[arg(long)]
    pub no_pdf_discovery: bool,

    /// Path to a Chrome/Chromium executable
    #[arg(long, env = "PAPER_HARVEST_CHROME")]
    pub chrome: Option<PathBuf>,

    /// Write manual-entry stubs for every reference in the failure ledger and exit
    #[arg(long)]
    pub manual_entry: bool,
}

/// Positive, finite seconds.
fn parse_seconds(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(format!("expected a positive number of seconds, got {raw}"))
    }
}
