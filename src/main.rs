//! # Paper Harvest
//!
//! Acquires the full text of every reference in a bibliography for a
//! literature review. Each reference carries one or more candidate links;
//! the engine escalates from a plain HTTP fetch to a headless browser to a
//! visible, stealth-patched browser until the extracted text clears a
//! minimum word count, and looks for the paper's PDF on landing pages when
//! it does not.
//!
//! ## Features
//!
//! - Bare DOIs and scheme-less links normalized to fetchable URLs
//! - HTML and PDF text extraction that never fails a batch
//! - Ordered escalation: direct → headless → headful, with per-strategy retries
//! - PDF discovery on landing and abstract pages
//! - A failure ledger so reruns only retry what is outstanding
//! - Stealth pacing for rate-limited publishers
//! - A printed PDF of the page kept alongside headful acquisitions
//! - Manual-entry stubs for references no strategy could fetch
//!
//! ## Usage
//!
//! ```sh
//! paper_harvest -r data/paper/references.json -o data/paper
//! paper_harvest -u 10.1136/bmj.p2739 --no-browser
//! paper_harvest -r data/paper/references.json -o data/paper --manual-entry
//! ```
//!
//! ## Architecture
//!
//! 1. **Selection**: load references and the failure ledger, choose what to run
//! 2. **Acquisition**: escalate each link, with PDF discovery as fallback
//!    (bounded concurrency, optional pacing)
//! 3. **Output**: write accepted text, the success index and the ledger

use clap::Parser;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod acquisition;
mod cli;
mod config;
mod ledger;
mod models;
mod orchestrator;
mod outputs;
mod utils;

use acquisition::backend::LiveBackend;
use acquisition::browser::BrowserRuntime;
use acquisition::direct::DirectFetcher;
use cli::{Cli, RetryMode};
use config::AcquisitionConfig;
use ledger::FailureLedger;
use orchestrator::{Orchestrator, load_references, references_from_urls, select_references};
use outputs::json::{SuccessEntry, SuccessIndex};
use outputs::{manual, text};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("paper_harvest starting up");

    let args = Cli::parse();
    debug!(
        references = ?args.references,
        urls = args.url.len(),
        output_dir = %args.output_dir.display(),
        mode = ?args.mode,
        "Parsed CLI arguments"
    );

    // ---- Configuration ----
    let config = match &args.config {
        Some(path) => AcquisitionConfig::load(path)?,
        None => AcquisitionConfig::default(),
    }
    .apply_cli(&args);
    debug!(?config, "Effective configuration");

    // Early check: ensure the output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Inputs ----
    let (references, mode) = match &args.references {
        Some(path) => (load_references(path).await?, args.mode),
        // Ad hoc URLs are never filtered by an unrelated ledger.
        None if args.mode == RetryMode::Auto => (references_from_urls(&args.url), RetryMode::All),
        None => (references_from_urls(&args.url), args.mode),
    };
    let mut ledger = FailureLedger::load(&args.output_dir).await?;

    if args.manual_entry {
        let written = manual::write_manual_entries(&args.output_dir, &ledger, &references).await?;
        info!(
            count = written.len(),
            dir = %args.output_dir.join(manual::MANUAL_ENTRY_DIR).display(),
            "Created manual entry files; paste the reference text under each separator"
        );
        return Ok(());
    }

    let selected = select_references(&references, &ledger, mode);
    if selected.is_empty() {
        info!(outstanding = ledger.len(), "Nothing to acquire");
        return Ok(());
    }
    let mut success_index = SuccessIndex::load(&args.output_dir).await?;

    // ---- Backend ----
    let direct = DirectFetcher::new(config.transport_retry)?;
    let browser = if config.browser.enabled {
        match BrowserRuntime::launch(&config.browser).await {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                error!(error = %e, "Browser runtime failed to start; aborting before any request");
                return Err(e);
            }
        }
    } else {
        info!("Browser strategies disabled; direct fetch only");
        None
    };
    let backend = LiveBackend::new(direct, browser, config.enabled_strategies());

    // ---- Acquisition ----
    let orchestrator = Orchestrator::new(backend, config);
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => warn!("Interrupt received; saving progress"),
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C; batch will run to completion");
                std::future::pending::<()>().await;
            }
        }
    };
    let report = orchestrator.run(selected, &mut ledger, shutdown).await;
    orchestrator.into_backend().close().await;

    // ---- Outputs ----
    for outcome in &report.outcomes {
        let Some(best) = outcome.best() else {
            success_index.remove(&outcome.id);
            continue;
        };
        match text::write_full_text(&args.output_dir, &outcome.id, best).await {
            Ok(_) => {
                let file = text::full_text_file_name(&outcome.id);
                let mut entry = SuccessEntry::new(file, best);
                match text::write_snapshot(&args.output_dir, &outcome.id, best).await {
                    Ok(Some(_)) => entry.snapshot = Some(text::snapshot_file_name(&outcome.id)),
                    Ok(None) => {}
                    Err(e) => warn!(id = %outcome.id, error = %e, "Failed to write page snapshot"),
                }
                success_index.record(&outcome.id, entry);
            }
            Err(e) => {
                error!(id = %outcome.id, error = %e, "Failed to write full text");
                success_index.remove(&outcome.id);
                ledger.record_failure(
                    &outcome.id,
                    &outcome.links,
                    format!("acquired but could not be written: {e}"),
                );
            }
        }
    }

    if let Err(e) = success_index.save().await {
        error!(error = %e, "Failed to write success index");
    }
    ledger.save().await?;

    info!(
        processed = report.outcomes.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        recovered = report.recovered,
        indexed = success_index.len(),
        outstanding = ledger.len(),
        interrupted = report.interrupted,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "paper_harvest finished"
    );
    if !ledger.is_empty() {
        info!(
            path = %ledger.path().display(),
            "Some references are outstanding; rerun to retry them or use --manual-entry"
        );
    }

    Ok(())
}
