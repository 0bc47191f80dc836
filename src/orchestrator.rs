//! Acquisition Orchestrator.
//!
//! Drives a batch of references through the engine:
//!
//! 1. **Selection**: pick which references to process from the input and
//!    the failure ledger, per [`RetryMode`]
//! 2. **Dispatch**: at most `max_concurrent_requests` references in flight,
//!    with an optional randomized pause before each dispatch
//! 3. **Acquisition**: each link of a reference is normalized and escalated
//!    in turn, falling back to PDF discovery when escalation is exhausted
//! 4. **Bookkeeping**: as each reference completes, the in-memory ledger is
//!    updated; the caller persists it at batch end
//!
//! All references run cooperatively on the calling task; nothing here is
//! spawned, so the backend and the ledger need not be `Send`.

use crate::acquisition::discovery::discover;
use crate::acquisition::escalation::{Escalation, EscalationController};
use crate::acquisition::normalize::normalize;
use crate::acquisition::strategy::FetchBackend;
use crate::cli::RetryMode;
use crate::config::{AcquisitionConfig, PdfDiscoveryConfig};
use crate::ledger::FailureLedger;
use crate::models::{
    AcquiredDocument, AcquiredVia, AcquisitionOutcome, AcquisitionRequest, OutcomeStatus,
    ReferenceOutcome, ReferenceRecord,
};
use crate::utils::{sanitize_url_for_filename, truncate_for_log};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::error::Error;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Load `references.json`: reference id → `{ "links": [...], "title"?: ... }`.
///
/// Blank links are dropped and references left with no links are skipped
/// with a warning.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_references(
    path: &Path,
) -> Result<BTreeMap<String, ReferenceRecord>, Box<dyn Error>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let parsed: BTreeMap<String, ReferenceRecord> = serde_json::from_str(&raw)?;

    let references: BTreeMap<String, ReferenceRecord> = parsed
        .into_iter()
        .filter_map(|(id, mut record)| {
            record.links.retain(|link| !link.trim().is_empty());
            if record.links.is_empty() {
                warn!(%id, "Reference has no links; skipping");
                None
            } else {
                Some((id, record))
            }
        })
        .collect();

    info!(count = references.len(), "Loaded references");
    Ok(references)
}

/// One reference per ad hoc URL, keyed by a filename-safe form of the URL.
pub fn references_from_urls(urls: &[String]) -> BTreeMap<String, ReferenceRecord> {
    urls.iter()
        .filter(|url| !url.trim().is_empty())
        .map(|url| {
            (
                sanitize_url_for_filename(url.trim()),
                ReferenceRecord {
                    links: vec![url.trim().to_string()],
                    title: None,
                },
            )
        })
        .collect()
}

/// The references a batch processes, in dispatch order.
pub fn select_references(
    references: &BTreeMap<String, ReferenceRecord>,
    ledger: &FailureLedger,
    mode: RetryMode,
) -> Vec<(String, ReferenceRecord)> {
    let (failed, rest): (Vec<_>, Vec<_>) = references
        .iter()
        .map(|(id, record)| (id.clone(), record.clone()))
        .partition(|(id, _)| ledger.contains(id));

    let selected = match mode {
        RetryMode::All => references
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect(),
        RetryMode::FailedOnly => failed,
        RetryMode::FailedFirst => failed.into_iter().chain(rest).collect(),
        RetryMode::Auto if ledger.is_empty() => rest,
        RetryMode::Auto => failed,
    };

    info!(
        ?mode,
        selected = selected.len(),
        total = references.len(),
        outstanding = ledger.len(),
        "Selected references"
    );
    selected
}

/// Acquire one raw link: normalize, escalate, and fall back to PDF discovery.
///
/// Never fails: every problem ends up as a failure outcome whose reason names
/// the URL, what each strategy returned and which PDF candidates were tried.
#[instrument(level = "info", skip_all, fields(%raw))]
pub async fn acquire_url<B: FetchBackend>(
    controller: &EscalationController<'_, B>,
    raw: &str,
    minimum_word_count: usize,
    max_retries_per_strategy: u32,
    discovery: &PdfDiscoveryConfig,
) -> AcquisitionOutcome {
    let url = match normalize(raw) {
        Ok(url) => url,
        Err(e) => return AcquisitionOutcome::failure(raw, format!("{raw:?}: {e}")),
    };
    let request = AcquisitionRequest {
        url,
        minimum_word_count,
        max_retries_per_strategy,
    };

    let escalation = controller.run(&request).await;
    if let Escalation::Succeeded {
        document, strategy, ..
    } = escalation
    {
        return AcquisitionOutcome::success(
            request.url,
            AcquiredDocument {
                document,
                via: AcquiredVia::Strategy(strategy),
            },
        );
    }

    let mut reason = format!("{}: {}", request.url, escalation.summary());
    if discovery.enabled {
        let found = discover(controller, &request, discovery).await;
        if let Some((document, strategy)) = found.best {
            info!(pdf = %document.origin_url(), "Acquired through PDF discovery");
            return AcquisitionOutcome::success(
                request.url,
                AcquiredDocument {
                    document,
                    via: AcquiredVia::PdfDiscovery(strategy),
                },
            );
        }
        reason = format!("{reason}; {}", found.describe());
    }

    warn!(reason = %truncate_for_log(&reason, 300), "Acquisition failed");
    AcquisitionOutcome::failure(request.url, reason)
}

/// Acquire every link of a reference, one after another.
pub async fn acquire_reference<B: FetchBackend>(
    controller: &EscalationController<'_, B>,
    config: &AcquisitionConfig,
    id: String,
    record: ReferenceRecord,
) -> ReferenceOutcome {
    info!(%id, links = record.links.len(), "Processing reference");
    let mut outcomes = Vec::with_capacity(record.links.len());
    for link in &record.links {
        outcomes.push(
            acquire_url(
                controller,
                link,
                config.minimum_word_count,
                config.max_retries_per_strategy,
                &config.pdf_discovery,
            )
            .await,
        );
    }
    ReferenceOutcome {
        id,
        links: record.links,
        outcomes,
    }
}

/// What a batch did.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<ReferenceOutcome>,
    /// References that were in the ledger before and succeeded this time.
    pub recovered: usize,
    /// The batch was cut short by the shutdown signal.
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status() == OutcomeStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

pub struct Orchestrator<B> {
    backend: B,
    config: AcquisitionConfig,
}

impl<B: FetchBackend> Orchestrator<B> {
    pub fn new(backend: B, config: AcquisitionConfig) -> Self {
        Self { backend, config }
    }

    /// Give the backend back, e.g. to shut its browser down.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Run `references` to completion or until `shutdown` resolves.
    ///
    /// The ledger is updated as each reference completes, so an interrupted
    /// batch still leaves it consistent with everything that finished.
    #[instrument(level = "info", skip_all, fields(references = references.len()))]
    pub async fn run<F>(
        &self,
        references: Vec<(String, ReferenceRecord)>,
        ledger: &mut FailureLedger,
        shutdown: F,
    ) -> BatchReport
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        let total = references.len();
        let controller = EscalationController::new(
            &self.backend,
            self.config.initial_timeout(),
            self.config.retry_backoff,
        );
        let controller = &controller;
        let config = &self.config;
        let pacing = self.config.pacing;

        info!(
            total,
            max_concurrent = config.max_concurrent_requests,
            paced = pacing.is_some(),
            "Starting batch"
        );

        let in_flight = stream::iter(references.into_iter().enumerate())
            .then(move |(i, reference)| async move {
                if let Some(pacing) = pacing.filter(|_| i > 0) {
                    let delay = pacing.sample();
                    info!(?delay, next = %reference.0, "Pausing before next reference");
                    sleep(delay).await;
                }
                reference
            })
            .map(move |(id, record)| acquire_reference(controller, config, id, record))
            .buffer_unordered(config.max_concurrent_requests.max(1));
        tokio::pin!(in_flight);

        let mut report = BatchReport {
            outcomes: Vec::with_capacity(total),
            recovered: 0,
            interrupted: false,
            elapsed: Duration::ZERO,
        };

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!(
                        completed = report.outcomes.len(),
                        total,
                        "Shutdown requested; abandoning references still in flight"
                    );
                    report.interrupted = true;
                    break;
                }
                next = in_flight.next() => match next {
                    Some(outcome) => {
                        if record_outcome(ledger, &outcome) {
                            report.recovered += 1;
                        }
                        debug!(done = report.outcomes.len() + 1, total, "Reference complete");
                        report.outcomes.push(outcome);
                    }
                    None => break,
                },
            }
        }

        report.elapsed = start.elapsed();
        info!(
            total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            recovered = report.recovered,
            interrupted = report.interrupted,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "Batch finished"
        );
        report
    }
}

/// Apply one finished reference to the ledger. Returns whether a previously
/// failed reference has now succeeded.
fn record_outcome(ledger: &mut FailureLedger, outcome: &ReferenceOutcome) -> bool {
    match outcome.best() {
        Some(best) => {
            info!(
                id = %outcome.id,
                words = best.document.word_count(),
                via = %best.via,
                url = %best.document.origin_url(),
                "Reference acquired"
            );
            ledger.record_success(&outcome.id)
        }
        None => {
            warn!(id = %outcome.id, "Reference failed");
            ledger.record_failure(&outcome.id, &outcome.links, outcome.failure_summary());
            false
        }
    }
}
