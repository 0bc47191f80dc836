//! PDF discovery.
//!
//! Landing and abstract pages often carry the full text behind a link. When
//! escalation on the page itself comes up short, the page is rendered, its
//! PDF-looking links are collected, and each candidate is escalated in turn
//! out of one shared [`AttemptBudget`]. Candidates are never searched for
//! further links.

use crate::acquisition::escalation::{AttemptBudget, Escalation, EscalationController};
use crate::acquisition::strategy::{FetchBackend, FetchFailure, Strategy};
use crate::config::PdfDiscoveryConfig;
use crate::models::{AcquisitionRequest, ExtractedDocument};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Absolute URLs of the PDF-looking links on a page.
///
/// A link qualifies when its resolved URL contains `pdf` anywhere
/// (case-insensitive), which covers both `.pdf` files and `/pdf/` viewer
/// routes. The page itself, fragments-only links and non-HTTP schemes are
/// dropped; order of first appearance is kept and at most `max` are returned.
pub fn pdf_candidates(html: &str, page_url: &str, max: usize) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        warn!(%page_url, "Cannot resolve links against an invalid page URL");
        return Vec::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .filter(|url| url.to_ascii_lowercase().contains("pdf"))
        .filter(|url| !same_page(url, &base))
        .unique()
        .take(max)
        .collect()
}

fn same_page(candidate: &str, base: &Url) -> bool {
    let mut base = base.clone();
    base.set_fragment(None);
    candidate == base.as_str()
}

/// How one candidate fared.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub url: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    /// The longest accepted candidate and the strategy that fetched it.
    pub best: Option<(ExtractedDocument, Strategy)>,
    pub tried: Vec<CandidateReport>,
    pub render_error: Option<FetchFailure>,
}

impl Discovery {
    /// One-line account of what discovery did, for failure reasons.
    pub fn describe(&self) -> String {
        if let Some(e) = &self.render_error {
            return format!("pdf discovery: page render failed ({e})");
        }
        if self.tried.is_empty() {
            return "pdf discovery: no PDF links found".to_string();
        }
        let tried = self
            .tried
            .iter()
            .map(|c| format!("{} ({})", c.url, c.summary))
            .join("; ");
        format!("pdf discovery tried {}: {tried}", self.tried.len())
    }
}

/// Render `request.url`, then escalate every PDF candidate on it.
#[instrument(level = "info", skip_all, fields(url = %request.url))]
pub async fn discover<B: FetchBackend>(
    controller: &EscalationController<'_, B>,
    request: &AcquisitionRequest,
    config: &PdfDiscoveryConfig,
) -> Discovery {
    let page = match controller
        .backend()
        .render_for_links(&request.url, controller.initial_timeout())
        .await
    {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "Could not render page for PDF discovery");
            return Discovery {
                best: None,
                tried: Vec::new(),
                render_error: Some(e),
            };
        }
    };

    let candidates = pdf_candidates(&page.html, &page.final_url, config.max_candidates);
    info!(candidates = candidates.len(), "Found PDF candidates");

    let budget = AttemptBudget::new(config.attempt_budget);
    let mut best: Option<(ExtractedDocument, Strategy)> = None;
    let mut tried = Vec::new();

    for candidate in candidates {
        if budget.is_spent() {
            debug!(%candidate, "Attempt budget spent; skipping remaining candidates");
            tried.push(CandidateReport {
                url: candidate,
                summary: "skipped, attempt budget spent".to_string(),
            });
            continue;
        }

        let candidate_request = AcquisitionRequest {
            url: candidate.clone(),
            ..request.clone()
        };
        let escalation = controller
            .run_with_budget(&candidate_request, &budget)
            .await;
        let summary = escalation.summary();

        if let Escalation::Succeeded {
            document, strategy, ..
        } = escalation
        {
            debug!(%candidate, words = document.word_count(), "Candidate accepted");
            let longer = best
                .as_ref()
                .is_none_or(|(current, _)| document.text().len() > current.text().len());
            if longer {
                best = Some((document, strategy));
            }
        }
        tried.push(CandidateReport {
            url: candidate,
            summary,
        });
    }

    Discovery {
        best,
        tried,
        render_error: None,
    }
}
