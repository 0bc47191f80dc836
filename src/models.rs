//! Data models for references, fetched content and acquisition outcomes.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ReferenceRecord`]: one bibliography entry as read from `references.json`
//! - [`AcquisitionRequest`]: one URL to acquire under a word-count policy
//! - [`FetchResult`]: raw bytes produced by a fetch strategy
//! - [`ExtractedDocument`]: text that passed the policy threshold
//! - [`AcquisitionOutcome`]: the per-URL verdict
//! - [`ReferenceOutcome`]: the per-reference verdict over all of its links

use crate::acquisition::strategy::Strategy;
use crate::utils::word_count;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bibliography entry as stored in `references.json`.
///
/// Only `links` drives acquisition; `title` is carried along for the
/// manual-entry stubs written for references that could not be fetched.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferenceRecord {
    /// Candidate URLs (or bare DOIs) for the full text, in preference order.
    pub links: Vec<String>,
    /// Human-readable title, when the bibliography provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One URL to acquire. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    /// Normalized absolute URL.
    pub url: String,
    /// Minimum number of words the extracted text must have to be accepted.
    pub minimum_word_count: usize,
    /// How many times each strategy is tried before escalating.
    pub max_retries_per_strategy: u32,
}

/// How a fetch strategy declares the bytes it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Pdf,
    /// Already-visible text, as produced by the headful selection heuristics.
    Text,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContentKind::Html => "html",
            ContentKind::Pdf => "pdf",
            ContentKind::Text => "text",
        })
    }
}

/// Raw content produced by a fetch strategy, consumed immediately by the
/// content extractor.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub raw_content: Vec<u8>,
    pub declared_kind: ContentKind,
    /// Where the bytes actually came from (after redirects).
    pub source_url: String,
    /// Printed PDF of the rendered page, kept as a surrogate for the
    /// original document. Only the headful strategy produces one.
    pub snapshot: Option<Vec<u8>>,
}

impl fmt::Debug for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResult")
            .field("bytes", &self.raw_content.len())
            .field("declared_kind", &self.declared_kind)
            .field("source_url", &self.source_url)
            .field("snapshot_bytes", &self.snapshot.as_ref().map(Vec::len))
            .finish()
    }
}

/// Extracted text that met the word-count policy.
///
/// The only constructor is [`ExtractedDocument::accept`], so a value of this
/// type always satisfies the threshold it was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedDocument {
    text: String,
    word_count: usize,
    origin_url: String,
    #[serde(skip)]
    snapshot: Option<Vec<u8>>,
}

impl ExtractedDocument {
    /// Accept `text` if it has at least `minimum_word_count` words.
    ///
    /// On rejection the measured word count is returned so callers can log it.
    pub fn accept(
        text: String,
        origin_url: impl Into<String>,
        minimum_word_count: usize,
    ) -> Result<Self, usize> {
        let words = word_count(&text);
        if words >= minimum_word_count {
            Ok(Self {
                text,
                word_count: words,
                origin_url: origin_url.into(),
                snapshot: None,
            })
        } else {
            Err(words)
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn origin_url(&self) -> &str {
        &self.origin_url
    }

    /// Attach the rendered-page PDF captured alongside the text.
    pub fn with_snapshot(mut self, snapshot: Option<Vec<u8>>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn snapshot(&self) -> Option<&[u8]> {
        self.snapshot.as_deref()
    }
}

/// How an accepted document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "strategy", rename_all = "snake_case")]
pub enum AcquiredVia {
    /// The requested URL itself yielded enough text under this strategy.
    Strategy(Strategy),
    /// A document link found on the requested page yielded enough text.
    PdfDiscovery(Strategy),
}

impl fmt::Display for AcquiredVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquiredVia::Strategy(s) => write!(f, "{s}"),
            AcquiredVia::PdfDiscovery(s) => write!(f, "pdf_discovery/{s}"),
        }
    }
}

/// An accepted document plus the route that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredDocument {
    pub document: ExtractedDocument,
    pub via: AcquiredVia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// The verdict for one [`AcquisitionRequest`].
///
/// Holding a `Result` makes "exactly one of document / failure reason"
/// a property of the type rather than a convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionOutcome {
    pub url: String,
    result: Result<AcquiredDocument, String>,
}

impl AcquisitionOutcome {
    pub fn success(url: impl Into<String>, acquired: AcquiredDocument) -> Self {
        Self {
            url: url.into(),
            result: Ok(acquired),
        }
    }

    pub fn failure(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            result: Err(reason.into()),
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        match self.result {
            Ok(_) => OutcomeStatus::Success,
            Err(_) => OutcomeStatus::Failure,
        }
    }

    pub fn acquired(&self) -> Option<&AcquiredDocument> {
        self.result.as_ref().ok()
    }

    pub fn document(&self) -> Option<&ExtractedDocument> {
        self.acquired().map(|a| &a.document)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// The verdict for a whole reference: one outcome per link, in link order.
#[derive(Debug, Clone)]
pub struct ReferenceOutcome {
    pub id: String,
    pub links: Vec<String>,
    pub outcomes: Vec<AcquisitionOutcome>,
}

impl ReferenceOutcome {
    /// The longest accepted text among the reference's links.
    pub fn best(&self) -> Option<&AcquiredDocument> {
        self.outcomes
            .iter()
            .filter_map(AcquisitionOutcome::acquired)
            .max_by_key(|a| a.document.text().len())
    }

    pub fn status(&self) -> OutcomeStatus {
        if self.best().is_some() {
            OutcomeStatus::Success
        } else {
            OutcomeStatus::Failure
        }
    }

    /// One line per failed link, used as the ledger reason.
    pub fn failure_summary(&self) -> String {
        let reasons: Vec<&str> = self
            .outcomes
            .iter()
            .filter_map(AcquisitionOutcome::failure_reason)
            .collect();
        if reasons.is_empty() {
            "no links to acquire".to_string()
        } else {
            reasons.join("; ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(words: usize, url: &str) -> AcquiredDocument {
        let text = vec!["word"; words].join(" ");
        AcquiredDocument {
            document: ExtractedDocument::accept(text, url, 1).unwrap(),
            via: AcquiredVia::Strategy(Strategy::Direct),
        }
    }

    #[test]
    fn test_accept_enforces_threshold() {
        let text = vec!["w"; 699].join(" ");
        assert_eq!(ExtractedDocument::accept(text, "u", 700), Err(699));

        let text = vec!["w"; 700].join(" ");
        let accepted = ExtractedDocument::accept(text, "u", 700).unwrap();
        assert_eq!(accepted.word_count(), 700);
        assert_eq!(accepted.origin_url(), "u");
    }

    #[test]
    fn test_outcome_exclusivity() {
        let ok = AcquisitionOutcome::success("https://a", doc(3, "https://a"));
        assert_eq!(ok.status(), OutcomeStatus::Success);
        assert!(ok.document().is_some());
        assert!(ok.failure_reason().is_none());

        let err = AcquisitionOutcome::failure("https://b", "exhausted");
        assert_eq!(err.status(), OutcomeStatus::Failure);
        assert!(err.document().is_none());
        assert_eq!(err.failure_reason(), Some("exhausted"));
    }

    #[test]
    fn test_reference_best_picks_longest_text() {
        let outcome = ReferenceOutcome {
            id: "ref".to_string(),
            links: vec!["a".into(), "b".into(), "c".into()],
            outcomes: vec![
                AcquisitionOutcome::success("a", doc(10, "a")),
                AcquisitionOutcome::failure("b", "nope"),
                AcquisitionOutcome::success("c", doc(50, "c")),
            ],
        };
        assert_eq!(outcome.status(), OutcomeStatus::Success);
        assert_eq!(outcome.best().unwrap().document.origin_url(), "c");
    }

    #[test]
    fn test_reference_failure_summary_joins_reasons() {
        let outcome = ReferenceOutcome {
            id: "ref".to_string(),
            links: vec!["a".into(), "b".into()],
            outcomes: vec![
                AcquisitionOutcome::failure("a", "a failed"),
                AcquisitionOutcome::failure("b", "b failed"),
            ],
        };
        assert_eq!(outcome.status(), OutcomeStatus::Failure);
        assert_eq!(outcome.failure_summary(), "a failed; b failed");
    }

    #[test]
    fn test_reference_record_title_is_optional() {
        let rec: ReferenceRecord =
            serde_json::from_str(r#"{"links": ["10.1/x"], "authors": "ignored"}"#).unwrap();
        assert_eq!(rec.links, vec!["10.1/x".to_string()]);
        assert!(rec.title.is_none());
    }
}
