//! Fetch strategies, their failures, and the backend that runs them.
//!
//! The escalation controller and PDF discovery only ever talk to a
//! [`FetchBackend`]. The live implementation lives in
//! [`crate::acquisition::backend`]; tests drive the same code with a
//! scripted backend.

use crate::models::FetchResult;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// One concrete way of obtaining a page's content, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plain HTTP GET.
    Direct,
    /// Headless browser render.
    Headless,
    /// Visible browser with anti-detection patches and human-like pacing.
    Headful,
}

impl Strategy {
    /// Every strategy in escalation order.
    pub const ALL: [Strategy; 3] = [Strategy::Direct, Strategy::Headless, Strategy::Headful];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Headless => "headless",
            Strategy::Headful => "headful",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single strategy attempt produced no content.
///
/// None of these abort a request: the escalation controller records them and
/// either retries or moves on to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

/// A rendered page, used by PDF discovery to harvest links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    /// URL after redirects; relative links resolve against it.
    pub final_url: String,
}

/// Runs strategies on behalf of the escalation controller.
pub trait FetchBackend {
    /// Strategies this backend can run, in escalation order.
    fn strategies(&self) -> &[Strategy];

    /// Run one attempt of `strategy` against `url`, bounded by `timeout`.
    async fn attempt(
        &self,
        strategy: Strategy,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchResult, FetchFailure>;

    /// Render `url` (or fetch it, without a browser) for link discovery.
    async fn render_for_links(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<RenderedPage, FetchFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_order_is_cheapest_first() {
        let mut sorted = Strategy::ALL;
        sorted.sort();
        assert_eq!(sorted, Strategy::ALL);
        assert_eq!(Strategy::ALL[0], Strategy::Direct);
        assert_eq!(Strategy::ALL[2], Strategy::Headful);
    }

    #[test]
    fn test_failure_messages() {
        let status = FetchFailure::Status {
            status: 403,
            url: "https://x".to_string(),
        };
        assert_eq!(status.to_string(), "HTTP status 403 from https://x");
        assert_eq!(
            FetchFailure::Timeout(Duration::from_secs(15)).to_string(),
            "timed out after 15s"
        );
    }
}
