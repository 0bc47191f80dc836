//! Direct HTTP fetch strategy.
//!
//! One GET per attempt with a randomized user-agent. Transient transport
//! failures (timeouts, connection resets, 5xx, 429) are retried here with
//! exponential backoff and jitter, so the escalation controller sees the
//! whole exchange as a single attempt.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(retry-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::acquisition::extract::looks_like_pdf;
use crate::acquisition::identity::random_user_agent;
use crate::acquisition::strategy::FetchFailure;
use crate::config::TransportRetry;
use crate::models::{ContentKind, FetchResult};
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Shared HTTP client for the direct strategy and PDF re-downloads.
///
/// Cloning is cheap and clones share one connection pool.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: Client,
    retry: TransportRetry,
}

enum Transient {
    Retry(FetchFailure),
    Fatal(FetchFailure),
}

impl DirectFetcher {
    pub fn new(retry: TransportRetry) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, retry })
    }

    /// Run one direct attempt against `url`.
    ///
    /// The response's content type (or a `.pdf` path, or `%PDF-` magic bytes)
    /// decides whether the body is declared PDF or HTML.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchFailure> {
        let t0 = Instant::now();
        let mut retry = 0u32;

        loop {
            match self.fetch_once(url, timeout).await {
                Ok(result) => {
                    debug!(
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        bytes = result.raw_content.len(),
                        kind = %result.declared_kind,
                        "Direct fetch succeeded"
                    );
                    return Ok(result);
                }
                Err(Transient::Fatal(failure)) => return Err(failure),
                Err(Transient::Retry(failure)) => {
                    retry += 1;
                    if retry >= self.retry.attempts {
                        warn!(
                            retry,
                            elapsed_ms = t0.elapsed().as_millis() as u64,
                            error = %failure,
                            "Direct fetch exhausted transport retries"
                        );
                        return Err(failure);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = self.retry.delay_for(retry) + Duration::from_millis(jitter_ms);
                    warn!(retry, ?delay, error = %failure, "Transient transport error; backing off");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Download raw bytes with no content-type interpretation.
    ///
    /// Used when a browser lands on a PDF and the bytes have to be fetched
    /// out of band.
    pub async fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchFailure> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        Ok(bytes.to_vec())
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<FetchResult, Transient> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/pdf;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transient_or_fatal(e, timeout))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            let failure = FetchFailure::Status {
                status: status.as_u16(),
                url: final_url,
            };
            return Err(if is_retryable_status(status) {
                Transient::Retry(failure)
            } else {
                Transient::Fatal(failure)
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let body = response
            .bytes()
            .await
            .map_err(|e| transient_or_fatal(e, timeout))?;

        let declared_kind = if content_type.contains("application/pdf")
            || path_ends_with_pdf(&final_url)
            || looks_like_pdf(&body)
        {
            ContentKind::Pdf
        } else {
            ContentKind::Html
        };

        Ok(FetchResult {
            raw_content: body.to_vec(),
            declared_kind,
            source_url: final_url,
            snapshot: None,
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify(e: reqwest::Error, timeout: Duration) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Timeout(timeout)
    } else {
        FetchFailure::Transport(e.to_string())
    }
}

fn transient_or_fatal(e: reqwest::Error, timeout: Duration) -> Transient {
    let transient = e.is_timeout() || e.is_connect() || e.is_request() || e.is_body();
    let failure = classify(e, timeout);
    if transient {
        Transient::Retry(failure)
    } else {
        Transient::Fatal(failure)
    }
}

/// Whether the URL's path (ignoring query and fragment) ends in `.pdf`.
pub fn path_ends_with_pdf(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase().ends_with(".pdf"),
        Err(_) => url.to_ascii_lowercase().ends_with(".pdf"),
    }
}
