//! Acquisition configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults ([`AcquisitionConfig::default`])
//! 2. An optional YAML file passed with `--config`
//! 3. Command-line flags ([`AcquisitionConfig::apply_cli`])
//!
//! # Example file
//!
//! ```yaml
//! max_concurrent_requests: 4
//! initial_timeout_seconds: 20
//! minimum_word_count: 700
//! max_retries_per_strategy: 3
//! pacing: { min_secs: 30, max_secs: 60 }
//! pdf_discovery: { enabled: true, max_candidates: 8, attempt_budget: 12 }
//! ```

use crate::acquisition::strategy::Strategy;
use crate::cli::Cli;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// A closed interval of seconds from which delays are drawn uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange::fixed(0.0);

    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    /// Whether both bounds are finite, non-negative and ordered.
    pub fn is_valid(&self) -> bool {
        self.min_secs.is_finite()
            && self.max_secs.is_finite()
            && self.min_secs >= 0.0
            && self.min_secs <= self.max_secs
    }

    /// Draw a delay from the range. Negative bounds clamp to zero and
    /// non-finite bounds to the other bound.
    pub fn sample(&self) -> Duration {
        let lo = if self.min_secs.is_finite() {
            self.min_secs.max(0.0)
        } else {
            0.0
        };
        let hi = if self.max_secs.is_finite() {
            self.max_secs.max(lo)
        } else {
            lo
        };
        let secs = if hi > lo {
            rng().random_range(lo..=hi)
        } else {
            lo
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// An inclusive integer range, for counts such as scroll steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub fn sample(&self) -> u32 {
        if self.max > self.min {
            rng().random_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

/// Transport-level retry for the direct strategy.
///
/// This sits below the escalation controller: a direct attempt that retried
/// three times on connection resets still counts as one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportRetry {
    /// Total tries including the first.
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for TransportRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl TransportRetry {
    /// Exponential delay before retry number `retry` (1-based), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PdfDiscoveryConfig {
    pub enabled: bool,
    /// Most candidate links tried per page.
    pub max_candidates: usize,
    /// Strategy attempts shared by all candidates of one page.
    pub attempt_budget: usize,
}

impl Default for PdfDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_candidates: 8,
            attempt_budget: 12,
        }
    }
}

/// Browser behaviour for the rendering strategies.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub enabled: bool,
    pub headful: bool,
    pub chrome_executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub cookie_consent_timeout_ms: u64,
    /// Simulated reading time before the headful strategy scrolls.
    pub reading_delay: DelayRange,
    pub scroll_steps: CountRange,
    pub scroll_pause: DelayRange,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            headful: true,
            chrome_executable: None,
            viewport_width: 1920,
            viewport_height: 1080,
            cookie_consent_timeout_ms: 5_000,
            reading_delay: DelayRange::new(60.0, 120.0),
            scroll_steps: CountRange { min: 5, max: 15 },
            scroll_pause: DelayRange::new(1.0, 3.0),
        }
    }
}

/// Everything the acquisition engine and orchestrator can be tuned with.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub max_concurrent_requests: usize,
    pub initial_timeout_seconds: f64,
    pub minimum_word_count: usize,
    pub max_retries_per_strategy: u32,
    /// Backoff between retries of the same strategy, multiplied by the attempt index.
    pub retry_backoff: DelayRange,
    /// Delay inserted between dispatching successive references.
    pub pacing: Option<DelayRange>,
    pub transport_retry: TransportRetry,
    pub pdf_discovery: PdfDiscoveryConfig,
    pub browser: BrowserSettings,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            initial_timeout_seconds: 15.0,
            minimum_word_count: 700,
            max_retries_per_strategy: 3,
            retry_backoff: DelayRange::new(1.0, 3.0),
            pacing: None,
            transport_retry: TransportRetry::default(),
            pdf_discovery: PdfDiscoveryConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Load a YAML configuration file; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Unreadable or unparsable files, and values [`Self::validate`] rejects.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        info!("Loaded configuration");
        Ok(config)
    }

    /// Reject timeouts and delay ranges that cannot become a [`Duration`].
    pub fn validate(&self) -> Result<(), String> {
        if !(self.initial_timeout_seconds.is_finite() && self.initial_timeout_seconds > 0.0) {
            return Err(format!(
                "initial_timeout_seconds must be a positive number, got {}",
                self.initial_timeout_seconds
            ));
        }
        let ranges = [
            ("retry_backoff", Some(self.retry_backoff)),
            ("pacing", self.pacing),
            ("browser.reading_delay", Some(self.browser.reading_delay)),
            ("browser.scroll_pause", Some(self.browser.scroll_pause)),
        ];
        for (name, range) in ranges {
            if let Some(range) = range.filter(|r| !r.is_valid()) {
                return Err(format!(
                    "{name} must satisfy 0 <= min_secs <= max_secs with finite values, got {}..{}",
                    range.min_secs, range.max_secs
                ));
            }
        }
        Ok(())
    }

    /// Settings tuned for slow, human-paced acquisition: one reference at a
    /// time, long timeouts and 30–60 s between references.
    pub fn stealth(mut self) -> Self {
        self.max_concurrent_requests = 1;
        self.initial_timeout_seconds = 30.0;
        self.retry_backoff = DelayRange::new(10.0, 20.0);
        self.pacing = Some(DelayRange::new(30.0, 60.0));
        self
    }

    /// Apply command-line overrides on top of file/default settings.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if cli.stealth {
            self = self.stealth();
        }
        if let Some(n) = cli.max_concurrent {
            self.max_concurrent_requests = n;
        }
        if let Some(t) = cli.initial_timeout {
            self.initial_timeout_seconds = t;
        }
        if let Some(w) = cli.min_words {
            self.minimum_word_count = w;
        }
        if let Some(r) = cli.max_retries {
            self.max_retries_per_strategy = r;
        }
        if cli.no_browser {
            self.browser.enabled = false;
        }
        if cli.no_headful {
            self.browser.headful = false;
        }
        if cli.no_pdf_discovery {
            self.pdf_discovery.enabled = false;
        }
        if let Some(path) = &cli.chrome {
            self.browser.chrome_executable = Some(path.clone());
        }
        self.max_concurrent_requests = self.max_concurrent_requests.max(1);
        self.max_retries_per_strategy = self.max_retries_per_strategy.max(1);
        self
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.initial_timeout_seconds.max(0.1))
            .unwrap_or(Duration::from_secs(15))
    }

    /// The strategies the configured engine will escalate through.
    pub fn enabled_strategies(&self) -> Vec<Strategy> {
        Strategy::ALL
            .into_iter()
            .filter(|s| match s {
                Strategy::Direct => true,
                Strategy::Headless => self.browser.enabled,
                Strategy::Headful => self.browser.enabled && self.browser.headful,
            })
            .collect()
    }
}
