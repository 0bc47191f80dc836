//! Escalation Controller.
//!
//! Tries each strategy of the backend in order, retrying a strategy up to
//! `max_retries_per_strategy` times before moving on:
//!
//! ```text
//! Trying(0, 1) ──ok──────────────────────────────▶ Succeeded
//!      │ fail/short, attempt < max
//!      ▼
//! Trying(0, 2) … Trying(0, max) ──fail/short──▶ Trying(1, 1) … ──▶ Exhausted
//! ```
//!
//! Every decision is made by [`State::next`], a pure function of the current
//! state and whether the attempt was accepted. Attempt `n` of a strategy runs
//! with a timeout of `n × initial_timeout` and is preceded by a randomized
//! backoff of `retry_backoff × (n - 1)`.

use crate::acquisition::extract::extract_owned;
use crate::acquisition::strategy::{FetchBackend, FetchFailure, Strategy};
use crate::config::DelayRange;
use crate::models::{AcquisitionRequest, ExtractedDocument, FetchResult};
use std::cell::Cell;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Where an escalation stands. `attempt` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Trying { strategy_index: usize, attempt: u32 },
    Succeeded,
    Exhausted,
}

impl State {
    pub const INITIAL: State = State::Trying {
        strategy_index: 0,
        attempt: 1,
    };

    /// The state after an attempt in `self` was `accepted` or not.
    ///
    /// Terminal states map to themselves.
    pub fn next(self, accepted: bool, strategy_count: usize, max_retries: u32) -> State {
        match self {
            State::Trying {
                strategy_index,
                attempt,
            } => {
                if accepted {
                    State::Succeeded
                } else if attempt < max_retries {
                    State::Trying {
                        strategy_index,
                        attempt: attempt + 1,
                    }
                } else if strategy_index + 1 < strategy_count {
                    State::Trying {
                        strategy_index: strategy_index + 1,
                        attempt: 1,
                    }
                } else {
                    State::Exhausted
                }
            }
            terminal => terminal,
        }
    }
}

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Accepted { words: usize },
    BelowThreshold { words: usize },
    Failed(FetchFailure),
}

impl fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptResult::Accepted { words } => write!(f, "accepted ({words} words)"),
            AttemptResult::BelowThreshold { words } => write!(f, "{words} words"),
            AttemptResult::Failed(failure) => write!(f, "{failure}"),
        }
    }
}

/// One row of an escalation's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub strategy: Strategy,
    pub attempt: u32,
    pub result: AttemptResult,
}

/// Terminal result of escalating one URL.
#[derive(Debug, Clone)]
pub enum Escalation {
    Succeeded {
        document: ExtractedDocument,
        strategy: Strategy,
        attempts: Vec<AttemptRecord>,
    },
    Exhausted {
        attempts: Vec<AttemptRecord>,
    },
}

impl Escalation {
    /// Every attempt made, in order, including the accepted one.
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Escalation::Succeeded { attempts, .. } | Escalation::Exhausted { attempts } => attempts,
        }
    }

    /// Short description of the last attempt of each strategy tried.
    pub fn summary(&self) -> String {
        let mut last: Vec<&AttemptRecord> = Vec::new();
        for record in self.attempts() {
            match last.last_mut() {
                Some(prev) if prev.strategy == record.strategy => *prev = record,
                _ => last.push(record),
            }
        }
        if last.is_empty() {
            return "no strategies attempted".to_string();
        }
        last.iter()
            .map(|r| format!("{} x{}: {}", r.strategy, r.attempt, r.result))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A pool of strategy attempts shared by several escalations.
///
/// PDF discovery hands one budget to every candidate of a page so a page
/// with dozens of PDF-ish links cannot trigger dozens of full escalations.
#[derive(Debug)]
pub struct AttemptBudget {
    remaining: Cell<usize>,
}

impl AttemptBudget {
    /// A budget of `attempts` strategy attempts.
    pub fn new(attempts: usize) -> Self {
        Self {
            remaining: Cell::new(attempts),
        }
    }

    /// A budget that never runs out, for escalating a single URL.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Take one attempt from the budget; `false` once it is spent.
    pub fn try_take(&self) -> bool {
        match self.remaining.get() {
            0 => false,
            n => {
                self.remaining.set(n - 1);
                true
            }
        }
    }

    pub fn is_spent(&self) -> bool {
        self.remaining.get() == 0
    }
}

/// Runs the escalation state machine against a [`FetchBackend`].
pub struct EscalationController<'a, B> {
    backend: &'a B,
    initial_timeout: Duration,
    retry_backoff: DelayRange,
}

impl<'a, B: FetchBackend> EscalationController<'a, B> {
    /// Create a controller.
    ///
    /// # Arguments
    ///
    /// * `backend` - Runs the strategies, in the order it reports them
    /// * `initial_timeout` - Timeout of the first attempt of every strategy
    /// * `retry_backoff` - Range the pre-retry delay is drawn from, before
    ///   scaling by the attempt index
    pub fn new(backend: &'a B, initial_timeout: Duration, retry_backoff: DelayRange) -> Self {
        Self {
            backend,
            initial_timeout,
            retry_backoff,
        }
    }

    pub fn backend(&self) -> &'a B {
        self.backend
    }

    pub fn initial_timeout(&self) -> Duration {
        self.initial_timeout
    }

    /// Escalate `request` until a strategy's text is accepted or every
    /// strategy has used its retries.
    ///
    /// # Returns
    ///
    /// [`Escalation::Succeeded`] with the accepted document, or
    /// [`Escalation::Exhausted`] with what each attempt produced.
    pub async fn run(&self, request: &AcquisitionRequest) -> Escalation {
        self.run_with_budget(request, &AttemptBudget::unlimited())
            .await
    }

    /// Escalate `request`, drawing one unit from `budget` per attempt.
    ///
    /// A spent budget ends the escalation as exhausted.
    pub async fn run_with_budget(
        &self,
        request: &AcquisitionRequest,
        budget: &AttemptBudget,
    ) -> Escalation {
        let strategies = self.backend.strategies();
        let max_retries = request.max_retries_per_strategy.max(1);
        let mut attempts = Vec::new();
        let mut state = if strategies.is_empty() {
            State::Exhausted
        } else {
            State::INITIAL
        };

        while let State::Trying {
            strategy_index,
            attempt,
        } = state
        {
            if !budget.try_take() {
                warn!(url = %request.url, "Attempt budget spent; giving up");
                break;
            }

            let strategy = strategies[strategy_index];
            if attempt > 1 {
                let backoff = self.retry_backoff.sample().mul_f64(f64::from(attempt - 1));
                debug!(url = %request.url, %strategy, attempt, ?backoff, "Backing off before retry");
                sleep(backoff).await;
            }

            let timeout = self.initial_timeout * attempt;
            let outcome = self
                .attempt_once(request, strategy, attempt, timeout)
                .await;
            state = state.next(outcome.is_ok(), strategies.len(), max_retries);

            let document = match outcome {
                Ok(document) => document,
                Err(result) => {
                    attempts.push(AttemptRecord {
                        strategy,
                        attempt,
                        result,
                    });
                    if let State::Trying {
                        strategy_index: next_index,
                        ..
                    } = state
                    {
                        if next_index != strategy_index {
                            info!(
                                url = %request.url,
                                from = %strategy,
                                to = %strategies[next_index],
                                "Escalating"
                            );
                        }
                    }
                    continue;
                }
            };

            attempts.push(AttemptRecord {
                strategy,
                attempt,
                result: AttemptResult::Accepted {
                    words: document.word_count(),
                },
            });
            info!(
                url = %request.url,
                %strategy,
                attempt,
                words = document.word_count(),
                "Acquired"
            );
            return Escalation::Succeeded {
                document,
                strategy,
                attempts,
            };
        }

        warn!(url = %request.url, attempts = attempts.len(), "All strategies exhausted");
        Escalation::Exhausted { attempts }
    }

    async fn attempt_once(
        &self,
        request: &AcquisitionRequest,
        strategy: Strategy,
        attempt: u32,
        timeout: Duration,
    ) -> Result<ExtractedDocument, AttemptResult> {
        let fetched = match self.backend.attempt(strategy, &request.url, timeout).await {
            Ok(fetched) => fetched,
            Err(failure) => {
                warn!(url = %request.url, %strategy, attempt, ?timeout, error = %failure, "Attempt failed");
                return Err(AttemptResult::Failed(failure));
            }
        };

        let FetchResult {
            raw_content,
            declared_kind,
            source_url,
            snapshot,
        } = fetched;
        let extraction = extract_owned(declared_kind, raw_content).await;
        match ExtractedDocument::accept(extraction.text, source_url, request.minimum_word_count) {
            Ok(document) => Ok(document.with_snapshot(snapshot)),
            Err(words) => {
                info!(
                    url = %request.url,
                    %strategy,
                    attempt,
                    ?timeout,
                    words,
                    minimum = request.minimum_word_count,
                    "Below word threshold"
                );
                Err(AttemptResult::BelowThreshold { words })
            }
        }
    }
}
