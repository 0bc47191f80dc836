//! The web content acquisition engine.
//!
//! Given a URL, obtain the readable text of the document behind it, or a
//! recorded failure. Acquisition escalates through strategies of increasing
//! cost and stops at the first one whose extracted text meets the word-count
//! policy:
//!
//! | Strategy | Module | Method |
//! |----------|--------|--------|
//! | Direct | [`direct`] | One HTTP GET with transport-level retry |
//! | Headless | [`browser`] | Headless Chromium render in a fresh context |
//! | Headful | [`browser`] | Visible, stealth-patched Chromium with reading delay and scrolling |
//!
//! When every strategy comes up short, [`discovery`] scans the rendered page
//! for links that look like the paper's PDF and escalates on each of them.
//!
//! # Layout
//!
//! - [`identity`]: randomized user-agent strings
//! - [`normalize`]: bare DOIs and scheme-less strings to absolute URLs
//! - [`extract`]: HTML / PDF / text to plain text, never failing
//! - [`strategy`]: the strategy variant, typed failures and the [`strategy::FetchBackend`] seam
//! - [`backend`]: the live backend composing [`direct`] and [`browser`]
//! - [`escalation`]: the per-URL retry/escalation state machine

pub mod backend;
pub mod browser;
pub mod direct;
pub mod discovery;
pub mod escalation;
pub mod extract;
pub mod identity;
pub mod normalize;
pub mod strategy;

#[cfg(test)]
pub mod testing;
