//! The failure ledger: `failed_scrapes.json` in the output directory.
//!
//! Maps reference id to `{reason, links, last_attempt}`. A reference is in the
//! ledger exactly when its most recent outcome was a failure. The file is
//! removed once the ledger becomes empty, so its mere presence tells the next
//! run that something is outstanding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const LEDGER_FILE: &str = "failed_scrapes.json";

/// Why a reference is outstanding and what was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Every link attempted and how each fared.
    pub reason: String,
    /// The reference's links as given in the input.
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: PathBuf,
    entries: BTreeMap<String, FailureRecord>,
}

impl FailureLedger {
    /// An empty ledger that will persist to `output_dir`.
    pub fn empty(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(LEDGER_FILE),
            entries: BTreeMap::new(),
        }
    }

    /// Load the ledger from `output_dir`; a missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// A ledger file that exists but cannot be read or parsed is an error.
    #[instrument(level = "info", skip_all, fields(dir = %output_dir.display()))]
    pub async fn load(output_dir: &Path) -> Result<Self, Box<dyn Error>> {
        let mut ledger = Self::empty(output_dir);
        match fs::read_to_string(&ledger.path).await {
            Ok(raw) => {
                ledger.entries = serde_json::from_str(&raw)?;
                info!(entries = ledger.entries.len(), "Loaded failure ledger");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No failure ledger; starting fresh");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(ledger)
    }

    /// Record (or refresh) a failure for `id`, stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `id` - Reference id
    /// * `links` - The reference's links, kept for `--manual-entry` and reruns
    /// * `reason` - Human-readable account of every attempt
    pub fn record_failure(&mut self, id: &str, links: &[String], reason: impl Into<String>) {
        self.entries.insert(
            id.to_string(),
            FailureRecord {
                reason: reason.into(),
                links: links.to_vec(),
                last_attempt: Some(Utc::now()),
            },
        );
    }

    /// Drop `id` from the ledger. Returns whether it had been recorded.
    pub fn record_success(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Whether `id` failed on its most recent run.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&FailureRecord> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FailureRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the ledger, or delete the file when nothing is outstanding.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self) -> Result<(), Box<dyn Error>> {
        if self.entries.is_empty() {
            match fs::remove_file(&self.path).await {
                Ok(()) => info!("All failures resolved; removed failure ledger"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        info!(entries = self.entries.len(), "Wrote failure ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailureLedger::load(dir.path()).await.unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.path(), dir.path().join(LEDGER_FILE));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FailureLedger::empty(dir.path());
        ledger.record_failure("smith2020", &links(&["10.1/a"]), "direct x3: timed out");
        ledger.save().await.unwrap();

        let reloaded = FailureLedger::load(dir.path()).await.unwrap();
        let record = reloaded.get("smith2020").unwrap();
        assert_eq!(record.links, vec!["10.1/a"]);
        assert_eq!(record.reason, "direct x3: timed out");
        assert!(record.last_attempt.is_some());
        assert!(!dir.path().join("failed_scrapes.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reads_records_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEDGER_FILE),
            r#"{"jones2019": {"reason": "Content less than 60KB", "links": ["https://x"]}}"#,
        )
        .unwrap();

        let ledger = FailureLedger::load(dir.path()).await.unwrap();
        assert!(ledger.contains("jones2019"));
        assert!(ledger.get("jones2019").unwrap().last_attempt.is_none());
    }

    #[tokio::test]
    async fn test_empty_ledger_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FailureLedger::empty(dir.path());
        ledger.record_failure("a", &links(&["x"]), "nope");
        ledger.save().await.unwrap();
        assert!(ledger.path().exists());

        assert!(ledger.record_success("a"));
        assert!(!ledger.record_success("a"));
        ledger.save().await.unwrap();
        assert!(!ledger.path().exists());

        // Saving an empty ledger with no file is fine too.
        ledger.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE), "{not json").unwrap();
        assert!(FailureLedger::load(dir.path()).await.is_err());
    }
}
