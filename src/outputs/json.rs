//! The success index, `successful_scrapes.json`.
//!
//! Maps reference id to where its text was written and how it was obtained:
//!
//! ```json
//! {
//!   "smith2020": {
//!     "file": "smith2020_full.md",
//!     "words": 5812,
//!     "bytes": 38411,
//!     "url": "https://journal.example/smith2020.pdf",
//!     "via": "pdf_discovery/direct"
//!   },
//!   "jones2019": {
//!     "file": "jones2019_full.md",
//!     "words": 2210,
//!     "bytes": 14002,
//!     "url": "https://publisher.example/jones2019",
//!     "via": "headful",
//!     "snapshot": "jones2019_snapshot.pdf"
//!   }
//! }
//! ```
//!
//! The index is rewritten in full at the end of every batch; entries for
//! references not processed this time are kept as they were.

use crate::models::AcquiredDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const SUCCESS_INDEX_FILE: &str = "successful_scrapes.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessEntry {
    pub file: String,
    #[serde(default)]
    pub words: usize,
    #[serde(default, alias = "size")]
    pub bytes: usize,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub via: String,
    /// Printed page kept as a surrogate PDF, headful acquisitions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl SuccessEntry {
    /// Index entry for `acquired`, whose text was written to `file`.
    ///
    /// # Arguments
    ///
    /// * `file` - Name of the full-text file, relative to the output directory
    /// * `acquired` - The accepted document and the strategy that produced it
    ///
    /// # Returns
    ///
    /// An entry with `snapshot` unset; set it once the snapshot file is written.
    pub fn new(file: impl Into<String>, acquired: &AcquiredDocument) -> Self {
        Self {
            file: file.into(),
            words: acquired.document.word_count(),
            bytes: acquired.document.text().len(),
            url: acquired.document.origin_url().to_string(),
            via: acquired.via.to_string(),
            snapshot: None,
        }
    }
}

/// Reference id to [`SuccessEntry`], persisted as `successful_scrapes.json`.
#[derive(Debug, Clone)]
pub struct SuccessIndex {
    path: PathBuf,
    entries: BTreeMap<String, SuccessEntry>,
}

impl SuccessIndex {
    /// Load the index from `output_dir`; a missing file is an empty index.
    #[instrument(level = "info", skip_all, fields(dir = %output_dir.display()))]
    pub async fn load(output_dir: &Path) -> Result<Self, Box<dyn Error>> {
        let path = output_dir.join(SUCCESS_INDEX_FILE);
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(entries = entries.len(), "Loaded success index");
        Ok(Self { path, entries })
    }

    /// Insert or replace the entry for `id`.
    pub fn record(&mut self, id: &str, entry: SuccessEntry) {
        self.entries.insert(id.to_string(), entry);
    }

    /// Forget `id`; called when a previously successful reference fails.
    pub fn remove(&mut self, id: &str) -> Option<SuccessEntry> {
        self.entries.remove(id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&SuccessEntry> {
        self.entries.get(id)
    }

    /// Number of references with an indexed full text.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Rewrite the index file in full.
    ///
    /// # Errors
    ///
    /// Fails when the index cannot be serialized or written.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Err(e) = fs::write(&self.path, json).await {
            error!(error = %e, "Failed to write success index");
            return Err(e.into());
        }
        info!(entries = self.entries.len(), "Wrote success index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::strategy::Strategy;
    use crate::models::{AcquiredVia, ExtractedDocument};

    #[test]
    fn test_entry_from_document() {
        let acquired = AcquiredDocument {
            document: ExtractedDocument::accept("a b c".into(), "https://x/p.pdf", 1).unwrap(),
            via: AcquiredVia::PdfDiscovery(Strategy::Direct),
        };
        let entry = SuccessEntry::new("r_full.md", &acquired);
        assert_eq!(entry.words, 3);
        assert_eq!(entry.bytes, 5);
        assert_eq!(entry.url, "https://x/p.pdf");
        assert_eq!(entry.via, "pdf_discovery/direct");
    }

    #[tokio::test]
    async fn test_round_trip_and_legacy_size_field() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SUCCESS_INDEX_FILE),
            r#"{"old": {"file": "old_full.md", "size": 70000}}"#,
        )
        .unwrap();

        let mut index = SuccessIndex::load(dir.path()).await.unwrap();
        assert_eq!(index.get("old").unwrap().bytes, 70_000);

        index.record(
            "new",
            SuccessEntry {
                file: "new_full.md".into(),
                words: 900,
                bytes: 6_000,
                url: "https://y".into(),
                via: "headful".into(),
                snapshot: Some("new_snapshot.pdf".into()),
            },
        );
        assert!(index.remove("old").is_some());
        index.save().await.unwrap();

        let reloaded = SuccessIndex::load(dir.path()).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("new").unwrap().via, "headful");
        assert_eq!(
            reloaded.get("new").unwrap().snapshot.as_deref(),
            Some("new_snapshot.pdf")
        );
        assert!(index.get("old").is_none());
    }
}
