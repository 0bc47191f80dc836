//! Manual-entry stubs for references that could not be acquired.
//!
//! Each stub names the reference, its title and original links, followed by
//! a separator line under which a human pastes the text.

use crate::ledger::FailureLedger;
use crate::models::ReferenceRecord;
use crate::utils::clean_reference_name;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

pub const MANUAL_ENTRY_DIR: &str = "manual_entry";

/// Render the stub for one failed reference.
pub fn manual_entry_stub(id: &str, title: Option<&str>, links: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Reference: {id}");
    let _ = writeln!(out, "Title: {}", title.unwrap_or("Title not available"));
    let _ = writeln!(out, "Original links:");
    for link in links {
        let _ = writeln!(out, "- {link}");
    }
    let _ = writeln!(out, "\nPlease enter the reference content below this line:");
    let _ = writeln!(out, "{}", "=".repeat(50));
    out
}

/// Write one stub per ledger entry into `<output_dir>/manual_entry/`.
///
/// Titles come from `references` when the entry is still listed there.
/// Returns the paths written.
#[instrument(level = "info", skip_all, fields(dir = %output_dir.display(), entries = ledger.len()))]
pub async fn write_manual_entries(
    output_dir: &Path,
    ledger: &FailureLedger,
    references: &BTreeMap<String, ReferenceRecord>,
) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let dir = output_dir.join(MANUAL_ENTRY_DIR);
    fs::create_dir_all(&dir).await?;

    let mut written = Vec::with_capacity(ledger.len());
    for (id, record) in ledger.iter() {
        let title = references.get(id).and_then(|r| r.title.as_deref());
        let path = dir.join(format!("{}_manual.txt", clean_reference_name(id)));
        fs::write(&path, manual_entry_stub(id, title, &record.links)).await?;
        info!(path = %path.display(), "Created manual entry file");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_layout() {
        let stub = manual_entry_stub(
            "doe2018",
            None,
            &["https://a".to_string(), "10.1/b".to_string()],
        );
        assert!(stub.starts_with("Reference: doe2018\nTitle: Title not available\n"));
        assert!(stub.contains("- https://a\n- 10.1/b\n"));
        assert!(stub.ends_with(&format!("{}\n", "=".repeat(50))));
    }

    #[tokio::test]
    async fn test_writes_one_stub_per_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = FailureLedger::empty(dir.path());
        ledger.record_failure("doe2018", &["https://a".to_string()], "exhausted");
        ledger.record_failure("roe2021", &["https://b".to_string()], "exhausted");

        let mut references = BTreeMap::new();
        references.insert(
            "doe2018".to_string(),
            ReferenceRecord {
                links: vec!["https://a".to_string()],
                title: Some("Water use efficiency".to_string()),
            },
        );

        let written = write_manual_entries(dir.path(), &ledger, &references)
            .await
            .unwrap();
        assert_eq!(written.len(), 2);

        let doe = std::fs::read_to_string(dir.path().join("manual_entry/doe2018_manual.txt")).unwrap();
        assert!(doe.contains("Title: Water use efficiency"));
        assert!(dir.path().join("manual_entry/roe2021_manual.txt").exists());
    }
}
