//! Full-text files, one per successful reference, plus the printed page
//! snapshot when the headful strategy captured one.

use crate::models::AcquiredDocument;
use crate::utils::clean_reference_name;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// File name of the full text for reference `id`.
pub fn full_text_file_name(id: &str) -> String {
    format!("{}_full.md", clean_reference_name(id))
}

/// File name of the surrogate PDF for reference `id`.
pub fn snapshot_file_name(id: &str) -> String {
    format!("{}_snapshot.pdf", clean_reference_name(id))
}

/// Write the accepted text of reference `id`, replacing any earlier version.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(%id))]
pub async fn write_full_text(
    output_dir: &Path,
    id: &str,
    acquired: &AcquiredDocument,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = output_dir.join(full_text_file_name(id));
    fs::write(&path, acquired.document.text()).await?;
    info!(
        path = %path.display(),
        words = acquired.document.word_count(),
        via = %acquired.via,
        "Wrote full text"
    );
    Ok(path)
}

/// Write the printed page captured with the accepted text, if there is one.
///
/// # Returns
///
/// The path written, or `None` when the document carries no snapshot.
#[instrument(level = "info", skip_all, fields(%id))]
pub async fn write_snapshot(
    output_dir: &Path,
    id: &str,
    acquired: &AcquiredDocument,
) -> Result<Option<PathBuf>, Box<dyn Error>> {
    let Some(snapshot) = acquired.document.snapshot() else {
        return Ok(None);
    };
    let path = output_dir.join(snapshot_file_name(id));
    fs::write(&path, snapshot).await?;
    info!(path = %path.display(), bytes = snapshot.len(), "Wrote page snapshot");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::strategy::Strategy;
    use crate::models::{AcquiredVia, ExtractedDocument};

    #[test]
    fn test_file_name_is_cleaned() {
        assert_eq!(full_text_file_name("smith2020"), "smith2020_full.md");
        assert_eq!(full_text_file_name("a/b:c"), "a_b_c_full.md");
    }

    #[tokio::test]
    async fn test_write_full_text() {
        let dir = tempfile::tempdir().unwrap();
        let acquired = AcquiredDocument {
            document: ExtractedDocument::accept("one two three".into(), "https://x", 3).unwrap(),
            via: AcquiredVia::Strategy(Strategy::Headless),
        };
        let path = write_full_text(dir.path(), "ref", &acquired).await.unwrap();
        assert_eq!(path, dir.path().join("ref_full.md"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "one two three");
    }

    #[tokio::test]
    async fn test_write_snapshot_only_when_captured() {
        let dir = tempfile::tempdir().unwrap();
        let document = ExtractedDocument::accept("one two three".into(), "https://x", 3).unwrap();
        let plain = AcquiredDocument {
            document: document.clone(),
            via: AcquiredVia::Strategy(Strategy::Direct),
        };
        assert_eq!(write_snapshot(dir.path(), "ref", &plain).await.unwrap(), None);
        assert!(!dir.path().join("ref_snapshot.pdf").exists());

        let printed = AcquiredDocument {
            document: document.with_snapshot(Some(b"%PDF-1.4".to_vec())),
            via: AcquiredVia::Strategy(Strategy::Headful),
        };
        let path = write_snapshot(dir.path(), "ref", &printed).await.unwrap().unwrap();
        assert_eq!(path, dir.path().join(snapshot_file_name("ref")));
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.4");
    }
}
