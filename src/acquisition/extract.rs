//! Content extraction: raw bytes plus a declared kind in, plain text out.
//!
//! Extraction never fails from the caller's point of view. Malformed input
//! yields empty text and an [`ExtractError`] on the returned
//! [`Extraction`]; the word-count check downstream rejects the empty text
//! like any other short document.
//!
//! PDF parsing is CPU-bound; [`extract_owned`] runs it on tokio's blocking
//! pool.

use crate::models::ContentKind;
use scraper::{Html, Node};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, warn};

/// Elements whose text is never part of the readable content.
const NON_CONTENT_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "footer", "header", "aside",
];

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("not a PDF document (missing %PDF- header)")]
    NotPdf,
    #[error("malformed PDF: {0}")]
    MalformedPdf(String),
    #[error("PDF parser panicked: {0}")]
    PdfPanicked(String),
}

/// Extracted text plus the error that emptied it, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub error: Option<ExtractError>,
}

impl Extraction {
    fn ok(text: String) -> Self {
        Self { text, error: None }
    }

    fn failed(error: ExtractError) -> Self {
        warn!(error = %error, "Content extraction failed; treating as empty");
        Self {
            text: String::new(),
            error: Some(error),
        }
    }
}

/// Extract plain text from raw content according to its declared kind.
///
/// # Arguments
///
/// * `kind` - What the fetch strategy says the bytes are
/// * `raw` - The bytes as fetched
///
/// # Returns
///
/// The text, possibly empty, and the error that emptied it if any.
pub fn extract(kind: ContentKind, raw: &[u8]) -> Extraction {
    match kind {
        ContentKind::Html => Extraction::ok(html_to_text(&String::from_utf8_lossy(raw))),
        ContentKind::Pdf => pdf_to_text(raw),
        ContentKind::Text => Extraction::ok(String::from_utf8_lossy(raw).trim().to_string()),
    }
}

/// [`extract`] for owned content, with PDFs parsed on the blocking pool.
pub async fn extract_owned(kind: ContentKind, raw: Vec<u8>) -> Extraction {
    if kind != ContentKind::Pdf {
        return extract(kind, &raw);
    }
    match tokio::task::spawn_blocking(move || pdf_to_text(&raw)).await {
        Ok(extraction) => extraction,
        Err(e) => Extraction::failed(ExtractError::PdfPanicked(e.to_string())),
    }
}

/// Visible text of an HTML document.
///
/// Script, style, navigation, header, footer and aside subtrees are dropped;
/// the remaining text nodes are joined with single spaces.
pub fn html_to_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_CONTENT_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        words.extend(text.split_whitespace());
    }

    debug!(words = words.len(), "Extracted text from HTML");
    words.join(" ")
}

/// Text of a PDF document, pages concatenated in order.
pub fn pdf_to_text(bytes: &[u8]) -> Extraction {
    let body = skip_leading_whitespace(bytes);
    if !body.starts_with(PDF_MAGIC) {
        return Extraction::failed(ExtractError::NotPdf);
    }

    let parsed = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(body)));
    match parsed {
        Ok(Ok(text)) => {
            let text = text.trim().to_string();
            debug!(bytes = bytes.len(), chars = text.len(), "Extracted text from PDF");
            Extraction::ok(text)
        }
        Ok(Err(e)) => Extraction::failed(ExtractError::MalformedPdf(e.to_string())),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Extraction::failed(ExtractError::PdfPanicked(message))
        }
    }
}

fn skip_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Whether a byte stream looks like a PDF regardless of what the server said.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    skip_leading_whitespace(bytes).starts_with(PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::testing::pdf_bytes;

    #[test]
    fn test_html_drops_non_content_elements() {
        let html = r#"
            <html>
              <head><title>Paper</title><style>body { color: red }</style></head>
              <body>
                <header>Site banner</header>
                <nav><a href="/">Home</a></nav>
                <main><h1>Results</h1><p>Yield   increased
                   by <b>12%</b>.</p></main>
                <aside>Related links</aside>
                <script>var tracking = 1;</script>
                <footer>Copyright</footer>
              </body>
            </html>"#;
        let text = html_to_text(html);
        assert_eq!(text, "Results Yield increased by 12% .");
    }

    #[test]
    fn test_html_tolerates_garbage() {
        assert!(html_to_text("<<<>>> <p>unclosed <div").ends_with("unclosed"));
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_extract_text_kind_passes_through_trimmed() {
        let extraction = extract(ContentKind::Text, b"  already plain text \n");
        assert_eq!(extraction.text, "already plain text");
        assert!(extraction.error.is_none());
    }

    #[test]
    fn test_extract_html_handles_invalid_utf8() {
        let extraction = extract(ContentKind::Html, b"<p>caf\xe9 au lait</p>");
        assert!(extraction.text.contains("au lait"));
        assert!(extraction.error.is_none());
    }

    #[test]
    fn test_pdf_rejects_non_pdf_bytes() {
        let extraction = extract(ContentKind::Pdf, b"<html>not a pdf</html>");
        assert_eq!(extraction.text, "");
        assert_eq!(extraction.error, Some(ExtractError::NotPdf));
    }

    #[test]
    fn test_pdf_truncated_document_is_contained() {
        let extraction = pdf_to_text(b"%PDF-1.7\n1 0 obj << /Type /Catalog");
        assert_eq!(extraction.text, "");
        assert!(matches!(
            extraction.error,
            Some(ExtractError::MalformedPdf(_)) | Some(ExtractError::PdfPanicked(_))
        ));
    }

    #[test]
    fn test_pdf_pages_come_out_in_order() {
        let pdf = pdf_bytes(&["Alpha opens the first page", "Omega closes the second page"]);
        let extraction = pdf_to_text(&pdf);
        assert!(extraction.error.is_none(), "{:?}", extraction.error);

        let alpha = extraction.text.find("Alpha").expect("first page text");
        let omega = extraction.text.find("Omega").expect("second page text");
        assert!(alpha < omega);
        assert!(extraction.text.contains("second page"));
    }

    #[tokio::test]
    async fn test_extract_owned_parses_pdf_off_the_runtime() {
        let pdf = pdf_bytes(&["Blocking pool text"]);
        let extraction = extract_owned(ContentKind::Pdf, pdf).await;
        assert!(extraction.text.contains("Blocking pool text"));

        let html = extract_owned(ContentKind::Html, b"<p>inline</p>".to_vec()).await;
        assert_eq!(html.text, "inline");
    }

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf(b"%PDF-1.4 rest"));
        assert!(looks_like_pdf(b"\r\n %PDF-1.4"));
        assert!(!looks_like_pdf(b"<!doctype html>"));
    }
}
