//! In-memory [`FetchBackend`] for driving escalation, discovery and the
//! orchestrator without a network or a browser.

use crate::acquisition::strategy::{FetchBackend, FetchFailure, RenderedPage, Strategy};
use crate::models::{ContentKind, FetchResult};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type Reply = Result<FetchResult, FetchFailure>;

/// Replies are scripted per (strategy, url). A sequence is consumed one reply
/// per attempt and its last reply repeats; unscripted pairs fail with a
/// transport error.
pub struct ScriptedBackend {
    strategies: Vec<Strategy>,
    replies: RefCell<HashMap<(Strategy, String), VecDeque<Reply>>>,
    pages: RefCell<HashMap<String, String>>,
    calls: RefCell<Vec<(Strategy, String)>>,
    timeouts: RefCell<Vec<Duration>>,
    renders: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(strategies: &[Strategy]) -> Self {
        Self {
            strategies: strategies.to_vec(),
            replies: RefCell::default(),
            pages: RefCell::default(),
            calls: RefCell::default(),
            timeouts: RefCell::default(),
            renders: RefCell::default(),
        }
    }

    pub fn reply(&self, strategy: Strategy, url: &str, reply: Reply) {
        self.reply_sequence(strategy, url, vec![reply]);
    }

    pub fn reply_sequence(&self, strategy: Strategy, url: &str, replies: Vec<Reply>) {
        self.replies
            .borrow_mut()
            .insert((strategy, url.to_string()), replies.into());
    }

    /// Same reply for every strategy.
    pub fn reply_all(&self, url: &str, reply: Reply) {
        for strategy in self.strategies.clone() {
            self.reply(strategy, url, reply.clone());
        }
    }

    /// HTML returned by `render_for_links` for `url`.
    pub fn page(&self, url: &str, html: &str) {
        self.pages
            .borrow_mut()
            .insert(url.to_string(), html.to_string());
    }

    pub fn calls(&self) -> Vec<(Strategy, String)> {
        self.calls.borrow().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.borrow().clone()
    }

    pub fn renders(&self) -> Vec<String> {
        self.renders.borrow().clone()
    }
}

impl FetchBackend for ScriptedBackend {
    fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchResult, FetchFailure> {
        self.calls.borrow_mut().push((strategy, url.to_string()));
        self.timeouts.borrow_mut().push(timeout);
        tokio::task::yield_now().await;

        let mut replies = self.replies.borrow_mut();
        match replies.get_mut(&(strategy, url.to_string())) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(FetchFailure::Transport("empty script".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchFailure::Transport("empty script".into()))),
            None => Err(FetchFailure::Transport(format!("unscripted: {strategy} {url}"))),
        }
    }

    async fn render_for_links(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> Result<RenderedPage, FetchFailure> {
        self.renders.borrow_mut().push(url.to_string());
        match self.pages.borrow().get(url) {
            Some(html) => Ok(RenderedPage {
                html: html.clone(),
                final_url: url.to_string(),
            }),
            None => Err(FetchFailure::Navigation(format!("no page scripted for {url}"))),
        }
    }
}

/// An HTML page with `words` words of body text.
pub fn html_words(words: usize, url: &str) -> FetchResult {
    FetchResult {
        raw_content: format!("<html><body><p>{}</p></body></html>", vec!["lorem"; words].join(" "))
            .into_bytes(),
        declared_kind: ContentKind::Html,
        source_url: url.to_string(),
        snapshot: None,
    }
}

/// Plain text with `words` words, as a headful render or parsed PDF would give.
pub fn text_words(words: usize, url: &str) -> FetchResult {
    FetchResult {
        raw_content: vec!["ipsum"; words].join(" ").into_bytes(),
        declared_kind: ContentKind::Text,
        source_url: url.to_string(),
        snapshot: None,
    }
}

/// A one-page PDF with `words` words of text.
pub fn pdf_words(words: usize, url: &str) -> FetchResult {
    FetchResult {
        raw_content: pdf_bytes(&[&vec!["dolor"; words].join(" ")]),
        declared_kind: ContentKind::Pdf,
        source_url: url.to_string(),
        snapshot: None,
    }
}

/// A minimal PDF with one page per entry of `pages`, each showing its text
/// in Helvetica. Object offsets in the xref table are computed, so the file
/// parses without repair.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + 2 * i
        ));
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref = out.len();
    let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        table.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.extend_from_slice(table.as_bytes());
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}
