//! Shared Chromium runtime for the headless and headful strategies.
//!
//! Both browsers are launched once, before the batch starts; a browser that
//! will not start is a setup error, never a per-request failure. Every render runs in
//! a freshly created CDP browser context, so cookies and storage never leak
//! between requests, and the context is disposed when the render finishes.

use crate::acquisition::identity::{random_desktop_user_agent, random_user_agent};
use crate::acquisition::strategy::{FetchFailure, RenderedPage};
use crate::config::BrowserSettings;
use crate::utils::word_count;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, PrintToPdfParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, instrument, warn};

/// Consent buttons tried in order; the first one that clicks wins.
const CONSENT_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button[id*='accept']",
    "button[class*='accept']",
    "a[id*='accept']",
    "a[class*='accept']",
];

/// Containers tried by the headful selection cascade after the full page.
const MAIN_CONTENT_SELECTORS: &[&str] = &["main", "article", "#content", ".content"];

/// Words a selection heuristic must exceed to end the cascade early.
const SELECTION_WORD_THRESHOLD: usize = 100;

const QUIESCENCE_POLL: Duration = Duration::from_millis(250);

/// Masks the usual automation fingerprints before any page script runs.
const STEALTH_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    window.chrome = { runtime: {} };
"#;

const PARAGRAPHS_JS: &str =
    "Array.from(document.querySelectorAll('p')).map(p => p.innerText).join('\\n')";

/// A rendered page plus what the browser thinks its content type is.
#[derive(Debug, Clone)]
pub struct BrowserRender {
    pub page: RenderedPage,
    /// `document.contentType`, e.g. `text/html` or `application/pdf`.
    pub content_type: String,
}

impl BrowserRender {
    pub fn is_pdf(&self) -> bool {
        self.content_type.contains("application/pdf")
    }
}

/// What the headful strategy read off a page.
#[derive(Debug, Clone)]
pub struct HeadfulRender {
    /// Main text picked by the selection cascade.
    pub text: String,
    pub final_url: String,
    /// The page printed to PDF, when the browser could print it.
    pub snapshot: Option<Vec<u8>>,
}

struct LaunchedBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// A page living in its own browser context.
struct IsolatedPage {
    page: Page,
    context_id: BrowserContextId,
}

/// Find a Chrome/Chromium executable: configured path first, then `PATH`.
pub fn find_chrome(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.clone());
        }
        warn!(path = %path.display(), "Configured Chrome executable does not exist; searching PATH");
    }

    ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}

pub struct BrowserRuntime {
    settings: BrowserSettings,
    headless: LaunchedBrowser,
    /// Present iff `settings.headful`.
    headful: Option<LaunchedBrowser>,
}

impl BrowserRuntime {
    /// Launch the shared headless browser, and the headful one when
    /// `settings.headful` is set.
    ///
    /// # Arguments
    ///
    /// * `settings` - Browser settings; `chrome_executable` is tried before `PATH`
    ///
    /// # Errors
    ///
    /// Fails when Chrome cannot be found or either browser refuses to start.
    /// Nothing is left running on failure.
    #[instrument(level = "info", skip_all)]
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, Box<dyn Error>> {
        let executable = find_chrome(settings.chrome_executable.as_ref());
        match &executable {
            Some(path) => info!(executable = %path.display(), "Launching headless browser"),
            None => info!("No Chrome on PATH; letting the driver locate one"),
        }

        let mut headless = launch_browser(executable.as_ref(), settings, false)
            .await
            .map_err(|e| format!("headless browser: {e}; pass --chrome or use --no-browser"))?;

        let headful = if settings.headful {
            info!("Launching headful browser");
            match launch_browser(executable.as_ref(), settings, true).await {
                Ok(launched) => Some(launched),
                Err(e) => {
                    shut_down(&mut headless, "headless").await;
                    return Err(format!(
                        "headful browser: {e}; use --no-headful on hosts without a display"
                    )
                    .into());
                }
            }
        } else {
            None
        };

        Ok(Self {
            settings: settings.clone(),
            headless,
            headful,
        })
    }

    /// Whether the headful strategy can run.
    pub fn has_headful(&self) -> bool {
        self.headful.is_some()
    }

    /// Load `url` headlessly, dismiss any consent overlay, and serialize the DOM.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn render_headless(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<BrowserRender, FetchFailure> {
        let browser = &self.headless.browser;
        let isolated = open_isolated(browser, &self.settings, random_user_agent(), false).await?;
        let result = self.load_and_serialize(&isolated.page, url, timeout).await;
        close_isolated(browser, isolated).await;
        result
    }

    /// Load `url` in the visible browser, read and scroll like a person, then
    /// pick the page's main text with the selection cascade and print the
    /// page to PDF.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn render_headful_text(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<HeadfulRender, FetchFailure> {
        let Some(launched) = &self.headful else {
            return Err(FetchFailure::Unavailable(
                "headful browser disabled".to_string(),
            ));
        };
        let browser = &launched.browser;
        let isolated =
            open_isolated(browser, &self.settings, random_desktop_user_agent(), true).await?;
        let result = self.read_like_a_person(&isolated.page, url, timeout).await;
        close_isolated(browser, isolated).await;
        result
    }

    async fn load_and_serialize(
        &self,
        page: &Page,
        url: &str,
        budget: Duration,
    ) -> Result<BrowserRender, FetchFailure> {
        navigate(page, url, budget).await?;
        dismiss_cookie_consent(page, self.consent_timeout()).await;

        let html = page.content().await.map_err(navigation_failure)?;
        let final_url = current_url(page, url).await;
        let content_type = evaluate_string(page, "document.contentType")
            .await
            .unwrap_or_default()
            .to_ascii_lowercase();

        Ok(BrowserRender {
            page: RenderedPage { html, final_url },
            content_type,
        })
    }

    async fn read_like_a_person(
        &self,
        page: &Page,
        url: &str,
        budget: Duration,
    ) -> Result<HeadfulRender, FetchFailure> {
        navigate(page, url, budget).await?;
        dismiss_cookie_consent(page, self.consent_timeout()).await;

        let reading = self.settings.reading_delay.sample();
        debug!(?reading, "Simulating reading time");
        sleep(reading).await;

        let steps = self.settings.scroll_steps.sample();
        let pause = self.settings.scroll_pause.sample();
        for step in 0..steps {
            if let Err(e) = page.evaluate("window.scrollBy(0, window.innerHeight / 2)").await {
                warn!(step, error = %e, "Scroll step failed");
            }
            sleep(pause).await;
        }
        debug!(steps, "Finished scrolling");

        let text = select_main_text(page).await;
        let snapshot = print_snapshot(page).await;
        Ok(HeadfulRender {
            text,
            final_url: current_url(page, url).await,
            snapshot,
        })
    }

    fn consent_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.cookie_consent_timeout_ms)
    }

    /// Close both browsers and stop their handler tasks.
    pub async fn close(mut self) {
        shut_down(&mut self.headless, "headless").await;
        if let Some(launched) = self.headful.as_mut() {
            shut_down(launched, "headful").await;
        }
        info!("Browser runtime closed");
    }
}

impl Drop for BrowserRuntime {
    fn drop(&mut self) {
        self.headless.handler.abort();
        if let Some(launched) = &self.headful {
            launched.handler.abort();
        }
    }
}

async fn shut_down(launched: &mut LaunchedBrowser, mode: &str) {
    if let Err(e) = launched.browser.close().await {
        warn!(mode, error = %e, "Failed to close browser");
    }
    launched.handler.abort();
}

async fn launch_browser(
    executable: Option<&PathBuf>,
    settings: &BrowserSettings,
    headful: bool,
) -> Result<LaunchedBrowser, Box<dyn Error>> {
    let profile = std::env::temp_dir().join(format!(
        "paper_harvest-{}-{}",
        if headful { "headful" } else { "headless" },
        std::process::id()
    ));

    let mut builder = BrowserConfig::builder().user_data_dir(profile);
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }
    builder = builder
        .window_size(settings.viewport_width, settings.viewport_height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--no-first-run");
    if headful {
        builder = builder
            .with_head()
            .arg("--disable-blink-features=AutomationControlled");
    }
    let config = builder
        .build()
        .map_err(|e| format!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config).await?;
    let handler = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!(error = %e, "Browser handler event error");
            }
        }
    });

    Ok(LaunchedBrowser { browser, handler })
}

async fn open_isolated(
    browser: &Browser,
    settings: &BrowserSettings,
    user_agent: &str,
    stealth: bool,
) -> Result<IsolatedPage, FetchFailure> {
    let context_id = browser
        .execute(CreateBrowserContextParams::default())
        .await
        .map_err(navigation_failure)?
        .result
        .browser_context_id;

    let mut target = CreateTargetParams::new("about:blank");
    target.browser_context_id = Some(context_id.clone());
    let page = match browser.new_page(target).await {
        Ok(page) => page,
        Err(e) => {
            dispose_context(browser, context_id).await;
            return Err(navigation_failure(e));
        }
    };
    let isolated = IsolatedPage { page, context_id };

    if let Err(e) = prepare_page(&isolated.page, settings, user_agent, stealth).await {
        close_isolated(browser, isolated).await;
        return Err(navigation_failure(e));
    }
    Ok(isolated)
}

async fn prepare_page(
    page: &Page,
    settings: &BrowserSettings,
    user_agent: &str,
    stealth: bool,
) -> Result<(), CdpError> {
    page.set_user_agent(user_agent).await?;
    page.execute(SetDeviceMetricsOverrideParams::new(
        settings.viewport_width as i64,
        settings.viewport_height as i64,
        1.0,
        false,
    ))
    .await?;
    if stealth {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
            .await?;
    }
    Ok(())
}

async fn close_isolated(browser: &Browser, isolated: IsolatedPage) {
    let IsolatedPage { page, context_id } = isolated;
    if let Err(e) = page.close().await {
        debug!(error = %e, "Failed to close page");
    }
    dispose_context(browser, context_id).await;
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!(error = %e, "Failed to dispose browser context");
    }
}

/// Navigate and wait for the network to go quiet, all within `budget`.
async fn navigate(page: &Page, url: &str, budget: Duration) -> Result<(), FetchFailure> {
    let deadline = Instant::now() + budget;
    let loaded = timeout(budget, async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<(), CdpError>(())
    })
    .await;

    match loaded {
        Err(_) => return Err(FetchFailure::Timeout(budget)),
        Ok(Err(e)) => return Err(navigation_failure(e)),
        Ok(Ok(())) => {}
    }

    wait_for_quiescence(page, deadline).await;
    Ok(())
}

/// Poll the resource timing buffer until its size holds still for two polls.
///
/// Hitting the deadline is not an error; the page is used as it stands.
async fn wait_for_quiescence(page: &Page, deadline: Instant) {
    let mut last = None;
    let mut stable_polls = 0;

    while Instant::now() < deadline {
        let count = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|r| r.into_value::<u64>().ok());

        if count.is_some() && count == last {
            stable_polls += 1;
            if stable_polls >= 2 {
                debug!(resources = count, "Network quiescent");
                return;
            }
        } else {
            stable_polls = 0;
            last = count;
        }
        sleep(QUIESCENCE_POLL).await;
    }
    debug!("Quiescence wait hit the deadline");
}

/// Best-effort click on a consent button. Never fails.
async fn dismiss_cookie_consent(page: &Page, per_selector: Duration) -> bool {
    for selector in CONSENT_SELECTORS {
        let clicked = timeout(per_selector, async {
            let element = page.find_element(*selector).await?;
            element.click().await?;
            Ok::<(), CdpError>(())
        })
        .await;

        if let Ok(Ok(())) = clicked {
            debug!(selector, "Dismissed cookie consent overlay");
            sleep(Duration::from_secs(1)).await;
            return true;
        }
    }
    false
}

/// Headful selection cascade: whole body, then a main-content container,
/// then concatenated paragraphs. The first candidate over
/// [`SELECTION_WORD_THRESHOLD`] words wins; otherwise the longest is kept.
async fn select_main_text(page: &Page) -> String {
    let mut candidates = Vec::new();

    if let Some(body) = evaluate_string(page, "document.body ? document.body.innerText : ''").await
    {
        candidates.push(("body", body));
    }

    for selector in MAIN_CONTENT_SELECTORS {
        if let Ok(element) = page.find_element(*selector).await {
            if let Ok(Some(text)) = element.inner_text().await {
                candidates.push((*selector, text));
                break;
            }
        }
    }

    if let Some(paragraphs) = evaluate_string(page, PARAGRAPHS_JS).await {
        candidates.push(("p", paragraphs));
    }

    pick_selection(candidates)
}

fn pick_selection(candidates: Vec<(&str, String)>) -> String {
    if let Some(pos) = candidates
        .iter()
        .position(|(_, text)| word_count(text) > SELECTION_WORD_THRESHOLD)
    {
        let (heuristic, text) = candidates.into_iter().nth(pos).unwrap_or_default();
        debug!(heuristic, words = word_count(&text), "Selection heuristic accepted");
        return text;
    }
    candidates
        .into_iter()
        .map(|(_, text)| text)
        .max_by_key(|text| word_count(text))
        .unwrap_or_default()
}

/// Print the page as a surrogate PDF. Printing is best-effort.
async fn print_snapshot(page: &Page) -> Option<Vec<u8>> {
    let params = PrintToPdfParams {
        print_background: Some(true),
        ..Default::default()
    };
    match page.pdf(params).await {
        Ok(bytes) => {
            debug!(bytes = bytes.len(), "Printed page snapshot");
            Some(bytes)
        }
        Err(e) => {
            warn!(error = %e, "Could not print page snapshot");
            None
        }
    }
}

async fn evaluate_string(page: &Page, script: &str) -> Option<String> {
    page.evaluate(script)
        .await
        .ok()
        .and_then(|r| r.into_value::<String>().ok())
}

async fn current_url(page: &Page, fallback: &str) -> String {
    page.url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| fallback.to_string())
}

fn navigation_failure(e: CdpError) -> FetchFailure {
    match e {
        CdpError::Timeout => FetchFailure::Navigation("browser command timed out".to_string()),
        other => FetchFailure::Navigation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    #[test]
    fn test_selection_prefers_first_over_threshold() {
        let picked = pick_selection(vec![
            ("body", words(150)),
            ("main", words(400)),
            ("p", words(120)),
        ]);
        assert_eq!(word_count(&picked), 150);
    }

    #[test]
    fn test_selection_skips_short_candidates() {
        let picked = pick_selection(vec![("body", words(20)), ("main", words(101))]);
        assert_eq!(word_count(&picked), 101);
    }

    #[test]
    fn test_selection_falls_back_to_longest() {
        let picked = pick_selection(vec![
            ("body", words(30)),
            ("main", words(90)),
            ("p", words(60)),
        ]);
        assert_eq!(word_count(&picked), 90);
        assert_eq!(pick_selection(Vec::new()), "");
    }

    #[test]
    fn test_find_chrome_ignores_missing_configured_path() {
        let missing = PathBuf::from("/definitely/not/a/chrome");
        if let Some(found) = find_chrome(Some(&missing)) {
            assert_ne!(found, missing);
        }
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_error() {
        // Exists but is not executable, so spawning Chrome fails outright.
        let not_chrome = tempfile::NamedTempFile::new().unwrap();
        let settings = BrowserSettings {
            chrome_executable: Some(not_chrome.path().to_path_buf()),
            headful: true,
            ..BrowserSettings::default()
        };
        assert!(BrowserRuntime::launch(&settings).await.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Chrome/Chromium to be installed
    async fn test_headful_launched_only_when_enabled() {
        let settings = BrowserSettings {
            headful: false,
            ..BrowserSettings::default()
        };
        let runtime = BrowserRuntime::launch(&settings).await.unwrap();
        assert!(!runtime.has_headful());
        let err = runtime
            .render_headful_text("data:text/html,<p>x</p>", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchFailure::Unavailable(_)));
        runtime.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires Chrome/Chromium to be installed
    async fn test_headless_render_of_data_url() {
        let settings = BrowserSettings {
            headful: false,
            ..BrowserSettings::default()
        };
        let runtime = BrowserRuntime::launch(&settings).await.unwrap();
        let render = runtime
            .render_headless(
                "data:text/html,<main><h1>Hello</h1><p>World</p></main>",
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert!(render.page.html.contains("<h1>Hello</h1>"));
        assert!(!render.is_pdf());
        runtime.close().await;
    }
}
