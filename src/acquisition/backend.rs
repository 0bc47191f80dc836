//! The production [`FetchBackend`]: a shared HTTP client plus an optional
//! shared browser runtime.

use crate::acquisition::browser::BrowserRuntime;
use crate::acquisition::direct::{DirectFetcher, path_ends_with_pdf};
use crate::acquisition::strategy::{FetchBackend, FetchFailure, RenderedPage, Strategy};
use crate::models::{ContentKind, FetchResult};
use std::time::Duration;
use tracing::{debug, info};

pub struct LiveBackend {
    direct: DirectFetcher,
    browser: Option<BrowserRuntime>,
    strategies: Vec<Strategy>,
}

impl LiveBackend {
    /// `strategies` is filtered down to what can actually run: without a
    /// browser runtime only [`Strategy::Direct`] remains, and
    /// [`Strategy::Headful`] needs a runtime that launched a visible browser.
    pub fn new(
        direct: DirectFetcher,
        browser: Option<BrowserRuntime>,
        strategies: Vec<Strategy>,
    ) -> Self {
        let strategies: Vec<Strategy> = strategies
            .into_iter()
            .filter(|s| match s {
                Strategy::Direct => true,
                Strategy::Headless => browser.is_some(),
                Strategy::Headful => browser.as_ref().is_some_and(BrowserRuntime::has_headful),
            })
            .collect();
        info!(strategies = ?strategies, "Fetch backend ready");
        Self {
            direct,
            browser,
            strategies,
        }
    }

    fn browser(&self, strategy: Strategy) -> Result<&BrowserRuntime, FetchFailure> {
        self.browser
            .as_ref()
            .ok_or_else(|| FetchFailure::Unavailable(format!("{strategy}: no browser runtime")))
    }

    async fn headless(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchFailure> {
        let render = self.browser(Strategy::Headless)?.render_headless(url, timeout).await?;

        if render.is_pdf() || path_ends_with_pdf(url) || path_ends_with_pdf(&render.page.final_url)
        {
            debug!(%url, final_url = %render.page.final_url, "Browser landed on a PDF; downloading directly");
            let bytes = self.direct.download(&render.page.final_url, timeout).await?;
            return Ok(FetchResult {
                raw_content: bytes,
                declared_kind: ContentKind::Pdf,
                source_url: render.page.final_url,
                snapshot: None,
            });
        }

        Ok(FetchResult {
            raw_content: render.page.html.into_bytes(),
            declared_kind: ContentKind::Html,
            source_url: render.page.final_url,
            snapshot: None,
        })
    }

    async fn headful(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchFailure> {
        let render = self
            .browser(Strategy::Headful)?
            .render_headful_text(url, timeout)
            .await?;
        Ok(FetchResult {
            raw_content: render.text.into_bytes(),
            declared_kind: ContentKind::Text,
            source_url: render.final_url,
            snapshot: render.snapshot,
        })
    }

    /// Shut the browser down, if one was launched.
    pub async fn close(self) {
        if let Some(browser) = self.browser {
            browser.close().await;
        }
    }
}

impl FetchBackend for LiveBackend {
    fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        url: &str,
        timeout: Duration,
    ) -> Result<FetchResult, FetchFailure> {
        match strategy {
            Strategy::Direct => self.direct.fetch(url, timeout).await,
            Strategy::Headless => self.headless(url, timeout).await,
            Strategy::Headful => self.headful(url, timeout).await,
        }
    }

    async fn render_for_links(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<RenderedPage, FetchFailure> {
        if let Some(browser) = &self.browser {
            return Ok(browser.render_headless(url, timeout).await?.page);
        }

        // Without a browser the raw HTML is the best view of the page we have.
        let fetched = self.direct.fetch(url, timeout).await?;
        if fetched.declared_kind == ContentKind::Pdf {
            return Err(FetchFailure::Unavailable(
                "page is itself a PDF; no links to discover".to_string(),
            ));
        }
        Ok(RenderedPage {
            html: String::from_utf8_lossy(&fetched.raw_content).into_owned(),
            final_url: fetched.source_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportRetry;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_only() -> LiveBackend {
        let direct = DirectFetcher::new(TransportRetry {
            attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        })
        .unwrap();
        LiveBackend::new(direct, None, Strategy::ALL.to_vec())
    }

    #[test]
    fn test_strategies_without_browser_are_direct_only() {
        assert_eq!(http_only().strategies(), &[Strategy::Direct]);
    }

    #[tokio::test]
    async fn test_browser_strategies_are_unavailable_without_runtime() {
        let err = http_only()
            .attempt(Strategy::Headless, "http://127.0.0.1:9", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_render_for_links_falls_back_to_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="/paper.pdf">PDF</a>"#),
            )
            .mount(&server)
            .await;

        let page = http_only()
            .render_for_links(&server.uri(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(page.html.contains("paper.pdf"));
        assert!(page.final_url.starts_with(&server.uri()));
    }
}
