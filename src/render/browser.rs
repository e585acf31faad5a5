use async_trait::async_trait;
use playwright::api::{Browser, ElementHandle, Page, Viewport};
use playwright::Playwright;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::user_agent::UserAgentRotator;
use super::{RenderEngine, RenderSession};
use crate::config::HttpConfig;
use crate::error::{HarvestError, HarvestResult};

/// Headless Chromium engine using Playwright
pub struct BrowserEngine {
    playwright: Playwright,
    user_agents: UserAgentRotator,
    navigation_timeout: Duration,
}

impl BrowserEngine {
    pub async fn new(config: &HttpConfig) -> HarvestResult<Self> {
        debug!("Initializing browser engine");

        let playwright = Playwright::initialize()
            .await
            .map_err(|e| HarvestError::render(format!("playwright init failed: {}", e)))?;

        Ok(Self {
            playwright,
            user_agents: UserAgentRotator::new(&config.user_agents),
            navigation_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    async fn open_page(&self, browser: &Browser) -> HarvestResult<Page> {
        let context = browser
            .context_builder()
            .user_agent(self.user_agents.random())
            .viewport(Some(Viewport { width: 1920, height: 1080 }))
            .build()
            .await
            .map_err(render_error)?;

        let page = context.new_page().await.map_err(render_error)?;
        page.set_default_timeout(self.navigation_timeout.as_millis() as u32)
            .await
            .map_err(render_error)?;

        Ok(page)
    }
}

fn render_error(e: impl std::fmt::Display) -> HarvestError {
    HarvestError::render(e.to_string())
}

#[async_trait]
impl RenderEngine for BrowserEngine {
    type Session = BrowserSession;

    async fn new_session(&self) -> HarvestResult<Self::Session> {
        let args = vec!["--disable-blink-features=AutomationControlled".to_string()];
        let browser = self
            .playwright
            .chromium()
            .launcher()
            .headless(true)
            .args(&args)
            .launch()
            .await
            .map_err(render_error)?;

        match self.open_page(&browser).await {
            Ok(page) => Ok(BrowserSession { browser, page }),
            Err(e) => {
                // The process is already running; shut it down before reporting
                if let Err(close_error) = browser.close().await {
                    warn!("Failed to close browser after setup error: {}", close_error);
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

/// One browser process with a single page
pub struct BrowserSession {
    browser: Browser,
    page: Page,
}

#[async_trait]
impl RenderSession for BrowserSession {
    type Element = ElementHandle;

    async fn open(&mut self, url: &Url) -> HarvestResult<()> {
        self.page
            .goto_builder(url.as_str())
            .goto()
            .await
            .map_err(|e| HarvestError::page_load(url.as_str(), e.to_string()))?;
        Ok(())
    }

    async fn page_source(&mut self) -> HarvestResult<String> {
        self.page.content().await.map_err(render_error)
    }

    async fn wait_for_element(
        &mut self,
        locator: &str,
        timeout: Duration,
    ) -> HarvestResult<Option<Self::Element>> {
        match self
            .page
            .wait_for_selector_builder(locator)
            .timeout(timeout.as_millis() as f64)
            .wait_for_selector()
            .await
        {
            Ok(element) => Ok(element),
            Err(e) if e.to_string().contains("Timeout") => {
                Err(HarvestError::timeout(format!("wait for {}", locator), timeout))
            }
            Err(e) => Err(render_error(e)),
        }
    }

    async fn find_all(&mut self, locator: &str) -> HarvestResult<Vec<Self::Element>> {
        self.page.query_selector_all(locator).await.map_err(render_error)
    }

    async fn find_within(
        &mut self,
        parent: &Self::Element,
        locator: &str,
    ) -> HarvestResult<Option<Self::Element>> {
        parent.query_selector(locator).await.map_err(render_error)
    }

    async fn read_text(&mut self, element: &Self::Element) -> HarvestResult<String> {
        element.inner_text().await.map_err(render_error)
    }

    async fn read_text_content(&mut self, element: &Self::Element) -> HarvestResult<String> {
        Ok(element.text_content().await.map_err(render_error)?.unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> HarvestResult<Option<String>> {
        element.get_attribute(name).await.map_err(render_error)
    }

    async fn close(&mut self) -> HarvestResult<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
            return Err(render_error(e));
        }
        Ok(())
    }
}
