//! Shared fixtures for unit tests: an in-memory page fetcher, engines that
//! count or sabotage sessions, and small HTML builders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::SiteProfile;
use crate::error::{HarvestError, HarvestResult};
use crate::extract::record::BuildOptions;
use crate::render::{
    Jitter, PageFetcher, RenderEngine, RenderSession, StaticElement, StaticEngine, StaticSession,
};

pub const PRODUCT_LINK_CLASS: &str =
    "a-link-normal s-underline-text s-underline-link-text s-link-style a-text-normal";

fn normalize(url: &str) -> String {
    Url::parse(url).map(String::from).unwrap_or_else(|_| url.to_string())
}

#[derive(Default)]
struct FetchStats {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

/// Decrements the in-flight count even when the fetch future is dropped
struct InFlight<'a>(&'a FetchStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a FetchStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves canned markup by URL; unknown URLs fail like a 404
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    delay: Option<Duration>,
    stats: FetchStats,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(normalize(url), html.to_string());
        self
    }

    /// Hold every fetch for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.stats.fetched.lock().map(|urls| urls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &Url) -> HarvestResult<String> {
        if let Ok(mut fetched) = self.stats.fetched.lock() {
            fetched.push(url.to_string());
        }

        let _guard = InFlight::enter(&self.stats);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| HarvestError::page_load(url.as_str(), "HTTP 404"))
    }
}

/// Static engine that counts sessions and can fail lookups for one locator
pub struct CountingEngine {
    inner: StaticEngine<FixtureFetcher>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    failing_locator: Option<String>,
}

impl CountingEngine {
    pub fn new(fetcher: FixtureFetcher) -> Self {
        Self {
            inner: StaticEngine::new(fetcher),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
            failing_locator: None,
        }
    }

    /// Make `find_all` and `wait_for_element` error for `locator`
    pub fn failing_on(mut self, locator: &str) -> Self {
        self.failing_locator = Some(locator.to_string());
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.fetcher().max_in_flight()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.inner.fetcher().fetched()
    }
}

#[async_trait]
impl RenderEngine for CountingEngine {
    type Session = CountingSession;

    async fn new_session(&self) -> HarvestResult<Self::Session> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(CountingSession {
            inner: self.inner.new_session().await?,
            closed: self.closed.clone(),
            failing_locator: self.failing_locator.clone(),
        })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub struct CountingSession {
    inner: StaticSession<FixtureFetcher>,
    closed: Arc<AtomicUsize>,
    failing_locator: Option<String>,
}

impl CountingSession {
    fn check(&self, locator: &str) -> HarvestResult<()> {
        match &self.failing_locator {
            Some(failing) if failing == locator => {
                Err(HarvestError::render(format!("lookup of {} crashed", locator)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RenderSession for CountingSession {
    type Element = StaticElement;

    async fn open(&mut self, url: &Url) -> HarvestResult<()> {
        self.inner.open(url).await
    }

    async fn page_source(&mut self) -> HarvestResult<String> {
        self.inner.page_source().await
    }

    async fn wait_for_element(
        &mut self,
        locator: &str,
        timeout: Duration,
    ) -> HarvestResult<Option<Self::Element>> {
        self.check(locator)?;
        self.inner.wait_for_element(locator, timeout).await
    }

    async fn find_all(&mut self, locator: &str) -> HarvestResult<Vec<Self::Element>> {
        self.check(locator)?;
        self.inner.find_all(locator).await
    }

    async fn find_within(
        &mut self,
        parent: &Self::Element,
        locator: &str,
    ) -> HarvestResult<Option<Self::Element>> {
        self.inner.find_within(parent, locator).await
    }

    async fn read_text(&mut self, element: &Self::Element) -> HarvestResult<String> {
        self.inner.read_text(element).await
    }

    async fn read_text_content(&mut self, element: &Self::Element) -> HarvestResult<String> {
        self.inner.read_text_content(element).await
    }

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> HarvestResult<Option<String>> {
        self.inner.read_attribute(element, name).await
    }

    async fn close(&mut self) -> HarvestResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Hang,
    Error,
}

/// Engine whose sessions open fine but never answer element lookups
pub struct FailingEngine {
    failure: Failure,
}

impl FailingEngine {
    /// Element lookups never complete
    pub fn timing_out() -> Self {
        Self { failure: Failure::Hang }
    }

    /// Element lookups return a render error
    pub fn erroring() -> Self {
        Self { failure: Failure::Error }
    }
}

#[async_trait]
impl RenderEngine for FailingEngine {
    type Session = FailingSession;

    async fn new_session(&self) -> HarvestResult<Self::Session> {
        Ok(FailingSession { failure: self.failure })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

pub struct FailingSession {
    failure: Failure,
}

#[async_trait]
impl RenderSession for FailingSession {
    type Element = ();

    async fn open(&mut self, _url: &Url) -> HarvestResult<()> {
        Ok(())
    }

    async fn page_source(&mut self) -> HarvestResult<String> {
        Err(HarvestError::render("no source"))
    }

    async fn wait_for_element(
        &mut self,
        _locator: &str,
        _timeout: Duration,
    ) -> HarvestResult<Option<Self::Element>> {
        match self.failure {
            Failure::Hang => std::future::pending().await,
            Failure::Error => Err(HarvestError::render("renderer crashed")),
        }
    }

    async fn find_all(&mut self, _locator: &str) -> HarvestResult<Vec<Self::Element>> {
        Err(HarvestError::render("renderer crashed"))
    }

    async fn find_within(
        &mut self,
        _parent: &Self::Element,
        _locator: &str,
    ) -> HarvestResult<Option<Self::Element>> {
        Err(HarvestError::render("renderer crashed"))
    }

    async fn read_text(&mut self, _element: &Self::Element) -> HarvestResult<String> {
        Err(HarvestError::render("renderer crashed"))
    }

    async fn read_text_content(&mut self, _element: &Self::Element) -> HarvestResult<String> {
        Err(HarvestError::render("renderer crashed"))
    }

    async fn read_attribute(
        &mut self,
        _element: &Self::Element,
        _name: &str,
    ) -> HarvestResult<Option<String>> {
        Err(HarvestError::render("renderer crashed"))
    }

    async fn close(&mut self) -> HarvestResult<()> {
        Ok(())
    }
}

/// Product detail page with every core field except the discount
pub fn product_page(title: &str, price: &str, extra: &str) -> String {
    format!(
        r#"<html><body>
            <span id="productTitle">
                {title}
            </span>
            <span class="a-icon-alt">4.3 out of 5 stars</span>
            <div id="corePriceDisplay_desktop_feature_div">
                <span class="a-price-whole">{price}</span>
            </div>
            <span class="a-size-small aok-offscreen">EGP 1,599</span>
            <div id="imgTagWrapperId"><img src="https://img.test/main.jpg"></div>
            <div id="feature-bullets"><ul><li>Noise cancelling</li></ul></div>
            {extra}
        </body></html>"#
    )
}

pub fn review_card(reviewer: &str, rating: &str, date: &str, body: &str) -> String {
    format!(
        r#"<div data-hook="review">
            <span class="a-profile-name">{reviewer}</span>
            <i class="a-icon a-icon-star"><span class="a-icon-alt">{rating}</span></i>
            <span class="a-size-base review-date">{date}</span>
            <span data-hook="review-body"><span>{body}</span></span>
        </div>"#
    )
}

/// Search listing with one product anchor per link and an optional next control
pub fn listing_page(links: &[&str], next: Option<&str>) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<div><a class="{PRODUCT_LINK_CLASS}" href="{href}">item</a></div>"#))
        .collect();
    let next = next
        .map(|href| {
            format!(r#"<a class="s-pagination-item s-pagination-next" href="{href}">Next</a>"#)
        })
        .unwrap_or_default();

    format!("<html><body>{anchors}{next}</body></html>")
}

pub fn test_profile() -> SiteProfile {
    SiteProfile {
        base_url: "https://shop.test".to_string(),
        ..SiteProfile::default()
    }
}

pub fn test_options() -> BuildOptions {
    BuildOptions {
        element_timeout: Duration::from_millis(200),
        product_timeout: Duration::from_secs(5),
        jitter: Jitter::disabled(),
        ..BuildOptions::default()
    }
}
