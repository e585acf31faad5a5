//! Render collaborator seam.
//!
//! The pipeline never talks to a browser or HTTP client directly. It asks a
//! [`RenderEngine`] for a fresh [`RenderSession`], drives it through one page,
//! and closes it. Two engines ship with the crate:
//! - [`StaticEngine`] fetches markup through a [`PageFetcher`] and answers DOM
//!   queries from the parsed document (the HTTP fetcher is the default).
//! - `BrowserEngine` (feature `browser`) drives headless Chromium.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::HarvestResult;

pub mod http_fetcher;
pub mod jitter;
pub mod static_engine;
pub mod user_agent;

#[cfg(feature = "browser")]
pub mod browser;

pub use http_fetcher::HttpFetcher;
pub use jitter::Jitter;
pub use static_engine::{PageFetcher, StaticElement, StaticEngine, StaticSession};

/// Static engine backed by the HTTP fetcher
pub type HttpEngine = StaticEngine<HttpFetcher>;

/// One exclusive page session. Sessions are never shared between tasks.
#[async_trait]
pub trait RenderSession: Send {
    /// Handle to an element inside the currently open page
    type Element: Send + Sync;

    /// Navigate to `url` and wait for the page to load
    async fn open(&mut self, url: &Url) -> HarvestResult<()>;

    /// Serialized markup of the current page
    async fn page_source(&mut self) -> HarvestResult<String>;

    /// Wait up to `timeout` for the first element matching `locator`
    async fn wait_for_element(
        &mut self,
        locator: &str,
        timeout: Duration,
    ) -> HarvestResult<Option<Self::Element>>;

    /// All elements matching `locator`, in document order
    async fn find_all(&mut self, locator: &str) -> HarvestResult<Vec<Self::Element>>;

    /// First descendant of `parent` matching `locator`, without waiting
    async fn find_within(
        &mut self,
        parent: &Self::Element,
        locator: &str,
    ) -> HarvestResult<Option<Self::Element>>;

    /// Rendered (visible) text of an element
    async fn read_text(&mut self, element: &Self::Element) -> HarvestResult<String>;

    /// Raw `textContent` of an element, including visually hidden text
    async fn read_text_content(&mut self, element: &Self::Element) -> HarvestResult<String>;

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> HarvestResult<Option<String>>;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(&mut self) -> HarvestResult<()>;
}

/// Factory for render sessions
#[async_trait]
pub trait RenderEngine: Send + Sync + 'static {
    type Session: RenderSession + 'static;

    async fn new_session(&self) -> HarvestResult<Self::Session>;

    fn name(&self) -> &str;
}
