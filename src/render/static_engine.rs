use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{RenderEngine, RenderSession};
use crate::error::{HarvestError, HarvestResult};
use crate::extract::text::collapse_whitespace;

/// Source of raw page markup for the static engine
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &Url) -> HarvestResult<String>;
}

/// Engine answering DOM queries from fetched, already-rendered markup.
///
/// The parsed document is not `Send`, so each query re-parses the stored
/// source; element handles carry their text and attributes plus the selector
/// path needed to find them again for nested lookups.
pub struct StaticEngine<F: PageFetcher> {
    fetcher: Arc<F>,
}

impl<F: PageFetcher> StaticEngine<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher: Arc::new(fetcher) }
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }
}

#[async_trait]
impl<F: PageFetcher> RenderEngine for StaticEngine<F> {
    type Session = StaticSession<F>;

    async fn new_session(&self) -> HarvestResult<Self::Session> {
        Ok(StaticSession::new(self.fetcher.clone()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Snapshot of an element in a static document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticElement {
    /// Selector steps from the document root, each with the match index
    path: Vec<(String, usize)>,
    text: String,
    text_content: String,
    attributes: Vec<(String, String)>,
}

impl StaticElement {
    fn capture(element: ElementRef<'_>, path: Vec<(String, usize)>) -> Self {
        let text_content: String = element.text().collect();
        Self {
            path,
            text: collapse_whitespace(&text_content),
            text_content,
            attributes: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

pub struct StaticSession<F: PageFetcher> {
    fetcher: Arc<F>,
    source: Option<String>,
    closed: bool,
}

impl<F: PageFetcher> StaticSession<F> {
    fn new(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            source: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> HarvestResult<()> {
        if self.closed {
            return Err(HarvestError::render("session already closed"));
        }
        Ok(())
    }

    fn with_document<T>(&self, query: impl FnOnce(&Html) -> HarvestResult<T>) -> HarvestResult<T> {
        self.ensure_open()?;
        let source = self.source.as_deref().ok_or(HarvestError::NoPageOpen)?;
        let document = Html::parse_document(source);
        query(&document)
    }
}

fn parse_selector(locator: &str) -> HarvestResult<Selector> {
    Selector::parse(locator).map_err(|e| HarvestError::invalid_selector(locator, e.to_string()))
}

/// Walk a selector path back to the element it identifies
fn resolve<'a>(
    document: &'a Html,
    path: &[(String, usize)],
) -> HarvestResult<Option<ElementRef<'a>>> {
    let mut current: Option<ElementRef<'a>> = None;
    for (locator, index) in path {
        let selector = parse_selector(locator)?;
        let next = match current {
            None => document.select(&selector).nth(*index),
            Some(parent) => parent.select(&selector).nth(*index),
        };
        match next {
            Some(element) => current = Some(element),
            None => return Ok(None),
        }
    }
    Ok(current)
}

#[async_trait]
impl<F: PageFetcher> RenderSession for StaticSession<F> {
    type Element = StaticElement;

    async fn open(&mut self, url: &Url) -> HarvestResult<()> {
        self.ensure_open()?;
        debug!("Static session fetching {}", url);
        let source = self.fetcher.fetch(url).await?;
        self.source = Some(source);
        Ok(())
    }

    async fn page_source(&mut self) -> HarvestResult<String> {
        self.ensure_open()?;
        self.source.clone().ok_or(HarvestError::NoPageOpen)
    }

    async fn wait_for_element(
        &mut self,
        locator: &str,
        _timeout: Duration,
    ) -> HarvestResult<Option<Self::Element>> {
        // Static markup is complete once fetched; there is nothing to wait for.
        self.with_document(|document| {
            let selector = parse_selector(locator)?;
            Ok(document
                .select(&selector)
                .next()
                .map(|element| StaticElement::capture(element, vec![(locator.to_string(), 0)])))
        })
    }

    async fn find_all(&mut self, locator: &str) -> HarvestResult<Vec<Self::Element>> {
        self.with_document(|document| {
            let selector = parse_selector(locator)?;
            Ok(document
                .select(&selector)
                .enumerate()
                .map(|(index, element)| {
                    StaticElement::capture(element, vec![(locator.to_string(), index)])
                })
                .collect())
        })
    }

    async fn find_within(
        &mut self,
        parent: &Self::Element,
        locator: &str,
    ) -> HarvestResult<Option<Self::Element>> {
        self.with_document(|document| {
            let Some(parent_ref) = resolve(document, &parent.path)? else {
                return Ok(None);
            };
            let selector = parse_selector(locator)?;
            Ok(parent_ref.select(&selector).next().map(|element| {
                let mut path = parent.path.clone();
                path.push((locator.to_string(), 0));
                StaticElement::capture(element, path)
            }))
        })
    }

    async fn read_text(&mut self, element: &Self::Element) -> HarvestResult<String> {
        self.ensure_open()?;
        Ok(element.text.clone())
    }

    async fn read_text_content(&mut self, element: &Self::Element) -> HarvestResult<String> {
        self.ensure_open()?;
        Ok(element.text_content.clone())
    }

    async fn read_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> HarvestResult<Option<String>> {
        self.ensure_open()?;
        Ok(element.attribute(name).map(str::to_string))
    }

    async fn close(&mut self) -> HarvestResult<()> {
        self.closed = true;
        self.source = None;
        Ok(())
    }
}
