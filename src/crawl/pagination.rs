use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SiteProfile;
use crate::error::{HarvestError, HarvestResult};
use crate::render::{Jitter, RenderEngine, RenderSession};

/// Product links found on one listing page, plus the next page if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationResult {
    pub product_urls: Vec<Url>,
    pub next_page: Option<Url>,
}

/// Resolve every matching anchor's `href` against `base`, in document order.
/// Anchors without an `href`, or with one that does not resolve, are skipped.
pub fn extract_product_links(
    source: &str,
    link_selector: &str,
    base: &Url,
) -> HarvestResult<Vec<Url>> {
    let selector = Selector::parse(link_selector)
        .map_err(|e| HarvestError::invalid_selector(link_selector, e.to_string()))?;
    let document = Html::parse_document(source);

    Ok(document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
        .filter_map(|href| match base.join(href.trim()) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Skipping unresolvable product link '{}': {}", href, e);
                None
            }
        })
        .collect())
}

/// Walks a single listing page
pub struct PaginationWalker<E: RenderEngine> {
    engine: Arc<E>,
    profile: Arc<SiteProfile>,
    base_url: Url,
    jitter: Jitter,
}

impl<E: RenderEngine> PaginationWalker<E> {
    pub fn new(engine: Arc<E>, profile: Arc<SiteProfile>, jitter: Jitter) -> HarvestResult<Self> {
        let base_url = profile.base_url()?;
        Ok(Self {
            engine,
            profile,
            base_url,
            jitter,
        })
    }

    /// Load `listing_url` and report its product links and next page.
    ///
    /// Only a failure to load the listing itself is an error; a missing or
    /// unreadable next control means pagination has ended.
    pub async fn walk(&self, listing_url: &Url) -> HarvestResult<PaginationResult> {
        let mut session = self.engine.new_session().await?;
        let result = self.walk_in(&mut session, listing_url).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close listing session for {}: {}", listing_url, e);
        }

        result
    }

    async fn walk_in(
        &self,
        session: &mut E::Session,
        listing_url: &Url,
    ) -> HarvestResult<PaginationResult> {
        session.open(listing_url).await?;
        self.jitter.pause().await;

        let source = session.page_source().await?;
        let product_urls =
            extract_product_links(&source, &self.profile.product_link_selector, &self.base_url)?;
        info!("Products on the page {}: {}", listing_url, product_urls.len());

        let next_page = self.next_page(session).await;
        match &next_page {
            Some(next) => info!("Next page URL: {}", next),
            None => info!("No 'Next' control on {}", listing_url),
        }

        Ok(PaginationResult { product_urls, next_page })
    }

    async fn next_page(&self, session: &mut E::Session) -> Option<Url> {
        let control = match session.find_all(&self.profile.next_page_selector).await {
            Ok(mut controls) if !controls.is_empty() => controls.swap_remove(0),
            Ok(_) => return None,
            Err(e) => {
                debug!("Next control lookup failed: {}", e);
                return None;
            }
        };

        let href = match session.read_attribute(&control, "href").await {
            Ok(Some(href)) if !href.trim().is_empty() => href,
            Ok(_) => return None,
            Err(e) => {
                debug!("Next control href unreadable: {}", e);
                return None;
            }
        };

        self.base_url.join(href.trim()).ok()
    }
}
