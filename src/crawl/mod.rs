//! Crawl orchestration: sequential listing discovery, then a bounded fan-out
//! of record builds.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;

pub mod pagination;

pub use pagination::{extract_product_links, PaginationResult, PaginationWalker};

use crate::config::SiteProfile;
use crate::error::{HarvestError, HarvestResult};
use crate::extract::record::{BuildOptions, ProductRecord, RecordBuilder};
use crate::render::RenderEngine;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub concurrency: usize,
    pub build: BuildOptions,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            build: BuildOptions::default(),
        }
    }
}

/// Counts reported at the end of a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub pages_visited: usize,
    pub links_discovered: usize,
    pub records_built: usize,
    pub records_failed: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// One record per discovered URL, in discovery order
    pub records: Vec<ProductRecord>,
    pub stats: CrawlStats,
}

/// Discovery progress for one crawl; dropped when discovery ends
struct CrawlState {
    current_page: Option<Url>,
    page_number: usize,
    product_urls: Vec<Url>,
}

impl CrawlState {
    fn new(start: &Url) -> Self {
        Self {
            current_page: Some(start.clone()),
            page_number: 0,
            product_urls: Vec::new(),
        }
    }
}

pub struct Crawler<E: RenderEngine> {
    walker: PaginationWalker<E>,
    builder: Arc<RecordBuilder<E>>,
    settings: CrawlSettings,
}

impl<E: RenderEngine> Crawler<E> {
    pub fn new(
        engine: Arc<E>,
        profile: SiteProfile,
        settings: CrawlSettings,
    ) -> HarvestResult<Self> {
        let profile = Arc::new(profile);
        let walker = PaginationWalker::new(engine.clone(), profile.clone(), settings.build.jitter)?;
        let builder = Arc::new(RecordBuilder::new(engine, profile, settings.build.clone()));

        Ok(Self { walker, builder, settings })
    }

    /// Discover product URLs across up to `max_pages` listing pages.
    ///
    /// Returns the URLs in page order then document order, and the number of
    /// pages actually visited. A listing that fails to load ends discovery.
    pub async fn discover(&self, start: &Url, max_pages: usize) -> (Vec<Url>, usize) {
        let mut state = CrawlState::new(start);

        while state.page_number < max_pages {
            let Some(page_url) = state.current_page.take() else {
                break;
            };
            state.page_number += 1;
            info!("Scraping page {}: {}", state.page_number, page_url);

            let result = match self.walker.walk(&page_url).await {
                Ok(result) => result,
                Err(e) => {
                    error!("Listing page {} failed, ending discovery: {}", page_url, e);
                    break;
                }
            };

            info!("Page {}: found {} product links", state.page_number, result.product_urls.len());
            state.product_urls.extend(result.product_urls);

            if result.next_page.is_none() {
                info!("No more pages to scrape");
            }
            state.current_page = result.next_page;
        }

        info!("Total product links found: {}", state.product_urls.len());
        (state.product_urls, state.page_number)
    }

    /// Build records for all URLs on a pool of at most `concurrency` workers.
    /// Output order matches input order.
    pub async fn build_all(&self, urls: Vec<Url>) -> Vec<ProductRecord> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let handles: Vec<_> = urls
            .iter()
            .cloned()
            .map(|url| {
                let semaphore = semaphore.clone();
                let builder = self.builder.clone();
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => return builder_unavailable(&builder, &url, e),
                    };
                    builder.build(&url).await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(&urls)
            .map(|(joined, url)| match joined {
                Ok(record) => record,
                Err(e) => {
                    error!("Worker for {} aborted: {}", url, e);
                    builder_unavailable(&self.builder, url, e)
                }
            })
            .collect()
    }

    /// Discover then build: the full batch job
    pub async fn crawl(&self, start: &Url, max_pages: usize) -> CrawlReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("crawl", run_id = %run_id);

        let started_at = Utc::now();

        async move {
            let started = Instant::now();

            let (urls, pages_visited) = self.discover(start, max_pages).await;
            let links_discovered = urls.len();

            let records = self.build_all(urls).await;
            let records_failed = records.iter().filter(|record| record.is_failed()).count();

            let stats = CrawlStats {
                pages_visited,
                links_discovered,
                records_built: records.len() - records_failed,
                records_failed,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };

            info!(
                "Crawl finished: {} pages visited, {} links discovered, {} records built, \
                 {} failed in {}ms",
                stats.pages_visited,
                stats.links_discovered,
                stats.records_built,
                stats.records_failed,
                stats.elapsed_ms
            );
            if stats.records_failed > 0 {
                warn!("{} products could not be extracted", stats.records_failed);
            }

            CrawlReport {
                run_id,
                started_at,
                records,
                stats,
            }
        }
        .instrument(span)
        .await
    }
}

fn builder_unavailable<E: RenderEngine>(
    builder: &RecordBuilder<E>,
    url: &Url,
    reason: impl std::fmt::Display,
) -> ProductRecord {
    let e = HarvestError::internal(format!("worker for {} failed: {}", url, reason));
    builder.failed_for(url, e.to_string())
}
