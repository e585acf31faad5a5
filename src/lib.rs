//! Catalog Harvester - a resilient product-catalog scraper
//!
//! This library provides:
//! - Field extraction that degrades to a missing-marker instead of failing
//! - Per-product record building with specification and review harvesting
//! - Sequential listing pagination and a bounded pool of record builders
//! - Aggregation of heterogeneous records into one table, exported as CSV or JSON

pub mod config;
pub mod crawl;
pub mod error;
pub mod export;
pub mod extract;
pub mod logging;
pub mod render;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use crate::config::{AppConfig, SiteProfile};
pub use crate::crawl::{CrawlReport, CrawlSettings, CrawlStats, Crawler};
pub use crate::error::{HarvestError, HarvestResult};
pub use crate::export::{ExportFormat, ExportManager, OutputTable, TableAggregator};
pub use crate::extract::{FieldDescriptor, FieldValue, ProductRecord};
