use indexmap::IndexMap;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::field::{extract, extract_static, FieldSource, FieldValue};
use super::layouts::harvest_specifications;
use super::reviews::{harvest_reviews, ReviewEntry, ReviewPolicy};
use crate::config::SiteProfile;
use crate::error::{HarvestError, HarvestResult};
use crate::render::{Jitter, RenderEngine, RenderSession};

pub const REVIEWS_COLUMN: &str = "reviews";
pub const ERROR_COLUMN: &str = "Error";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordStatus {
    Complete,
    Failed { reason: String },
}

/// One product's extracted data.
///
/// Field order is insertion order; re-inserting an existing key replaces its
/// value in place (last writer wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub url: String,
    pub fields: IndexMap<String, FieldValue>,
    /// `None` when the builder never reached review extraction
    pub reviews: Option<Vec<ReviewEntry>>,
    pub status: RecordStatus,
}

impl ProductRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: IndexMap::new(),
            reviews: None,
            status: RecordStatus::Complete,
        }
    }

    pub fn from_fields<K, V>(
        url: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let mut record = Self::new(url);
        for (key, value) in fields {
            record.insert(key, value.into());
        }
        record
    }

    /// All-missing record for a product whose page could not be processed
    pub fn failed<'a>(
        url: impl Into<String>,
        field_names: impl IntoIterator<Item = &'a str>,
        reason: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(url);
        for name in field_names {
            record.insert(name, FieldValue::Missing);
        }
        record.status = RecordStatus::Failed { reason: reason.into() };
        record
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(key.into(), value)
    }

    /// Merge specification pairs in order; later pairs overwrite earlier ones
    /// and core fields with the same name.
    pub fn merge_specifications(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in pairs {
            if let Some(previous) = self.insert(key.clone(), FieldValue::Text(value)) {
                debug!("Specification '{}' overwrote {:?}", key, previous);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RecordStatus::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Failed { reason } => Some(reason),
            RecordStatus::Complete => None,
        }
    }

    /// Flattened cells: fields, then serialized reviews. The failure reason is
    /// reported separately by `failure_reason`
    pub fn data_cells(&self) -> Vec<(String, FieldValue)> {
        let mut cells: Vec<(String, FieldValue)> = self
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if let Some(reviews) = &self.reviews {
            let serialized = serde_json::to_string(reviews).ok().map(FieldValue::Text);
            cells.push((REVIEWS_COLUMN.to_string(), serialized.unwrap_or_default()));
        }

        cells
    }
}

/// Per-product tuning for the record builder
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub element_timeout: Duration,
    pub product_timeout: Duration,
    pub jitter: Jitter,
    pub review_cap: usize,
    pub review_policy: ReviewPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            element_timeout: Duration::from_secs(5),
            product_timeout: Duration::from_secs(120),
            jitter: Jitter::default(),
            review_cap: 5,
            review_policy: ReviewPolicy::default(),
        }
    }
}

/// Everything read from the static markup snapshot in one parse
struct StaticReadout {
    fields: IndexMap<String, FieldValue>,
    specifications: Vec<(String, String)>,
}

fn read_static(source: &str, profile: &SiteProfile) -> StaticReadout {
    let document = Html::parse_document(source);

    let fields = profile
        .core_fields
        .iter()
        .filter(|descriptor| descriptor.source == FieldSource::Static)
        .map(|descriptor| {
            let value = extract_static(&document, descriptor).into_value(&descriptor.default);
            (descriptor.name.clone(), value)
        })
        .collect();

    StaticReadout {
        fields,
        specifications: harvest_specifications(&document, &profile.layouts),
    }
}

/// Builds one [`ProductRecord`] per product URL, each in its own session
pub struct RecordBuilder<E: RenderEngine> {
    engine: Arc<E>,
    profile: Arc<SiteProfile>,
    options: BuildOptions,
}

impl<E: RenderEngine> RecordBuilder<E> {
    pub fn new(engine: Arc<E>, profile: Arc<SiteProfile>, options: BuildOptions) -> Self {
        Self { engine, profile, options }
    }

    /// Build the record for `url`.
    ///
    /// Never fails: a page that cannot be loaded, or a product exceeding the
    /// per-product timeout, becomes a failed record. The session is closed on
    /// every path once acquired.
    pub async fn build(&self, url: &Url) -> ProductRecord {
        let started = Instant::now();

        let mut session = match self.engine.new_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("No {} session for {}: {}", self.engine.name(), url, e);
                return self.failed_for(url, format!("session unavailable: {}", e));
            }
        };

        let outcome =
            tokio::time::timeout(self.options.product_timeout, self.populate(&mut session, url))
                .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close session for {}: {}", url, e);
        }

        match outcome {
            Ok(Ok(record)) => {
                debug!(
                    "Built record for {} with {} fields in {}ms",
                    url,
                    record.fields.len(),
                    started.elapsed().as_millis()
                );
                record
            }
            Ok(Err(e)) => {
                warn!("Product {} failed ({}): {}", url, e.category(), e);
                self.failed_for(url, e.to_string())
            }
            Err(_) => {
                let e =
                    HarvestError::timeout(format!("build {}", url), self.options.product_timeout);
                warn!("Product {} abandoned: {}", url, e);
                self.failed_for(url, e.to_string())
            }
        }
    }

    async fn populate(&self, session: &mut E::Session, url: &Url) -> HarvestResult<ProductRecord> {
        session.open(url).await?;
        self.options.jitter.pause().await;

        let source = match session.page_source().await {
            Ok(source) => source,
            Err(e) => {
                warn!("No page source for {}: {}", url, e);
                String::new()
            }
        };
        let mut readout = read_static(&source, &self.profile);

        let mut record = ProductRecord::new(url.as_str());
        for descriptor in &self.profile.core_fields {
            let value = match descriptor.source {
                FieldSource::Live => {
                    extract(session, descriptor, self.options.element_timeout).await
                }
                FieldSource::Static => readout
                    .fields
                    .swap_remove(&descriptor.name)
                    .unwrap_or_else(|| descriptor.default.clone()),
            };
            record.insert(descriptor.name.clone(), value);
        }

        record.merge_specifications(readout.specifications);

        let reviews = harvest_reviews(
            session,
            &self.profile.reviews,
            self.options.review_cap,
            self.options.review_policy,
        )
        .await;
        record.reviews = Some(reviews);

        Ok(record)
    }

    /// All-missing record for `url` carrying `reason`
    pub fn failed_for(&self, url: &Url, reason: String) -> ProductRecord {
        ProductRecord::failed(url.as_str(), self.profile.core_field_names(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        product_page, review_card, test_options, test_profile, CountingEngine, FixtureFetcher,
    };

    const URL: &str = "https://shop.test/dp/1";

    fn builder(engine: Arc<CountingEngine>) -> RecordBuilder<CountingEngine> {
        RecordBuilder::new(engine, Arc::new(test_profile()), test_options())
    }

    #[tokio::test]
    async fn test_builds_core_fields_specifications_and_reviews() {
        let specs = r#"
            <table id="productDetails_techSpec_section_1">
                <tr><th>Brand</th><td>Acme</td></tr>
                <tr><th>Connectivity</th><td>Bluetooth</td></tr>
            </table>
        "#;
        let reviews = review_card("Ann", "4.0 out of 5 stars", "2 June 2024", "Comfortable");
        let page = product_page("Acme Buds", "1,299", &format!("{}{}", specs, reviews));
        let engine = Arc::new(CountingEngine::new(FixtureFetcher::new().with_page(URL, &page)));

        let record = builder(engine).build(&Url::parse(URL).unwrap()).await;

        assert!(!record.is_failed());
        assert_eq!(record.get("Title"), Some(&FieldValue::text("Acme Buds")));
        assert_eq!(record.get("Price"), Some(&FieldValue::text("1,299")));
        assert_eq!(record.get("PriceBeforeDiscount"), Some(&FieldValue::text("EGP 1,599")));
        assert_eq!(record.get("Rate"), Some(&FieldValue::text("4.3 out of 5 stars")));
        assert_eq!(record.get("Discount"), Some(&FieldValue::Missing));
        assert_eq!(record.get("Brand"), Some(&FieldValue::text("Acme")));
        assert_eq!(record.get("Connectivity"), Some(&FieldValue::text("Bluetooth")));

        let reviews = record.reviews.as_ref().unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, FieldValue::text("4.0"));

        let keys: Vec<_> = record.fields.keys().take(7).cloned().collect();
        assert_eq!(
            keys,
            vec![
                "Title",
                "Rate",
                "Price",
                "PriceBeforeDiscount",
                "Discount",
                "ImageURL",
                "Description"
            ]
        );
    }

    #[tokio::test]
    async fn test_later_layout_wins_for_shared_key() {
        let specs = r#"
            <table id="productDetails_techSpec_section_1">
                <tr><th>Colour</th><td>Black</td></tr>
            </table>
            <table id="productDetails_detailBullets_sections1">
                <tr><th>Colour</th><td>Matte Black</td></tr>
            </table>
        "#;
        let page = product_page("Acme Buds", "1,299", specs);
        let engine = Arc::new(CountingEngine::new(FixtureFetcher::new().with_page(URL, &page)));

        let record = builder(engine).build(&Url::parse(URL).unwrap()).await;
        assert_eq!(record.get("Colour"), Some(&FieldValue::text("Matte Black")));
    }

    #[tokio::test]
    async fn test_specification_key_overwrites_core_field() {
        let specs = r#"
            <table id="productDetails_techSpec_section_1">
                <tr><th>Price</th><td>See offers</td></tr>
            </table>
        "#;
        let page = product_page("Acme Buds", "1,299", specs);
        let engine = Arc::new(CountingEngine::new(FixtureFetcher::new().with_page(URL, &page)));

        let record = builder(engine).build(&Url::parse(URL).unwrap()).await;
        assert_eq!(record.get("Price"), Some(&FieldValue::text("See offers")));
        assert_eq!(record.fields.get_index_of("Price"), Some(2));
    }

    #[tokio::test]
    async fn test_session_released_once_on_success() {
        let page = product_page("Acme Buds", "1,299", "");
        let engine = Arc::new(CountingEngine::new(FixtureFetcher::new().with_page(URL, &page)));

        builder(engine.clone()).build(&Url::parse(URL).unwrap()).await;
        assert_eq!(engine.sessions_opened(), 1);
        assert_eq!(engine.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_session_released_once_on_mid_extraction_failure() {
        let reviews = review_card("Ann", "4.0 out of 5 stars", "2 June 2024", "Comfortable");
        let page = product_page("Acme Buds", "1,299", &reviews);
        let engine = Arc::new(
            CountingEngine::new(FixtureFetcher::new().with_page(URL, &page))
                .failing_on("div[data-hook='review']"),
        );

        let record = builder(engine.clone()).build(&Url::parse(URL).unwrap()).await;

        assert!(!record.is_failed());
        assert_eq!(record.get("Title"), Some(&FieldValue::text("Acme Buds")));
        assert_eq!(record.reviews.as_deref().map(<[ReviewEntry]>::len), Some(0));
        assert_eq!(engine.sessions_opened(), 1);
        assert_eq!(engine.sessions_closed(), 1);
    }

    #[tokio::test]
    async fn test_page_load_failure_yields_failed_record() {
        let engine = Arc::new(CountingEngine::new(FixtureFetcher::new()));

        let record = builder(engine.clone()).build(&Url::parse(URL).unwrap()).await;

        assert!(record.is_failed());
        assert_eq!(record.fields.len(), 7);
        assert!(record.fields.values().all(FieldValue::is_missing));
        assert!(record.reviews.is_none());
        assert_eq!(engine.sessions_opened(), 1);
        assert_eq!(engine.sessions_closed(), 1);

        assert!(record.failure_reason().unwrap().contains("Page load failed"));
        assert_eq!(record.data_cells().len(), 7);
    }

    #[tokio::test]
    async fn test_product_timeout_abandons_and_still_closes() {
        let page = product_page("Slow", "1", "");
        let fetcher = FixtureFetcher::new()
            .with_page(URL, &page)
            .with_delay(Duration::from_millis(500));
        let engine = Arc::new(CountingEngine::new(fetcher));

        let options = BuildOptions {
            product_timeout: Duration::from_millis(50),
            ..test_options()
        };
        let record = RecordBuilder::new(engine.clone(), Arc::new(test_profile()), options)
            .build(&Url::parse(URL).unwrap())
            .await;

        assert!(record.is_failed());
        assert!(matches!(
            &record.status,
            RecordStatus::Failed { reason } if reason.contains("Timed out")
        ));
        assert_eq!(engine.sessions_closed(), 1);
    }

    #[test]
    fn test_cells_order_and_review_serialization() {
        let mut record = ProductRecord::from_fields(URL, [("x", Some("1".to_string()))]);
        record.reviews = Some(Vec::new());

        let cells = record.data_cells();
        assert_eq!(cells[0], ("x".to_string(), FieldValue::text("1")));
        assert_eq!(cells[1], (REVIEWS_COLUMN.to_string(), FieldValue::text("[]")));
        assert_eq!(cells.len(), 2);
    }
}
