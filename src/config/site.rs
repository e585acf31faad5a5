use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarvestError, HarvestResult};
use crate::extract::field::FieldDescriptor;
use crate::extract::layouts::{default_layouts, SpecLayout};
use crate::extract::reviews::ReviewSelectors;

/// Selectors and field descriptors for one storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Base against which product and next-page links are resolved
    pub base_url: String,
    pub product_link_selector: String,
    pub next_page_selector: String,
    pub core_fields: Vec<FieldDescriptor>,
    pub layouts: Vec<SpecLayout>,
    pub reviews: ReviewSelectors,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://www.amazon.eg".to_string(),
            product_link_selector: concat!(
                "a.a-link-normal.s-underline-text.s-underline-link-text",
                ".s-link-style.a-text-normal"
            )
            .to_string(),
            next_page_selector: "a.s-pagination-next".to_string(),
            core_fields: default_core_fields(),
            layouts: default_layouts(),
            reviews: ReviewSelectors::default(),
        }
    }
}

/// Title, rating, prices, discount, image and description, in column order
pub fn default_core_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::text("Title", "#productTitle"),
        FieldDescriptor::text_content("Rate", "span.a-icon-alt"),
        FieldDescriptor::text("Price", "#corePriceDisplay_desktop_feature_div .a-price-whole"),
        // The strike-through price is visually hidden in the live DOM
        FieldDescriptor::text("PriceBeforeDiscount", "span.a-size-small.aok-offscreen")
            .from_static(),
        FieldDescriptor::text("Discount", ".savingsPercentage"),
        FieldDescriptor::attribute("ImageURL", "#imgTagWrapperId img", "src"),
        FieldDescriptor::text("Description", "#feature-bullets"),
    ]
}

impl SiteProfile {
    pub fn base_url(&self) -> HarvestResult<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| HarvestError::invalid_url(&self.base_url, e.to_string()))
    }

    pub fn core_field_names(&self) -> impl Iterator<Item = &str> {
        self.core_fields.iter().map(|descriptor| descriptor.name.as_str())
    }

    fn check_selector(locator: &str) -> HarvestResult<()> {
        Selector::parse(locator)
            .map(|_| ())
            .map_err(|e| HarvestError::invalid_selector(locator, e.to_string()))
    }

    /// Reject profiles whose URLs or selectors cannot be parsed
    pub fn validate(&self) -> HarvestResult<()> {
        self.base_url()?;

        if self.core_fields.is_empty() {
            return Err(HarvestError::config("site profile needs at least one core field"));
        }

        let selectors = [
            self.product_link_selector.as_str(),
            self.next_page_selector.as_str(),
            self.reviews.card.as_str(),
            self.reviews.reviewer.as_str(),
            self.reviews.rating.as_str(),
            self.reviews.date.as_str(),
            self.reviews.body.as_str(),
        ];
        for locator in selectors
            .into_iter()
            .chain(self.core_fields.iter().map(|field| field.locator.as_str()))
            .chain(self.layouts.iter().map(|layout| layout.selector.as_str()))
        {
            Self::check_selector(locator)?;
        }

        Ok(())
    }
}
