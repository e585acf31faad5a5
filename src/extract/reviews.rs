use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::field::FieldValue;
use crate::render::RenderSession;

const RATING_SUFFIX: &str = "out of 5 stars";

/// One review card, owned by its product record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    #[serde(rename = "Reviewer")]
    pub reviewer: FieldValue,
    #[serde(rename = "Rating")]
    pub rating: FieldValue,
    #[serde(rename = "Date")]
    pub date: FieldValue,
    #[serde(rename = "Review")]
    pub body: FieldValue,
}

impl ReviewEntry {
    fn fields(&self) -> [&FieldValue; 4] {
        [&self.reviewer, &self.rating, &self.date, &self.body]
    }

    pub fn is_complete(&self) -> bool {
        self.fields().iter().all(|value| !value.is_missing())
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|value| value.is_missing())
    }
}

/// What to do with a review card that lacks some sub-fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPolicy {
    /// Drop the card unless all four sub-fields were read
    DropIncomplete,
    /// Keep the card with missing markers; drop it only when nothing was read
    #[default]
    KeepPartial,
}

impl ReviewPolicy {
    fn accepts(&self, entry: &ReviewEntry) -> bool {
        match self {
            Self::DropIncomplete => entry.is_complete(),
            Self::KeepPartial => !entry.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSelectors {
    pub card: String,
    pub reviewer: String,
    pub rating: String,
    pub date: String,
    pub body: String,
}

impl Default for ReviewSelectors {
    fn default() -> Self {
        Self {
            card: "div[data-hook='review']".to_string(),
            reviewer: "span.a-profile-name".to_string(),
            rating: "i.a-icon-star span.a-icon-alt".to_string(),
            date: "span.review-date".to_string(),
            body: "span[data-hook='review-body']".to_string(),
        }
    }
}

enum ReadMode {
    Text,
    TextContent,
}

async fn read_sub_field<S: RenderSession>(
    session: &mut S,
    card: &S::Element,
    locator: &str,
    mode: ReadMode,
) -> FieldValue {
    let element = match session.find_within(card, locator).await {
        Ok(Some(element)) => element,
        Ok(None) => return FieldValue::Missing,
        Err(e) => {
            debug!("Review sub-field '{}' unreadable: {}", locator, e);
            return FieldValue::Missing;
        }
    };

    let read = match mode {
        ReadMode::Text => session.read_text(&element).await,
        ReadMode::TextContent => session.read_text_content(&element).await,
    };

    match read {
        Ok(text) => FieldValue::Text(text.trim().to_string()),
        Err(e) => {
            debug!("Review sub-field '{}' unreadable: {}", locator, e);
            FieldValue::Missing
        }
    }
}

fn strip_rating_suffix(rating: FieldValue) -> FieldValue {
    match rating {
        FieldValue::Text(text) => {
            FieldValue::Text(text.replace(RATING_SUFFIX, "").trim().to_string())
        }
        FieldValue::Missing => FieldValue::Missing,
    }
}

/// Read up to `cap` review cards from the live page, in document order.
///
/// The cap bounds the cards examined, so rejected cards are not replaced by
/// later ones. A failure listing the cards yields no reviews.
pub async fn harvest_reviews<S: RenderSession>(
    session: &mut S,
    selectors: &ReviewSelectors,
    cap: usize,
    policy: ReviewPolicy,
) -> Vec<ReviewEntry> {
    let cards = match session.find_all(&selectors.card).await {
        Ok(cards) => cards,
        Err(e) => {
            warn!("Could not list review cards: {}", e);
            return Vec::new();
        }
    };

    let mut reviews = Vec::new();
    for card in cards.iter().take(cap) {
        let entry = ReviewEntry {
            reviewer: read_sub_field(session, card, &selectors.reviewer, ReadMode::Text).await,
            rating: strip_rating_suffix(
                read_sub_field(session, card, &selectors.rating, ReadMode::TextContent).await,
            ),
            date: read_sub_field(session, card, &selectors.date, ReadMode::Text).await,
            body: read_sub_field(session, card, &selectors.body, ReadMode::Text).await,
        };

        if policy.accepts(&entry) {
            reviews.push(entry);
        } else {
            debug!("Dropping incomplete review card");
        }
    }

    reviews
}
