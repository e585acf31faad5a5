//! Field extraction against a live render session or a static snapshot.
//!
//! Extraction never fails: every problem collapses into [`FieldOutcome::Missing`]
//! with a reason kept for diagnostics, and the caller substitutes the
//! descriptor's default.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::trace;

use super::text::collapse_whitespace;
use crate::error::HarvestError;
use crate::render::RenderSession;

/// A cell value: extracted text, or the missing-marker.
///
/// `Missing` is distinct from `Text(String::new())`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum FieldValue {
    Text(String),
    #[default]
    Missing,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Missing => None,
        }
    }

    /// Rendering used by tabular sinks: missing cells become empty
    pub fn to_cell(&self) -> &str {
        self.as_text().unwrap_or("")
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Missing)
    }
}

impl From<FieldValue> for Option<String> {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(text) => Some(text),
            FieldValue::Missing => None,
        }
    }
}

/// Why a field came back empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingReason {
    /// Locator matched nothing (or the attribute is absent)
    NotFound,
    /// The render collaborator did not produce the element in time
    TimedOut,
    /// The element was found but reading it failed
    Unreadable(String),
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// Typed extraction result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Found(String),
    Missing(MissingReason),
}

impl FieldOutcome {
    fn from_error(error: HarvestError) -> Self {
        match error {
            HarvestError::Timeout { .. } => Self::Missing(MissingReason::TimedOut),
            other => Self::Missing(MissingReason::Unreadable(other.to_string())),
        }
    }

    pub fn into_value(self, default: &FieldValue) -> FieldValue {
        match self {
            Self::Found(text) => FieldValue::Text(text),
            Self::Missing(_) => default.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Rendered text, trimmed
    Text,
    /// Raw text content including hidden nodes, trimmed
    TextContent,
    /// Attribute value, trimmed
    Attribute { name: String },
}

/// Where a field is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// The live session DOM, with a bounded wait
    #[default]
    Live,
    /// The static markup snapshot of the page source
    Static,
}

/// Declarative description of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub locator: String,
    pub mode: ExtractionMode,
    #[serde(default)]
    pub source: FieldSource,
    #[serde(default)]
    pub default: FieldValue,
}

impl FieldDescriptor {
    pub fn text(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            mode: ExtractionMode::Text,
            source: FieldSource::Live,
            default: FieldValue::Missing,
        }
    }

    pub fn text_content(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self { mode: ExtractionMode::TextContent, ..Self::text(name, locator) }
    }

    pub fn attribute(
        name: impl Into<String>,
        locator: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            mode: ExtractionMode::Attribute { name: attribute.into() },
            ..Self::text(name, locator)
        }
    }

    pub fn from_static(mut self) -> Self {
        self.source = FieldSource::Static;
        self
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = default;
        self
    }
}

/// Extract a field from the live session, substituting the default on any miss
pub async fn extract<S>(
    session: &mut S,
    descriptor: &FieldDescriptor,
    timeout: Duration,
) -> FieldValue
where
    S: RenderSession,
{
    extract_outcome(session, descriptor, timeout)
        .await
        .into_value(&descriptor.default)
}

/// Extract a field from the live session, keeping the reason for a miss
pub async fn extract_outcome<S>(
    session: &mut S,
    descriptor: &FieldDescriptor,
    timeout: Duration,
) -> FieldOutcome
where
    S: RenderSession,
{
    let lookup =
        tokio::time::timeout(timeout, session.wait_for_element(&descriptor.locator, timeout)).await;

    let element = match lookup {
        Ok(Ok(Some(element))) => element,
        Ok(Ok(None)) => return FieldOutcome::Missing(MissingReason::NotFound),
        Ok(Err(e)) => return FieldOutcome::from_error(e),
        Err(_) => return FieldOutcome::Missing(MissingReason::TimedOut),
    };

    let read = match &descriptor.mode {
        ExtractionMode::Text => session.read_text(&element).await.map(Some),
        ExtractionMode::TextContent => session.read_text_content(&element).await.map(Some),
        ExtractionMode::Attribute { name } => session.read_attribute(&element, name).await,
    };

    let outcome = match read {
        Ok(Some(text)) => FieldOutcome::Found(text.trim().to_string()),
        Ok(None) => FieldOutcome::Missing(MissingReason::NotFound),
        Err(e) => FieldOutcome::from_error(e),
    };

    if let FieldOutcome::Missing(reason) = &outcome {
        trace!("Field '{}' missing: {}", descriptor.name, reason);
    }
    outcome
}

/// Extract a field from a parsed static snapshot
pub fn extract_static(document: &Html, descriptor: &FieldDescriptor) -> FieldOutcome {
    let selector = match Selector::parse(&descriptor.locator) {
        Ok(selector) => selector,
        Err(e) => return FieldOutcome::Missing(MissingReason::Unreadable(e.to_string())),
    };

    let Some(element) = document.select(&selector).next() else {
        return FieldOutcome::Missing(MissingReason::NotFound);
    };

    match &descriptor.mode {
        ExtractionMode::Text => {
            let text: String = element.text().collect();
            FieldOutcome::Found(collapse_whitespace(&text))
        }
        ExtractionMode::TextContent => {
            let text: String = element.text().collect();
            FieldOutcome::Found(text.trim().to_string())
        }
        ExtractionMode::Attribute { name } => match element.value().attr(name) {
            Some(value) => FieldOutcome::Found(value.trim().to_string()),
            None => FieldOutcome::Missing(MissingReason::NotFound),
        },
    }
}
