//! Specification key/value harvesting from alternative markup layouts.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::text::{clean_text, remove_key_from_value};

/// Structural shape of a specification layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    /// `tr` rows: key in the first `th`/`td`, value in the last `td`
    Table,
    /// `li` items: key in `span.a-text-bold`, value in the first other `span`
    BulletList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecLayout {
    pub name: String,
    pub selector: String,
    pub kind: LayoutKind,
}

impl SpecLayout {
    pub fn new(name: impl Into<String>, selector: impl Into<String>, kind: LayoutKind) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            kind,
        }
    }
}

/// The four product-detail layouts, in merge priority order.
/// Later layouts overwrite earlier ones for the same key.
pub fn default_layouts() -> Vec<SpecLayout> {
    vec![
        SpecLayout::new("first_table", ".a-normal.a-spacing-micro", LayoutKind::Table),
        SpecLayout::new("tech_specs", "#productDetails_techSpec_section_1", LayoutKind::Table),
        SpecLayout::new(
            "right_table",
            "#productDetails_detailBullets_sections1",
            LayoutKind::Table,
        ),
        SpecLayout::new(
            "new_table",
            "ul.a-unordered-list.a-nostyle.a-vertical.a-spacing-none.detail-bullet-list",
            LayoutKind::BulletList,
        ),
    ]
}

fn selector(source: &str) -> Option<Selector> {
    match Selector::parse(source) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Skipping unparsable layout selector '{}': {}", source, e);
            None
        }
    }
}

fn joined_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Harvest cleaned key/value pairs from every present layout, in layout order
/// then document order. Absent layouts contribute nothing.
pub fn harvest_specifications(document: &Html, layouts: &[SpecLayout]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for layout in layouts {
        let Some(container_selector) = selector(&layout.selector) else {
            continue;
        };
        let Some(container) = document.select(&container_selector).next() else {
            debug!("Layout '{}' not present", layout.name);
            continue;
        };

        let before = pairs.len();
        match layout.kind {
            // Skips rows whose only cell would serve as both key and value
            LayoutKind::Table => harvest_table(container, &mut pairs),
            LayoutKind::BulletList => harvest_bullets(container, &mut pairs),
        }
        debug!("Layout '{}' yielded {} pairs", layout.name, pairs.len() - before);
    }

    pairs
}

fn harvest_table(table: ElementRef<'_>, pairs: &mut Vec<(String, String)>) {
    let (Some(rows), Some(key_cells), Some(value_cells)) =
        (selector("tr"), selector("th, td"), selector("td"))
    else {
        return;
    };

    for row in table.select(&rows) {
        let Some(key_cell) = row.select(&key_cells).next() else {
            continue;
        };
        let Some(value_cell) = row.select(&value_cells).last() else {
            continue;
        };
        // Single-cell rows (section headings, colspan notes) carry no pair and
        // are dropped rather than recorded as a key equal to its own value
        if key_cell.id() == value_cell.id() {
            continue;
        }

        let key = clean_text(&joined_text(key_cell));
        if key.is_empty() {
            continue;
        }
        let value = remove_key_from_value(&key, &joined_text(value_cell));
        pairs.push((key, value));
    }
}

fn harvest_bullets(list: ElementRef<'_>, pairs: &mut Vec<(String, String)>) {
    let (Some(items), Some(labels), Some(spans)) =
        (selector("li"), selector("span.a-text-bold"), selector("span"))
    else {
        return;
    };

    for item in list.select(&items) {
        let Some(label) = item.select(&labels).next() else {
            continue;
        };
        let Some(value_span) = item
            .select(&spans)
            .find(|span| span.value().classes().all(|class| class != "a-text-bold"))
        else {
            continue;
        };

        let key = clean_text(&joined_text(label).replace(':', ""));
        if key.is_empty() {
            continue;
        }
        let value = remove_key_from_value(&key, &joined_text(value_span));
        pairs.push((key, value));
    }
}
