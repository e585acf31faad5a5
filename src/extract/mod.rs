//! Turning one product page into a [`ProductRecord`].

pub mod field;
pub mod layouts;
pub mod record;
pub mod reviews;
pub mod text;

pub use field::{
    extract, extract_outcome, extract_static, ExtractionMode, FieldDescriptor, FieldOutcome,
    FieldSource, FieldValue, MissingReason,
};
pub use layouts::{default_layouts, harvest_specifications, LayoutKind, SpecLayout};
pub use record::{BuildOptions, ProductRecord, RecordBuilder, RecordStatus};
pub use reviews::{harvest_reviews, ReviewEntry, ReviewPolicy, ReviewSelectors};
pub use text::{clean_text, collapse_whitespace, remove_key_from_value};
