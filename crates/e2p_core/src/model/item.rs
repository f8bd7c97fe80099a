//! Item domain model.
//!
//! # Responsibility
//! - Define the canonical record every source adapter produces.
//! - Normalize tags on entry so the query engine can compare them directly.
//!
//! # Invariants
//! - `tags` are trimmed, lowercase, deduplicated and never blank.
//! - `timestamp` is always present and timezone-naive.
//! - `id` and `title` are never blank once `validate()` passes.

use super::source::Source;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque source-specific key/value data.
pub type Metadata = BTreeMap<String, Value>;

/// The unit of search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique within `source`.
    pub id: String,
    pub source: Source,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation, due, event or recorded date depending on the source.
    pub timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Validation failures for adapter-produced items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    BlankId { source: Source },
    BlankTitle { source: Source, id: String },
}

impl Display for ItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId { source } => write!(f, "{source} item has a blank id"),
            Self::BlankTitle { source, id } => {
                write!(f, "{source} item `{id}` has a blank title")
            }
        }
    }
}

impl Error for ItemValidationError {}

impl Item {
    /// Creates an item with no body, tags or metadata.
    pub fn new(
        source: Source,
        id: impl Into<String>,
        title: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            body: None,
            tags: BTreeSet::new(),
            timestamp,
            metadata: Metadata::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = if body.trim().is_empty() {
            None
        } else {
            Some(body)
        };
        self
    }

    /// Replaces the tag set, normalizing every value.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks the fields the cache relies on for identity and display.
    pub fn validate(&self) -> Result<(), ItemValidationError> {
        if self.id.trim().is_empty() {
            return Err(ItemValidationError::BlankId {
                source: self.source,
            });
        }
        if self.title.trim().is_empty() {
            return Err(ItemValidationError::BlankTitle {
                source: self.source,
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Returns whether the item carries at least one of `tags`.
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

/// Normalizes one tag value. Returns `None` for blank input.
pub fn normalize_tag(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Normalizes and deduplicates a tag list.
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| normalize_tag(tag.as_ref()))
        .collect()
}
