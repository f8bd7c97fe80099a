//! Strongly-typed query predicate.

use crate::model::item::Item;
use crate::model::source::Source;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Parsed, immutable filter.
///
/// Dimensions combine with AND; values within `sources` and within `tags`
/// combine with OR. Empty sets and unset bounds do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub sources: BTreeSet<Source>,
    pub tags: BTreeSet<String>,
    /// Inclusive lower bound.
    pub from_date: Option<NaiveDateTime>,
    /// Inclusive upper bound.
    pub to_date: Option<NaiveDateTime>,
}

impl Query {
    /// Query matching every item.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unfiltered(&self) -> bool {
        self.sources.is_empty()
            && self.tags.is_empty()
            && self.from_date.is_none()
            && self.to_date.is_none()
    }

    pub fn includes_source(&self, source: Source) -> bool {
        self.sources.is_empty() || self.sources.contains(&source)
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.includes_source(item.source) && self.matches_within_source(item)
    }

    /// Tag and date checks only; the caller already selected the source.
    pub(crate) fn matches_within_source(&self, item: &Item) -> bool {
        if !self.tags.is_empty() && !item.has_any_tag(&self.tags) {
            return false;
        }
        if let Some(from) = self.from_date {
            if item.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to_date {
            if item.timestamp > to {
                return false;
            }
        }
        true
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.sources.is_empty() {
            let names: Vec<&str> = self.sources.iter().map(|s| s.as_str()).collect();
            parts.push(format!("source:{}", names.join(",")));
        }
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            parts.push(format!("tag:{}", tags.join(",")));
        }
        if let Some(from) = self.from_date {
            parts.push(format!("from:{}", format_bound(from)));
        }
        if let Some(to) = self.to_date {
            parts.push(format!("to:{}", format_bound(to)));
        }
        f.write_str(&parts.join(" "))
    }
}

fn format_bound(value: NaiveDateTime) -> String {
    let time = value.time();
    let start_of_day = time == NaiveTime::MIN;
    let end_of_day = time.hour() == 23 && time.minute() == 59 && time.second() == 59;
    if start_of_day || end_of_day {
        value.format("%Y-%m-%d").to_string()
    } else {
        value.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}
