//! Query language guide generated from live cache contents.

use super::stats::tags_by_source;
use crate::cache::CacheSnapshot;
use crate::model::source::Source;
use std::collections::BTreeMap;
use std::fmt::Write;

const MISSING_DESCRIPTION: &str = "No description available";

/// Human-written tag descriptions, keyed by source then tag.
///
/// Loading these is the caller's concern; an empty set is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDescriptions {
    by_source: BTreeMap<Source, BTreeMap<String, String>>,
}

impl TagDescriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Source, tag: impl Into<String>, description: impl Into<String>) {
        self.by_source
            .entry(source)
            .or_default()
            .insert(tag.into().trim().to_lowercase(), description.into());
    }

    pub fn get(&self, source: Source, tag: &str) -> Option<&str> {
        self.by_source
            .get(&source)
            .and_then(|tags| tags.get(tag))
            .map(String::as_str)
    }
}

/// Renders the markdown query guide for `snapshot`.
pub fn render_help(snapshot: &CacheSnapshot, descriptions: &TagDescriptions) -> String {
    let stats = snapshot.tag_stats();
    let available: Vec<Source> = Source::ALL
        .into_iter()
        .filter(|source| !snapshot.items(*source).is_empty())
        .collect();

    let mut out = String::new();
    out.push_str("# Everything2Prompt Query Language Guide\n\n");
    out.push_str("## Overview\n");
    out.push_str(
        "The query language filters items cached from your personal data sources \
         (notes, tasks, saved articles, calendar events and health records) with a \
         compact text syntax.\n\n",
    );
    out.push_str(
        "Always pick the most relevant sources and an appropriate date range, \
         otherwise the result may be very long.\n\n",
    );

    out.push_str("## Query Format\n```\n");
    out.push_str("source:source1,source2 tag:tag1,tag2 from:YYYY-MM-DD to:YYYY-MM-DD\n```\n\n");
    out.push_str(
        "Meaning: \"find every item in the date range that is in (source1 or source2) \
         AND has (tag1 or tag2)\".\n\n",
    );

    out.push_str("## Available Sources\n");
    if available.is_empty() {
        out.push_str("The cache is empty; no source has been fetched yet.\n\n");
    } else {
        for source in &available {
            let _ = writeln!(
                out,
                "- `{}` ({} items, also accepted as `{}`)",
                source.as_str(),
                snapshot.items(*source).len(),
                source.upstream_name()
            );
        }
        out.push_str("\nOnly query these sources.\n\n");
    }

    out.push_str("## Available Tags by Source\n");
    for source in &available {
        let tags = tags_by_source(stats, *source);
        if tags.is_empty() {
            let _ = writeln!(out, "**{}**: No tags available\n", source.display_name());
            continue;
        }
        let _ = writeln!(out, "**{}**:", source.display_name());
        for (tag, count) in tags {
            let description = descriptions
                .get(*source, tag)
                .unwrap_or(MISSING_DESCRIPTION);
            let _ = writeln!(out, "  - {tag}({count}): {description}");
        }
        out.push('\n');
    }
    out.push_str(
        "**Note**: the more common tags usually give better results with more relevant items.\n\n",
    );

    out.push_str(PARAMETERS_GUIDE);
    out
}

const PARAMETERS_GUIDE: &str = "## Query Parameters

### source
Filter by data source. Separate several sources with commas.
- **Format**: `source:notes,tasks,articles,calendar,health`
- **Examples**:
  - `source:notes` - only notes
  - `source:tasks,calendar` - tasks and calendar events

### tag
Filter by tags. Separate several tags with commas; an item matches when it has any of them.
- **Format**: `tag:tag1,tag2`
- **Examples**:
  - `tag:health` - items tagged `health`
  - `tag:work,project` - items tagged `work` or `project`

### from
Items on or after a date.
- **Format**: `from:YYYY-MM-DD`, `from:[+-]N(d|w|m|y)` or `from:now`

### to
Items on or before a date (the whole day is included).
- **Format**: `to:YYYY-MM-DD`, `to:[+-]N(d|w|m|y)` or `to:now`

## Date Formats

### Absolute Dates
- `YYYY-MM-DD`, e.g. `2025-01-01`

### Relative Dates
- `now`: the current date and time
- `-7d`: 7 days ago
- `+2w`: 2 weeks from now
- `-1m`: 1 month ago (30 days)
- `-1y`: 1 year ago (365 days)

## Example Queries

1. All health-related items: `tag:health`
2. Work-related notes: `source:notes tag:work`
3. Tasks and calendar events in 2025: `source:tasks,calendar from:2025-01-01 to:2025-12-31`
4. Work items from the last week: `tag:work from:-7d`
5. Upcoming calendar events: `source:calendar from:now to:+1m`

## Tips
- Parameters can be combined in any order; repeated `source:` or `tag:` parameters add to each other.
- Without `source:` every source is searched; without `tag:` every tag is included.
- Without a date range every date is included.
- Results are grouped by source in the order notes, tasks, articles, calendar, health.
- A bad date rejects the query; unknown sources and parameters are ignored with a warning.
";
