//! Tag statistics over a snapshot, used for generated help text.

use crate::cache::CacheSnapshot;
use crate::model::source::Source;
use std::collections::{BTreeMap, BTreeSet};

/// Usage of one tag across the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagStats {
    /// Number of items carrying the tag, across all sources.
    pub count: usize,
    pub sources: BTreeSet<Source>,
}

pub type TagStatsMap = BTreeMap<String, TagStats>;

/// Aggregates tag usage over every item in `snapshot`.
pub fn compute_tag_stats(snapshot: &CacheSnapshot) -> TagStatsMap {
    let mut stats = TagStatsMap::new();
    for (source, items) in snapshot.items_by_source() {
        for item in items {
            for tag in &item.tags {
                let entry = stats.entry(tag.clone()).or_default();
                entry.count += 1;
                entry.sources.insert(source);
            }
        }
    }
    stats
}

/// Tags used by `source`, most common first, ties by name.
///
/// Counts are cache-wide, not per source.
pub fn tags_by_source(stats: &TagStatsMap, source: Source) -> Vec<(&str, usize)> {
    let mut tags: Vec<(&str, usize)> = stats
        .iter()
        .filter(|(_, stat)| stat.sources.contains(&source))
        .map(|(tag, stat)| (tag.as_str(), stat.count))
        .collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    tags
}

#[cfg(test)]
mod tests {
    use super::{compute_tag_stats, tags_by_source};
    use crate::cache::CacheSnapshot;
    use crate::model::item::Item;
    use crate::model::source::Source;
    use chrono::{NaiveDate, Utc};

    fn item(source: Source, id: &str, tags: &[&str]) -> Item {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Item::new(source, id, id, ts).with_tags(tags.iter().copied())
    }

    #[test]
    fn counts_items_and_collects_sources() {
        let now = Utc::now();
        let snapshot = CacheSnapshot::empty()
            .with_slice(
                Source::Notes,
                vec![
                    item(Source::Notes, "a", &["work", "health"]),
                    item(Source::Notes, "b", &["work"]),
                ],
                now,
            )
            .with_slice(
                Source::Articles,
                vec![item(Source::Articles, "c", &["health"])],
                now,
            );

        let stats = compute_tag_stats(&snapshot);
        assert_eq!(stats["work"].count, 2);
        assert_eq!(stats["work"].sources.len(), 1);
        assert_eq!(stats["health"].count, 2);
        assert!(stats["health"].sources.contains(&Source::Articles));
        assert!(stats["health"].sources.contains(&Source::Notes));
    }

    #[test]
    fn tags_by_source_orders_by_count_then_name() {
        let now = Utc::now();
        let snapshot = CacheSnapshot::empty().with_slice(
            Source::Notes,
            vec![
                item(Source::Notes, "a", &["zeta", "beta"]),
                item(Source::Notes, "b", &["zeta", "alpha"]),
            ],
            now,
        );
        let stats = compute_tag_stats(&snapshot);
        let ordered = tags_by_source(&stats, Source::Notes);
        assert_eq!(ordered, vec![("zeta", 2), ("alpha", 1), ("beta", 1)]);
        assert!(tags_by_source(&stats, Source::Health).is_empty());
    }
}
