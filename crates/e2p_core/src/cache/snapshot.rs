//! Immutable cache snapshot.

use crate::model::item::Item;
use crate::model::source::Source;
use crate::query::stats::{compute_tag_stats, TagStatsMap};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cached items of one source plus the time of its last successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSlice {
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Full picture of all cached items across all sources.
///
/// Slices are `Arc`-shared: replacing one source produces a new snapshot
/// that reuses every other slice untouched.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    slices: BTreeMap<Source, Arc<SourceSlice>>,
    tag_stats: OnceCell<TagStatsMap>,
}

impl CacheSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from already-loaded slices.
    pub fn from_slices(slices: BTreeMap<Source, Arc<SourceSlice>>) -> Self {
        Self {
            slices,
            tag_stats: OnceCell::new(),
        }
    }

    pub fn slice(&self, source: Source) -> Option<&SourceSlice> {
        self.slices.get(&source).map(Arc::as_ref)
    }

    pub(crate) fn slices(&self) -> &BTreeMap<Source, Arc<SourceSlice>> {
        &self.slices
    }

    /// Items of `source` in stored order. Empty when never fetched.
    pub fn items(&self, source: Source) -> &[Item] {
        self.slice(source)
            .map(|slice| slice.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_refreshed(&self, source: Source) -> Option<DateTime<Utc>> {
        self.slice(source).and_then(|slice| slice.last_refreshed)
    }

    /// Per-source item sequences in canonical source order.
    pub fn items_by_source(&self) -> impl Iterator<Item = (Source, &[Item])> + '_ {
        self.slices
            .iter()
            .map(|(source, slice)| (*source, slice.items.as_slice()))
    }

    pub fn total_items(&self) -> usize {
        self.slices.values().map(|slice| slice.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }

    /// Returns a new snapshot with `source` fully replaced.
    ///
    /// `self` is left untouched; every other slice is shared.
    pub fn with_slice(
        &self,
        source: Source,
        items: Vec<Item>,
        refreshed_at: DateTime<Utc>,
    ) -> CacheSnapshot {
        let mut slices = self.slices.clone();
        slices.insert(
            source,
            Arc::new(SourceSlice {
                last_refreshed: Some(refreshed_at),
                items,
            }),
        );
        Self::from_slices(slices)
    }

    /// Tag statistics for this snapshot, computed on first use.
    pub fn tag_stats(&self) -> &TagStatsMap {
        self.tag_stats.get_or_init(|| compute_tag_stats(self))
    }
}

impl PartialEq for CacheSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.slices == other.slices
    }
}
