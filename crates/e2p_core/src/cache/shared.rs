//! In-process snapshot publication.

use super::CacheSnapshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Holder of the currently published snapshot.
///
/// Readers take a cheap `Arc` clone and keep working on it for as long as
/// they need; writers build a complete new snapshot and swap it in.
#[derive(Debug, Default)]
pub struct SharedCache {
    current: RwLock<Arc<CacheSnapshot>>,
    writer: Mutex<()>,
}

impl SharedCache {
    pub fn new(snapshot: CacheSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    /// Returns the latest published snapshot.
    pub fn current(&self) -> Arc<CacheSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acquires the single-writer section.
    ///
    /// Held across read-modify-publish so two writers replacing different
    /// sources cannot lose each other's slice.
    pub fn writer(&self) -> CacheWriter<'_> {
        CacheWriter {
            cache: self,
            _guard: self.writer.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn swap(&self, snapshot: CacheSnapshot) -> Arc<CacheSnapshot> {
        let published = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&published);
        published
    }
}

/// Scoped exclusive write access to a [`SharedCache`].
pub struct CacheWriter<'a> {
    cache: &'a SharedCache,
    _guard: MutexGuard<'a, ()>,
}

impl CacheWriter<'_> {
    /// Snapshot the next publish should be derived from.
    pub fn base(&self) -> Arc<CacheSnapshot> {
        self.cache.current()
    }

    /// Publishes `snapshot` to all subsequent readers.
    pub fn publish(&self, snapshot: CacheSnapshot) -> Arc<CacheSnapshot> {
        self.cache.swap(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::SharedCache;
    use crate::cache::CacheSnapshot;
    use crate::model::item::Item;
    use crate::model::source::Source;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn readers_keep_their_snapshot_across_publish() {
        let cache = SharedCache::new(CacheSnapshot::empty());
        let before = cache.current();

        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        {
            let writer = cache.writer();
            let next = writer.base().with_slice(
                Source::Tasks,
                vec![Item::new(Source::Tasks, "1", "task", ts)],
                Utc::now(),
            );
            writer.publish(next);
        }

        assert!(before.is_empty());
        assert_eq!(cache.current().items(Source::Tasks).len(), 1);
    }
}
