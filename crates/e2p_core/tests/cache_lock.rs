use chrono::NaiveDate;
use e2p_core::{
    CacheError, CacheLock, CacheStore, FetchResult, FetcherRegistry, Item, RefreshPolicy,
    RefreshRequest, RefreshScheduler, SharedCache, Source, SourceFetcher,
};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct FixedFetcher(Source);

impl SourceFetcher for FixedFetcher {
    fn source(&self) -> Source {
        self.0
    }

    fn fetch(&self) -> FetchResult<Vec<Item>> {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        Ok(vec![Item::new(self.0, "only", "fixture", ts)])
    }
}

/// One full writer cycle the way a refresh process runs it: load, refresh, save.
fn refresh_from_disk(cache_path: &Path, source: Source) {
    let store = CacheStore::new(cache_path);
    let cache = Arc::new(SharedCache::new(store.load_or_empty().unwrap()));
    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(FixedFetcher(source))).unwrap();
    let report = RefreshScheduler::new(registry, RefreshPolicy::default(), cache)
        .with_store(store)
        .run(&RefreshRequest::Force(vec![source]));
    assert!(report.unsaved().is_empty());
}

#[test]
fn writers_holding_the_lock_do_not_lose_each_others_slices() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let lock_path = dir.path().join("cache.json.lock");

    let first = CacheLock::acquire(&lock_path, Duration::from_secs(5)).unwrap();

    let second = {
        let cache_path = cache_path.clone();
        let lock_path = lock_path.clone();
        thread::spawn(move || {
            let _held = CacheLock::acquire(&lock_path, Duration::from_secs(10)).unwrap();
            refresh_from_disk(&cache_path, Source::Tasks);
        })
    };

    // The second writer must still be waiting: its snapshot would predate ours.
    thread::sleep(Duration::from_millis(200));
    assert!(!cache_path.exists());
    refresh_from_disk(&cache_path, Source::Notes);
    drop(first);

    second.join().unwrap();
    let merged = CacheStore::new(&cache_path).load().unwrap();
    assert_eq!(merged.items(Source::Notes).len(), 1);
    assert_eq!(merged.items(Source::Tasks).len(), 1);
}

#[test]
fn impatient_writer_gives_up_with_a_lock_error() {
    let dir = tempfile::tempdir().unwrap();
    let lock_path = dir.path().join("cache.json.lock");
    let _held = CacheLock::acquire(&lock_path, Duration::from_secs(1)).unwrap();

    let contender = lock_path.clone();
    let err = thread::spawn(move || {
        CacheLock::acquire(contender, Duration::from_millis(100)).map(drop)
    })
    .join()
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, CacheError::Locked { ref path, .. } if path == &lock_path));
    assert!(err.to_string().contains("cache.json.lock"));
}
