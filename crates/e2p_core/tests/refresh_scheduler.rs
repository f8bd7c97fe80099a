use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use e2p_core::{
    CacheSnapshot, CacheStore, FetchError, FetchErrorKind, FetchResult, FetcherRegistry, Item,
    RefreshOutcome, RefreshPolicy, RefreshRequest, RefreshScheduler, SharedCache, Source,
    SourceFetcher,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn item(source: Source, id: &str) -> Item {
    let ts = NaiveDate::from_ymd_opt(2024, 4, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    Item::new(source, id, format!("item {id}"), ts).with_tags(["fixture"])
}

/// Fetcher returning scripted results and counting calls.
struct ScriptedFetcher {
    source: Source,
    results: Mutex<Vec<FetchResult<Vec<Item>>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedFetcher {
    fn new(source: Source, results: Vec<FetchResult<Vec<Item>>>) -> Arc<Self> {
        Arc::new(Self {
            source,
            results: Mutex::new(results),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(source: Source, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            results: Mutex::new(vec![Ok(vec![item(source, "late")])]),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceFetcher for ScriptedFetcher {
    fn source(&self) -> Source {
        self.source
    }

    fn fetch(&self) -> FetchResult<Vec<Item>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut results = self.results.lock().unwrap();
        if results.is_empty() {
            return Ok(Vec::new());
        }
        results.remove(0)
    }
}

fn network_error(source: Source) -> FetchError {
    FetchError::new(source, FetchErrorKind::Network, "connection reset")
}

fn scheduler_with(fetchers: Vec<Arc<ScriptedFetcher>>, cache: Arc<SharedCache>) -> RefreshScheduler {
    let mut registry = FetcherRegistry::new();
    for fetcher in fetchers {
        registry.register(fetcher).unwrap();
    }
    RefreshScheduler::new(registry, RefreshPolicy::default(), cache)
}

#[test]
fn successful_refresh_replaces_slice_and_sets_timestamp() {
    let fetcher = ScriptedFetcher::new(
        Source::Notes,
        vec![Ok(vec![item(Source::Notes, "a"), item(Source::Notes, "b")])],
    );
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![fetcher.clone()], cache.clone());

    let before = Utc::now();
    let update = scheduler.refresh(Source::Notes).unwrap();
    assert_eq!(update.count, 2);
    assert!(update.persisted());

    let snapshot = cache.current();
    assert_eq!(snapshot.items(Source::Notes).len(), 2);
    assert!(snapshot.last_refreshed(Source::Notes).unwrap() >= before);
    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn failed_refresh_keeps_previous_slice_and_timestamp() {
    let fetcher = ScriptedFetcher::new(
        Source::Tasks,
        vec![
            Ok(vec![item(Source::Tasks, "t1")]),
            Err(network_error(Source::Tasks)),
        ],
    );
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![fetcher], cache.clone());

    scheduler.refresh(Source::Tasks).unwrap();
    let before = cache.current();

    let err = scheduler.refresh(Source::Tasks).unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Network);
    assert!(err.retryable);

    let after = cache.current();
    assert_eq!(after.items(Source::Tasks), before.items(Source::Tasks));
    assert_eq!(
        after.last_refreshed(Source::Tasks),
        before.last_refreshed(Source::Tasks)
    );
}

#[test]
fn forced_run_invokes_each_named_fetcher_exactly_once() {
    let notes = ScriptedFetcher::new(Source::Notes, vec![Ok(vec![item(Source::Notes, "n")])]);
    let health = ScriptedFetcher::new(Source::Health, vec![Ok(vec![item(Source::Health, "h")])]);
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![notes.clone(), health.clone()], cache);

    let report = scheduler.run(&RefreshRequest::Force(vec![Source::Notes, Source::Notes]));
    assert_eq!(notes.calls(), 1);
    assert_eq!(health.calls(), 0);
    assert_eq!(report.succeeded(), vec![Source::Notes]);
    assert_eq!(report.entries.len(), 1);
}

#[test]
fn due_run_skips_fresh_sources() {
    let tasks = ScriptedFetcher::new(Source::Tasks, vec![Ok(vec![item(Source::Tasks, "t")])]);
    let notes = ScriptedFetcher::new(Source::Notes, vec![Ok(vec![item(Source::Notes, "n")])]);

    let fresh = Utc::now() - ChronoDuration::minutes(1);
    let stale = Utc::now() - ChronoDuration::hours(5);
    let snapshot = CacheSnapshot::empty()
        .with_slice(Source::Tasks, vec![item(Source::Tasks, "old")], fresh)
        .with_slice(Source::Notes, vec![item(Source::Notes, "old")], stale);
    let cache = Arc::new(SharedCache::new(snapshot));
    let scheduler = scheduler_with(vec![tasks.clone(), notes.clone()], cache.clone());

    let report = scheduler.run(&RefreshRequest::Due);
    assert_eq!(tasks.calls(), 0);
    assert_eq!(notes.calls(), 1);
    assert!(report
        .entries
        .iter()
        .any(|entry| entry.source == Source::Tasks && entry.outcome == RefreshOutcome::Skipped));
    assert_eq!(cache.current().items(Source::Notes)[0].id, "n");
    assert_eq!(cache.current().items(Source::Tasks)[0].id, "old");
}

#[test]
fn one_failing_source_does_not_affect_others() {
    let notes = ScriptedFetcher::new(Source::Notes, vec![Ok(vec![item(Source::Notes, "n")])]);
    let tasks = ScriptedFetcher::new(Source::Tasks, vec![Err(network_error(Source::Tasks))]);
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![notes, tasks], cache.clone());

    let report = scheduler.run(&RefreshRequest::Force(vec![Source::Tasks, Source::Notes]));
    assert_eq!(report.succeeded(), vec![Source::Notes]);
    assert_eq!(report.failed().len(), 1);
    assert!(!report.all_failed());
    assert_eq!(cache.current().items(Source::Notes).len(), 1);
    assert!(cache.current().last_refreshed(Source::Tasks).is_none());
}

#[test]
fn unregistered_source_fails_when_forced() {
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(Vec::new(), cache);

    let report = scheduler.run(&RefreshRequest::Force(vec![Source::Calendar]));
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, FetchErrorKind::NotRegistered);
    assert!(report.all_failed());
}

#[test]
fn slow_fetch_times_out_and_keeps_old_data() {
    let fetcher = ScriptedFetcher::slow(Source::Calendar, Duration::from_millis(500));
    let snapshot = CacheSnapshot::empty().with_slice(
        Source::Calendar,
        vec![item(Source::Calendar, "old")],
        Utc::now(),
    );
    let cache = Arc::new(SharedCache::new(snapshot));
    let scheduler = scheduler_with(vec![fetcher], cache.clone())
        .with_fetch_timeout(Duration::from_millis(50));

    let err = scheduler.refresh(Source::Calendar).unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Timeout);
    assert_eq!(cache.current().items(Source::Calendar)[0].id, "old");
}

#[test]
fn invalid_batches_are_rejected() {
    let duplicate = ScriptedFetcher::new(
        Source::Notes,
        vec![Ok(vec![item(Source::Notes, "same"), item(Source::Notes, "same")])],
    );
    let foreign = ScriptedFetcher::new(Source::Health, vec![Ok(vec![item(Source::Notes, "x")])]);
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![duplicate, foreign], cache.clone());

    let err = scheduler.refresh(Source::Notes).unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::InvalidItems);
    let err = scheduler.refresh(Source::Health).unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::InvalidItems);
    assert!(cache.current().is_empty());
}

#[test]
fn readers_keep_their_snapshot_during_a_refresh() {
    let fetcher = ScriptedFetcher::new(Source::Notes, vec![Ok(vec![item(Source::Notes, "new")])]);
    let snapshot = CacheSnapshot::empty().with_slice(
        Source::Notes,
        vec![item(Source::Notes, "old")],
        Utc::now() - ChronoDuration::days(1),
    );
    let cache = Arc::new(SharedCache::new(snapshot));
    let scheduler = scheduler_with(vec![fetcher], cache.clone());

    let held = cache.current();
    scheduler.refresh(Source::Notes).unwrap();

    assert_eq!(held.items(Source::Notes)[0].id, "old");
    assert_eq!(cache.current().items(Source::Notes)[0].id, "new");
}

#[test]
fn successful_refresh_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("cache.json"));
    let fetcher = ScriptedFetcher::new(Source::Articles, vec![Ok(vec![item(Source::Articles, "u")])]);
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![fetcher], cache).with_store(store.clone());

    scheduler.refresh(Source::Articles).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.items(Source::Articles)[0].id, "u");
    assert!(reloaded.last_refreshed(Source::Articles).is_some());
}

#[test]
fn failed_save_is_reported_while_the_slice_stays_published() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "plain file").unwrap();
    let store = CacheStore::new(blocker.join("cache.json"));
    let fetcher = ScriptedFetcher::new(Source::Health, vec![Ok(vec![item(Source::Health, "d")])]);
    let cache = Arc::new(SharedCache::default());
    let scheduler = scheduler_with(vec![fetcher], cache.clone()).with_store(store);

    let report = scheduler.run(&RefreshRequest::Force(vec![Source::Health]));

    let RefreshOutcome::Refreshed(update) = &report.entries[0].outcome else {
        panic!("expected a refreshed outcome, got {:?}", report.entries[0].outcome);
    };
    assert_eq!(update.count, 1);
    assert!(!update.persisted());
    assert_eq!(report.unsaved().len(), 1);
    assert_eq!(report.unsaved()[0].0, Source::Health);
    assert!(!report.all_failed());
    assert_eq!(cache.current().items(Source::Health).len(), 1);
}
