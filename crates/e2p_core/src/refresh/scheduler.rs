//! Refresh orchestration.
//!
//! # Responsibility
//! - Decide per source whether a refresh is due, or force it on request.
//! - Run fetches with a bounded timeout, in parallel across sources.
//! - Replace a source slice wholesale, publish, then persist.
//!
//! # Invariants
//! - A failed fetch leaves the source slice and its `last_refreshed` as they were.
//! - A failure in one source never touches another source.
//! - Read-modify-publish happens under the cache writer section.

use super::fetcher::{FetchError, FetchErrorKind, FetchResult, FetcherRegistry, SourceFetcher};
use super::policy::RefreshPolicy;
use crate::cache::{CacheStore, SharedCache};
use crate::model::item::Item;
use crate::model::source::Source;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default bound on a single source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(120);

/// What a refresh run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    /// Apply the interval policy to every registered source.
    Due,
    /// Refresh exactly these sources, ignoring intervals.
    Force(Vec<Source>),
}

impl RefreshRequest {
    /// Empty list means "apply the interval policy".
    pub fn from_sources(sources: Vec<Source>) -> Self {
        if sources.is_empty() {
            Self::Due
        } else {
            Self::Force(sources)
        }
    }
}

/// A published slice replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceUpdate {
    /// Items now cached for the source.
    pub count: usize,
    /// Set when the snapshot was published in memory but writing the cache
    /// file failed.
    pub save_error: Option<String>,
}

impl SliceUpdate {
    pub fn persisted(&self) -> bool {
        self.save_error.is_none()
    }
}

/// Result of one source within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(SliceUpdate),
    /// Still fresh under the interval policy.
    Skipped,
    Failed(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: Source,
    pub outcome: RefreshOutcome,
}

/// Per-source outcomes of one run, in canonical source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub run_id: Uuid,
    pub entries: Vec<SourceReport>,
}

impl RefreshReport {
    pub fn succeeded(&self) -> Vec<Source> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, RefreshOutcome::Refreshed(_)))
            .map(|entry| entry.source)
            .collect()
    }

    pub fn failed(&self) -> Vec<&FetchError> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                RefreshOutcome::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Refreshed sources whose snapshot never reached the cache file.
    pub fn unsaved(&self) -> Vec<(Source, &str)> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                RefreshOutcome::Refreshed(SliceUpdate {
                    save_error: Some(err),
                    ..
                }) => Some((entry.source, err.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Number of sources a fetch was attempted for.
    pub fn attempted(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !matches!(entry.outcome, RefreshOutcome::Skipped))
            .count()
    }

    /// At least one attempt, and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.attempted() > 0 && self.succeeded().is_empty()
    }
}

/// Drives source fetchers into the shared cache.
#[derive(Debug)]
pub struct RefreshScheduler {
    registry: FetcherRegistry,
    policy: RefreshPolicy,
    cache: Arc<SharedCache>,
    store: Option<CacheStore>,
    fetch_timeout: Duration,
}

impl RefreshScheduler {
    /// Creates an in-memory scheduler; see [`RefreshScheduler::with_store`].
    pub fn new(registry: FetcherRegistry, policy: RefreshPolicy, cache: Arc<SharedCache>) -> Self {
        Self {
            registry,
            policy,
            cache,
            store: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Persists every successful slice replacement to `store`.
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &FetcherRegistry {
        &self.registry
    }

    /// Whether `source` is stale at `now` under the configured interval.
    pub fn should_refresh(&self, source: Source, now: DateTime<Utc>) -> bool {
        let last = self.cache.current().last_refreshed(source);
        self.policy.is_due(source, now, last)
    }

    /// Force-refreshes one source through its registered fetcher.
    ///
    /// Returns the item count now cached for `source` and whether the
    /// snapshot reached the cache file.
    pub fn refresh(&self, source: Source) -> FetchResult<SliceUpdate> {
        match self.registry.get(source) {
            Some(fetcher) => self.refresh_with(source, fetcher),
            None => {
                let err = FetchError::new(
                    source,
                    FetchErrorKind::NotRegistered,
                    "no fetcher registered",
                );
                warn!(
                    "event=refresh_source module=refresh status=error source={} error_code={}",
                    source,
                    err.kind.as_str()
                );
                Err(err)
            }
        }
    }

    /// Force-refreshes `source` using `fetcher`.
    ///
    /// # Errors
    /// - Any fetch failure, timeout, or invalid item batch. The cached slice
    ///   for `source` is left untouched in every error case.
    ///
    /// A failed save is not an error: the slice is already published, and
    /// the failure is carried in [`SliceUpdate::save_error`].
    pub fn refresh_with(
        &self,
        source: Source,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> FetchResult<SliceUpdate> {
        let started_at = Instant::now();
        info!(
            "event=refresh_source module=refresh status=start source={}",
            source
        );

        let fetched = fetch_with_timeout(source, fetcher, self.fetch_timeout)
            .and_then(|items| validate_batch(source, &items).map(|()| items));
        let items = match fetched {
            Ok(items) => items,
            Err(err) => {
                error!(
                    "event=refresh_source module=refresh status=error source={} duration_ms={} error_code={} error={}",
                    source,
                    started_at.elapsed().as_millis(),
                    err.kind.as_str(),
                    err.message
                );
                return Err(err);
            }
        };

        let count = items.len();
        let save_error = {
            let writer = self.cache.writer();
            let next = writer.base().with_slice(source, items, Utc::now());
            let published = writer.publish(next);
            self.store
                .as_ref()
                .and_then(|store| store.save(&published).err())
                .map(|err| err.to_string())
        };

        match &save_error {
            None => info!(
                "event=refresh_source module=refresh status=ok source={} count={} duration_ms={}",
                source,
                count,
                started_at.elapsed().as_millis()
            ),
            Some(err) => error!(
                "event=refresh_source module=refresh status=unsaved source={} count={} duration_ms={} error={}",
                source,
                count,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        Ok(SliceUpdate { count, save_error })
    }

    /// Executes one refresh run.
    ///
    /// Fetches for different sources run concurrently; each one publishes
    /// its own slice as soon as it succeeds.
    pub fn run(&self, request: &RefreshRequest) -> RefreshReport {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        let now = Utc::now();

        let (attempts, skipped): (Vec<Source>, Vec<Source>) = match request {
            RefreshRequest::Due => self
                .registry
                .sources()
                .into_iter()
                .partition(|source| self.should_refresh(*source, now)),
            RefreshRequest::Force(sources) => {
                let unique: BTreeSet<Source> = sources.iter().copied().collect();
                (unique.into_iter().collect(), Vec::new())
            }
        };

        info!(
            "event=refresh_run module=refresh status=start run_id={} mode={} attempts={} skipped={}",
            run_id,
            match request {
                RefreshRequest::Due => "due",
                RefreshRequest::Force(_) => "force",
            },
            attempts.len(),
            skipped.len()
        );

        let mut entries: Vec<SourceReport> = thread::scope(|scope| {
            let handles: Vec<_> = attempts
                .iter()
                .map(|&source| (source, scope.spawn(move || self.refresh(source))))
                .collect();
            handles
                .into_iter()
                .map(|(source, handle)| {
                    let outcome = match handle.join() {
                        Ok(Ok(update)) => RefreshOutcome::Refreshed(update),
                        Ok(Err(err)) => RefreshOutcome::Failed(err),
                        Err(_) => RefreshOutcome::Failed(FetchError::new(
                            source,
                            FetchErrorKind::Internal,
                            "refresh worker panicked",
                        )),
                    };
                    SourceReport { source, outcome }
                })
                .collect()
        });
        entries.extend(skipped.into_iter().map(|source| SourceReport {
            source,
            outcome: RefreshOutcome::Skipped,
        }));
        entries.sort_by_key(|entry| entry.source);

        let report = RefreshReport { run_id, entries };
        info!(
            "event=refresh_run module=refresh status=ok run_id={} refreshed={} failed={} unsaved={} duration_ms={}",
            run_id,
            report.succeeded().len(),
            report.failed().len(),
            report.unsaved().len(),
            started_at.elapsed().as_millis()
        );
        report
    }
}

fn fetch_with_timeout(
    source: Source,
    fetcher: Arc<dyn SourceFetcher>,
    timeout: Duration,
) -> FetchResult<Vec<Item>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("fetch-{source}"))
        .spawn(move || {
            // Receiver is gone after a timeout; the late result is dropped.
            let _ = tx.send(fetcher.fetch());
        })
        .map_err(|err| {
            FetchError::new(
                source,
                FetchErrorKind::Internal,
                format!("failed to spawn fetch worker: {err}"),
            )
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(FetchError::new(
            source,
            FetchErrorKind::Timeout,
            format!("no result within {} ms", timeout.as_millis()),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(FetchError::new(
            source,
            FetchErrorKind::Internal,
            "fetch worker exited without a result",
        )),
    }
}

fn validate_batch(source: Source, items: &[Item]) -> FetchResult<()> {
    let invalid = |message: String| FetchError::new(source, FetchErrorKind::InvalidItems, message);
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if item.source != source {
            return Err(invalid(format!(
                "item `{}` belongs to source {}",
                item.id, item.source
            )));
        }
        item.validate().map_err(|err| invalid(err.to_string()))?;
        if !seen.insert(item.id.as_str()) {
            return Err(invalid(format!("duplicate item id `{}`", item.id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        validate_batch, RefreshOutcome, RefreshReport, RefreshRequest, SliceUpdate, SourceReport,
    };
    use crate::model::item::Item;
    use crate::model::source::Source;
    use crate::refresh::fetcher::FetchErrorKind;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn item(source: Source, id: &str) -> Item {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Item::new(source, id, "title", ts)
    }

    #[test]
    fn empty_source_list_means_due_policy() {
        assert_eq!(RefreshRequest::from_sources(vec![]), RefreshRequest::Due);
        assert_eq!(
            RefreshRequest::from_sources(vec![Source::Notes]),
            RefreshRequest::Force(vec![Source::Notes])
        );
    }

    #[test]
    fn batch_validation_rejects_foreign_and_duplicate_items() {
        let foreign = validate_batch(Source::Notes, &[item(Source::Tasks, "1")]).unwrap_err();
        assert_eq!(foreign.kind, FetchErrorKind::InvalidItems);

        let duplicate = validate_batch(
            Source::Notes,
            &[item(Source::Notes, "a"), item(Source::Notes, "a")],
        )
        .unwrap_err();
        assert!(duplicate.message.contains("duplicate"));

        let blank = validate_batch(Source::Notes, &[item(Source::Notes, "")]).unwrap_err();
        assert_eq!(blank.kind, FetchErrorKind::InvalidItems);

        assert!(validate_batch(Source::Notes, &[item(Source::Notes, "a")]).is_ok());
    }

    #[test]
    fn empty_report_is_not_a_total_failure() {
        let report = RefreshReport {
            run_id: Uuid::new_v4(),
            entries: vec![],
        };
        assert!(!report.all_failed());
        assert_eq!(report.attempted(), 0);
    }

    #[test]
    fn unsaved_lists_refreshes_that_missed_the_file() {
        let report = RefreshReport {
            run_id: Uuid::new_v4(),
            entries: vec![
                SourceReport {
                    source: Source::Notes,
                    outcome: RefreshOutcome::Refreshed(SliceUpdate {
                        count: 3,
                        save_error: None,
                    }),
                },
                SourceReport {
                    source: Source::Tasks,
                    outcome: RefreshOutcome::Refreshed(SliceUpdate {
                        count: 1,
                        save_error: Some("disk full".to_string()),
                    }),
                },
            ],
        };
        assert_eq!(report.succeeded(), vec![Source::Notes, Source::Tasks]);
        assert_eq!(report.unsaved(), vec![(Source::Tasks, "disk full")]);
        assert!(!report.all_failed());
    }
}
