//! Per-source staleness policy.

use crate::model::source::Source;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default interval for the fast-changing task source.
pub const FAST_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Default interval for every other source.
pub const SLOW_REFRESH_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Independently configured refresh interval per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPolicy {
    intervals: BTreeMap<Source, Duration>,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        let intervals = Source::ALL
            .into_iter()
            .map(|source| (source, default_interval(source)))
            .collect();
        Self { intervals }
    }
}

impl RefreshPolicy {
    pub fn interval(&self, source: Source) -> Duration {
        self.intervals
            .get(&source)
            .copied()
            .unwrap_or_else(|| default_interval(source))
    }

    pub fn set_interval(&mut self, source: Source, interval: Duration) {
        self.intervals.insert(source, interval);
    }

    /// Whether `source` is due given its last successful refresh.
    pub fn is_due(
        &self,
        source: Source,
        now: DateTime<Utc>,
        last_refreshed: Option<DateTime<Utc>>,
    ) -> bool {
        should_refresh(now, last_refreshed, self.interval(source))
    }
}

fn default_interval(source: Source) -> Duration {
    match source {
        Source::Tasks => FAST_REFRESH_INTERVAL,
        _ => SLOW_REFRESH_INTERVAL,
    }
}

/// A source is due when it was never fetched or `now - last >= interval`.
///
/// A `last_refreshed` in the future (clock moved back) counts as fresh.
pub fn should_refresh(
    now: DateTime<Utc>,
    last_refreshed: Option<DateTime<Utc>>,
    interval: Duration,
) -> bool {
    let Some(last) = last_refreshed else {
        return true;
    };
    match (now - last).to_std() {
        Ok(elapsed) => elapsed >= interval,
        Err(_) => false,
    }
}
