//! In-memory query evaluation over a cache snapshot.
//!
//! # Invariants
//! - Evaluation never fetches and never mutates the snapshot.
//! - Output is grouped by canonical source order, then stored order within
//!   a source; no re-sorting.

use super::filter::Query;
use super::parser::{parse_query_at, QueryParseError, QueryWarning};
use crate::cache::CacheSnapshot;
use crate::model::item::Item;
use crate::model::source::Source;
use chrono::NaiveDateTime;
use log::{info, warn};
use std::time::Instant;

/// Returns every item of `snapshot` matching `query`.
pub fn evaluate<'a>(snapshot: &'a CacheSnapshot, query: &Query) -> Vec<&'a Item> {
    Source::ALL
        .into_iter()
        .filter(|source| query.includes_source(*source))
        .flat_map(|source| snapshot.items(source))
        .filter(|item| query.matches_within_source(item))
        .collect()
}

/// Parsed query together with its results.
#[derive(Debug, Clone)]
pub struct QueryRun<'a> {
    pub query: Query,
    pub warnings: Vec<QueryWarning>,
    pub items: Vec<&'a Item>,
}

/// Parses `raw` and evaluates it against `snapshot`.
///
/// # Errors
/// - `QueryParseError::MalformedDate` when a date bound cannot be parsed.
pub fn run_query<'a>(
    snapshot: &'a CacheSnapshot,
    raw: &str,
    now: NaiveDateTime,
) -> Result<QueryRun<'a>, QueryParseError> {
    let started_at = Instant::now();
    let parsed = match parse_query_at(raw, now) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(
                "event=query_eval module=query status=error error_code=malformed_date error={}",
                err
            );
            return Err(err);
        }
    };

    for warning in &parsed.warnings {
        warn!("event=query_parse module=query status=warn warning={}", warning);
    }

    let items = evaluate(snapshot, &parsed.query);
    info!(
        "event=query_eval module=query status=ok query=\"{}\" matched={} scanned={} duration_ms={}",
        parsed.query,
        items.len(),
        snapshot.total_items(),
        started_at.elapsed().as_millis()
    );

    Ok(QueryRun {
        query: parsed.query,
        warnings: parsed.warnings,
        items,
    })
}
