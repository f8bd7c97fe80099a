//! Daily health export adapter.
//!
//! # Invariants
//! - One item per row with a parseable `date` column; other rows are skipped.
//! - Column values become metadata: integers when whole, floats, else strings.
//! - Health items carry no tags.

use super::parse_flexible_datetime;
use crate::model::item::Item;
use crate::model::source::Source;
use crate::refresh::fetcher::{FetchError, FetchErrorKind, FetchResult, SourceFetcher};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

const DATE_COLUMN: &str = "date";

/// Fetches daily health rows from a CSV export.
#[derive(Debug, Clone)]
pub struct HealthCsvFetcher {
    path: PathBuf,
}

impl HealthCsvFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceFetcher for HealthCsvFetcher {
    fn source(&self) -> Source {
        Source::Health
    }

    fn fetch(&self) -> FetchResult<Vec<Item>> {
        let file = File::open(&self.path).map_err(|err| {
            FetchError::new(
                Source::Health,
                FetchErrorKind::Io,
                format!("cannot open {}: {err}", self.path.display()),
            )
        })?;
        let (items, skipped) = parse_health(file)?;
        info!(
            "event=source_read module=sources status=ok source=health count={} skipped={}",
            items.len(),
            skipped
        );
        Ok(items)
    }
}

/// Parses a health export. Returns the items and the number of skipped rows.
pub fn parse_health<R: Read>(reader: R) -> FetchResult<(Vec<Item>, usize)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|err| parse_error(format!("unreadable csv header: {err}")))?
        .clone();
    let date_index = headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(DATE_COLUMN))
        .ok_or_else(|| parse_error("missing `date` column".to_string()))?;

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for (line, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    "event=source_parse module=sources status=skip source=health row={} error={}",
                    line + 1,
                    err
                );
                skipped += 1;
                continue;
            }
        };
        let Some(timestamp) = record.get(date_index).and_then(parse_flexible_datetime) else {
            skipped += 1;
            continue;
        };
        let day = timestamp.format("%Y-%m-%d").to_string();
        if !seen.insert(day.clone()) {
            skipped += 1;
            continue;
        }

        let mut item = Item::new(
            Source::Health,
            day.clone(),
            format!("Health Data - {day}"),
            timestamp,
        );
        for (index, (name, raw)) in headers.iter().zip(record.iter()).enumerate() {
            if index == date_index || name.is_empty() || raw.is_empty() {
                continue;
            }
            item = item.with_metadata(name, metric_value(raw));
        }
        items.push(item);
    }
    Ok((items, skipped))
}

fn metric_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    match raw.parse::<f64>() {
        Ok(float) if float.is_finite() && float.fract() == 0.0 && float.abs() < 1e15 => {
            Value::from(float as i64)
        }
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::from(raw),
    }
}

fn parse_error(message: String) -> FetchError {
    FetchError::new(Source::Health, FetchErrorKind::Parse, message)
}
