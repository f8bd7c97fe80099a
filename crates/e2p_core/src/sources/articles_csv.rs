//! Read-later CSV export adapter (`URL,Title,Selection,Folder,Timestamp`).

use crate::model::item::Item;
use crate::model::source::Source;
use crate::refresh::fetcher::{FetchError, FetchErrorKind, FetchResult, SourceFetcher};
use chrono::{DateTime, Local, NaiveDateTime};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

const ARCHIVE_FOLDER: &str = "archive";

#[derive(Debug, Deserialize)]
struct ArticleRow {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "Title", default)]
    title: String,
    #[serde(rename = "Selection", default)]
    selection: Option<String>,
    #[serde(rename = "Folder", default)]
    folder: Option<String>,
    #[serde(rename = "Timestamp", default)]
    timestamp: Option<String>,
}

/// Fetches saved articles from an exported CSV file.
#[derive(Debug, Clone)]
pub struct ArticlesCsvFetcher {
    path: PathBuf,
}

impl ArticlesCsvFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceFetcher for ArticlesCsvFetcher {
    fn source(&self) -> Source {
        Source::Articles
    }

    fn fetch(&self) -> FetchResult<Vec<Item>> {
        let file = File::open(&self.path).map_err(|err| {
            FetchError::new(
                Source::Articles,
                FetchErrorKind::Io,
                format!("cannot open {}: {err}", self.path.display()),
            )
        })?;
        let (items, skipped) = parse_articles(file, Local::now().naive_local())?;
        info!(
            "event=source_read module=sources status=ok source=articles count={} skipped={}",
            items.len(),
            skipped
        );
        Ok(items)
    }
}

/// Parses an article export. Returns the items and the number of skipped rows.
///
/// Rows with a blank or repeated URL are skipped; a missing timestamp
/// falls back to `fetched_at`.
pub fn parse_articles<R: Read>(
    reader: R,
    fetched_at: NaiveDateTime,
) -> FetchResult<(Vec<Item>, usize)> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    csv_reader.headers().map_err(|err| {
        FetchError::new(
            Source::Articles,
            FetchErrorKind::Parse,
            format!("unreadable csv header: {err}"),
        )
    })?;

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for (line, row) in csv_reader.deserialize::<ArticleRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(
                    "event=source_parse module=sources status=skip source=articles row={} error={}",
                    line + 1,
                    err
                );
                skipped += 1;
                continue;
            }
        };
        if row.url.is_empty() || !seen.insert(row.url.clone()) {
            skipped += 1;
            continue;
        }
        items.push(article_item(row, fetched_at));
    }
    Ok((items, skipped))
}

fn article_item(row: ArticleRow, fetched_at: NaiveDateTime) -> Item {
    let timestamp = row
        .timestamp
        .as_deref()
        .and_then(|value| value.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|utc| utc.with_timezone(&Local).naive_local())
        .unwrap_or(fetched_at);
    let title = if row.title.is_empty() {
        row.url.clone()
    } else {
        row.title
    };
    let folder = row.folder.unwrap_or_default();
    let is_read = folder.eq_ignore_ascii_case(ARCHIVE_FOLDER);

    Item::new(Source::Articles, row.url.clone(), title, timestamp)
        .with_tags([folder.as_str()])
        .with_body(row.selection.unwrap_or_default())
        .with_metadata("url", row.url)
        .with_metadata("folder", folder)
        .with_metadata("is_read", is_read)
}
