//! Local-file source adapters.
//!
//! # Responsibility
//! - Provide [`SourceFetcher`] implementations for sources readable from disk.
//! - Build the fetcher registry from configuration.
//!
//! Network-backed sources (tasks, calendar) plug in through the same
//! capability from outside this crate.
//!
//! [`SourceFetcher`]: crate::refresh::fetcher::SourceFetcher

use crate::config::AppConfig;
use crate::refresh::fetcher::{FetcherRegistry, FetcherRegistryError};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::Path;
use std::sync::Arc;

pub mod articles_csv;
pub mod health_csv;
pub mod notes_vault;

pub use articles_csv::ArticlesCsvFetcher;
pub use health_csv::HealthCsvFetcher;
pub use notes_vault::NotesVaultFetcher;

/// Registers a fetcher for every source whose path is configured.
pub fn registry_from_config(config: &AppConfig) -> Result<FetcherRegistry, FetcherRegistryError> {
    let mut registry = FetcherRegistry::new();
    if let Some(path) = &config.notes_vault_path {
        registry.register(Arc::new(NotesVaultFetcher::new(path)))?;
    }
    if let Some(path) = &config.articles_csv_path {
        registry.register(Arc::new(ArticlesCsvFetcher::new(path)))?;
    }
    if let Some(path) = &config.health_csv_path {
        registry.register(Arc::new(HealthCsvFetcher::new(path)))?;
    }
    Ok(registry)
}

/// Parses the date and date-time spellings found in exported records.
pub(crate) fn parse_flexible_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_local());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// File modification time as local naive time.
pub(crate) fn file_mtime(path: &Path) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    Some(DateTime::<Local>::from(modified).naive_local())
}
