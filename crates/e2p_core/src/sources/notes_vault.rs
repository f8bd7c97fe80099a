//! Markdown notes vault adapter.
//!
//! # Responsibility
//! - Walk a vault directory and turn each markdown note into an [`Item`].
//! - Read tags and date from YAML frontmatter.
//!
//! # Invariants
//! - Templater templates are never cached.
//! - Hidden directories (`.obsidian`, `.trash`, ...) are not walked.
//! - Timestamp falls back from frontmatter `date` to a `YYYY-MM-DD` file
//!   stem, then to the file mtime, then to the fetch time.

use super::{file_mtime, parse_flexible_datetime};
use crate::model::item::Item;
use crate::model::source::Source;
use crate::refresh::fetcher::{FetchError, FetchErrorKind, FetchResult, SourceFetcher};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value as YamlValue};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

static TEMPLATER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<%\s*tp\.|tp\.file\.cursor\(\)").expect("valid templater regex")
});
static DATE_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date stem regex"));

const RESERVED_KEYS: &[&str] = &["tags", "date"];

/// Fetches notes from a local markdown vault.
#[derive(Debug, Clone)]
pub struct NotesVaultFetcher {
    root: PathBuf,
}

impl NotesVaultFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceFetcher for NotesVaultFetcher {
    fn source(&self) -> Source {
        Source::Notes
    }

    fn fetch(&self) -> FetchResult<Vec<Item>> {
        if !self.root.is_dir() {
            return Err(FetchError::new(
                Source::Notes,
                FetchErrorKind::Io,
                format!("vault directory not found: {}", self.root.display()),
            ));
        }

        let fetched_at = Local::now().naive_local();
        let mut items = Vec::new();
        let mut skipped = 0usize;

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));
        for entry in walker.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let is_markdown = path.extension().and_then(|ext| ext.to_str()) == Some("md");
            if !entry.file_type().is_file() || !is_markdown {
                continue;
            }
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(
                        "event=source_read module=sources status=skip source=notes path={} error={}",
                        path.display(),
                        err
                    );
                    skipped += 1;
                    continue;
                }
            };
            let fallback = file_mtime(path).unwrap_or(fetched_at);
            match parse_note(&self.root, path, &content, fallback) {
                Some(item) => items.push(item),
                None => skipped += 1,
            }
        }

        info!(
            "event=source_read module=sources status=ok source=notes count={} skipped={}",
            items.len(),
            skipped
        );
        Ok(items)
    }
}

/// Builds a note item from file content. Returns `None` for templates.
pub fn parse_note(
    root: &Path,
    path: &Path,
    content: &str,
    fallback: NaiveDateTime,
) -> Option<Item> {
    if TEMPLATER_RE.is_match(content) {
        return None;
    }

    let (yaml, body) = split_frontmatter(content);
    let frontmatter = if yaml.trim().is_empty() {
        Mapping::new()
    } else {
        match serde_yaml::from_str::<Mapping>(yaml) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!(
                    "event=source_parse module=sources status=warn source=notes path={} error={}",
                    path.display(),
                    err
                );
                Mapping::new()
            }
        }
    };

    let relative = path.strip_prefix(root).unwrap_or(path);
    let id = relative.to_string_lossy().replace('\\', "/");
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| id.clone());

    let timestamp = frontmatter_date(&frontmatter)
        .or_else(|| date_from_stem(&stem))
        .unwrap_or(fallback);

    let mut item = Item::new(Source::Notes, id.clone(), stem, timestamp)
        .with_tags(frontmatter_tags(&frontmatter))
        .with_body(body.trim())
        .with_metadata("path", id);

    for (key, value) in &frontmatter {
        let Some(key) = key.as_str() else { continue };
        if RESERVED_KEYS.contains(&key) {
            continue;
        }
        if let Some(value) = scalar_to_json(value) {
            item = item.with_metadata(key, value);
        }
    }
    Some(item)
}

/// Splits `---` delimited YAML frontmatter from the markdown body.
pub fn split_frontmatter(markdown: &str) -> (&str, &str) {
    for open in ["---\n", "---\r\n"] {
        let Some(rest) = markdown.strip_prefix(open) else {
            continue;
        };
        for close in ["\n---\n", "\n---\r\n", "\r\n---\r\n", "\r\n---\n"] {
            if let Some(idx) = rest.find(close) {
                return (&rest[..idx], &rest[idx + close.len()..]);
            }
        }
        for close in ["\n---", "\r\n---"] {
            if let Some(stripped) = rest.strip_suffix(close) {
                return (stripped, "");
            }
        }
    }
    ("", markdown)
}

fn frontmatter_tags(frontmatter: &Mapping) -> Vec<String> {
    let raw: Vec<String> = match frontmatter.get("tags") {
        Some(YamlValue::Sequence(values)) => values
            .iter()
            .filter_map(|value| match value {
                YamlValue::String(text) => Some(text.clone()),
                YamlValue::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .collect(),
        Some(YamlValue::String(text)) => text
            .split(|c: char| c.is_whitespace() || c == ',')
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|tag| tag.trim().trim_start_matches('#').to_string())
        .collect()
}

fn frontmatter_date(frontmatter: &Mapping) -> Option<NaiveDateTime> {
    match frontmatter.get("date")? {
        YamlValue::String(text) => parse_flexible_datetime(text),
        _ => None,
    }
}

fn date_from_stem(stem: &str) -> Option<NaiveDateTime> {
    if !DATE_STEM_RE.is_match(stem) {
        return None;
    }
    NaiveDate::parse_from_str(stem, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

fn scalar_to_json(value: &YamlValue) -> Option<serde_json::Value> {
    match value {
        YamlValue::String(_) | YamlValue::Number(_) | YamlValue::Bool(_) => {
            serde_json::to_value(value).ok()
        }
        _ => None,
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{parse_note, split_frontmatter};
    use chrono::NaiveDate;
    use std::path::Path;

    fn fallback() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn split_frontmatter_handles_lf_and_crlf() {
        assert_eq!(split_frontmatter("---\na: 1\n---\nbody"), ("a: 1", "body"));
        assert_eq!(
            split_frontmatter("---\r\na: 1\r\n---\r\nbody"),
            ("a: 1", "body")
        );
        assert_eq!(split_frontmatter("no frontmatter"), ("", "no frontmatter"));
    }

    #[test]
    fn parses_tags_date_and_extra_keys() {
        let content = "---\ntags: [Health, '#Journal']\ndate: 2024-03-05\nmood: good\n---\n# Day\nran 5k\n";
        let root = Path::new("/vault");
        let item = parse_note(root, Path::new("/vault/daily/log.md"), content, fallback()).unwrap();

        assert_eq!(item.id, "daily/log.md");
        assert_eq!(item.title, "log");
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["health", "journal"]);
        assert_eq!(item.timestamp.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(item.metadata["mood"], "good");
        assert_eq!(item.metadata["path"], "daily/log.md");
        assert!(item.body.as_deref().unwrap().contains("ran 5k"));
    }

    #[test]
    fn space_separated_tag_string_is_split() {
        let content = "---\ntags: work project\n---\nbody";
        let item = parse_note(Path::new("/v"), Path::new("/v/a.md"), content, fallback()).unwrap();
        assert_eq!(item.tags.len(), 2);
        assert!(item.tags.contains("project"));
    }

    #[test]
    fn date_stem_is_used_when_frontmatter_has_no_date() {
        let item = parse_note(
            Path::new("/v"),
            Path::new("/v/2024-07-09.md"),
            "plain body",
            fallback(),
        )
        .unwrap();
        assert_eq!(item.timestamp.date(), NaiveDate::from_ymd_opt(2024, 7, 9).unwrap());

        let undated = parse_note(Path::new("/v"), Path::new("/v/idea.md"), "x", fallback()).unwrap();
        assert_eq!(undated.timestamp, fallback());
    }

    #[test]
    fn templater_files_are_skipped() {
        let content = "---\ndate: <% tp.date.now() %>\n---\n<% tp.file.cursor() %>";
        assert!(parse_note(Path::new("/v"), Path::new("/v/t.md"), content, fallback()).is_none());
    }
}
