//! Flat-file snapshot persistence.
//!
//! # Responsibility
//! - Load the snapshot once at process start.
//! - Write snapshots atomically (temp file in the same directory, then rename).
//!
//! # Invariants
//! - A reader of the cache file sees either the old or the new content.
//! - Files written by a newer format version are refused, not reinterpreted.

use super::{CacheError, CacheResult, CacheSnapshot, SourceSlice};
use crate::model::item::normalize_tags;
use crate::model::source::Source;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use uuid::Uuid;

/// Current on-disk snapshot format.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    format_version: u32,
    sources: BTreeMap<&'static str, &'a SourceSlice>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    format_version: u32,
    #[serde(default)]
    sources: BTreeMap<String, SourceSlice>,
}

/// Cache file location and I/O.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, failing when there is nothing usable on disk.
    ///
    /// # Errors
    /// - `CacheError::Unavailable` when the file is missing, unreadable or corrupt.
    /// - `CacheError::NewerFormat` when a newer build wrote the file.
    pub fn load(&self) -> CacheResult<CacheSnapshot> {
        let started_at = Instant::now();
        info!(
            "event=cache_load module=cache status=start path={}",
            self.path.display()
        );

        match self.read_snapshot() {
            Ok(snapshot) => {
                info!(
                    "event=cache_load module=cache status=ok items={} duration_ms={}",
                    snapshot.total_items(),
                    started_at.elapsed().as_millis()
                );
                Ok(snapshot)
            }
            Err(err) => {
                error!(
                    "event=cache_load module=cache status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Loads the snapshot, starting from an empty one when nothing usable exists.
    ///
    /// Used by the refresh path: a broken cache file is rebuilt by the next
    /// successful refresh rather than blocking it.
    ///
    /// # Errors
    /// - `CacheError::NewerFormat`; replacing such a file would lose data.
    pub fn load_or_empty(&self) -> CacheResult<CacheSnapshot> {
        if !self.path.exists() {
            info!(
                "event=cache_load module=cache status=skip reason=missing path={}",
                self.path.display()
            );
            return Ok(CacheSnapshot::empty());
        }
        match self.load() {
            Ok(snapshot) => Ok(snapshot),
            Err(err @ CacheError::NewerFormat { .. }) => Err(err),
            Err(err) => {
                warn!(
                    "event=cache_load module=cache status=fallback reason=unusable error={}",
                    err
                );
                Ok(CacheSnapshot::empty())
            }
        }
    }

    /// Persists `snapshot` atomically, creating the parent directory if needed.
    pub fn save(&self, snapshot: &CacheSnapshot) -> CacheResult<()> {
        let started_at = Instant::now();
        let result = self.write_snapshot(snapshot);
        match &result {
            Ok(()) => info!(
                "event=cache_save module=cache status=ok items={} duration_ms={}",
                snapshot.total_items(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=cache_save module=cache status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Modification time of the cache file, if it exists.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|meta| meta.modified()).ok()
    }

    fn read_snapshot(&self) -> CacheResult<CacheSnapshot> {
        let file = File::open(&self.path).map_err(|err| self.unavailable(err.to_string()))?;
        let parsed: SnapshotFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| self.unavailable(format!("corrupt snapshot: {err}")))?;

        if parsed.format_version > CACHE_FORMAT_VERSION {
            return Err(CacheError::NewerFormat {
                path: self.path.clone(),
                found: parsed.format_version,
                supported: CACHE_FORMAT_VERSION,
            });
        }

        let mut slices = BTreeMap::new();
        for (name, slice) in parsed.sources {
            match Source::parse(&name) {
                Some(source) => {
                    slices.insert(source, Arc::new(sanitize_slice(source, slice)));
                }
                None => warn!(
                    "event=cache_load module=cache status=skip reason=unknown_source source={}",
                    name
                ),
            }
        }
        Ok(CacheSnapshot::from_slices(slices))
    }

    fn write_snapshot(&self, snapshot: &CacheSnapshot) -> CacheResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io(parent, err))?;
        }

        let wire = SnapshotFileRef {
            format_version: CACHE_FORMAT_VERSION,
            sources: snapshot
                .slices()
                .iter()
                .map(|(source, slice)| (source.as_str(), slice.as_ref()))
                .collect(),
        };

        let temp_path = self.temp_path();
        let written = write_json(&temp_path, &wire).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|err| self.io(&self.path, err))
        });
        if written.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        written
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()))
    }

    fn unavailable(&self, reason: String) -> CacheError {
        CacheError::Unavailable {
            path: self.path.clone(),
            reason,
        }
    }

    fn io(&self, path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Restores item invariants a hand-edited file may have broken: items filed
/// under another source, blank ids or titles, repeated ids, unnormalized tags.
fn sanitize_slice(source: Source, mut slice: SourceSlice) -> SourceSlice {
    let before = slice.items.len();
    let mut seen = HashSet::new();
    slice.items.retain(|item| {
        item.source == source && item.validate().is_ok() && seen.insert(item.id.clone())
    });
    for item in &mut slice.items {
        item.tags = normalize_tags(std::mem::take(&mut item.tags));
    }
    let dropped = before - slice.items.len();
    if dropped > 0 {
        warn!(
            "event=cache_load module=cache status=skip reason=invalid_items source={} dropped={}",
            source, dropped
        );
    }
    slice
}

fn write_json(path: &Path, value: &impl Serialize) -> CacheResult<()> {
    let io_err = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush().map_err(io_err)?;
    let file = writer
        .into_inner()
        .map_err(|err| io_err(err.into_error()))?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}
