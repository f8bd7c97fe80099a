//! Cross-process writer lock.
//!
//! # Responsibility
//! - Serialize load-refresh-save cycles of separate processes sharing one cache file.
//!
//! # Invariants
//! - At most one `CacheLock` per lock file is held at a time, across processes.
//! - The lock is released when the guard is dropped.

use super::{CacheError, CacheResult};
use fslock::LockFile;
use log::{info, warn};
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive hold on the cache lock file.
pub struct CacheLock {
    path: PathBuf,
    _file: LockFile,
}

impl CacheLock {
    /// Waits up to `timeout` for the lock at `path`, creating the file if needed.
    ///
    /// # Errors
    /// - `CacheError::Locked` when another holder keeps the lock past
    ///   `timeout`, or the lock file cannot be opened.
    pub fn acquire(path: impl Into<PathBuf>, timeout: Duration) -> CacheResult<Self> {
        let path = path.into();
        let started_at = Instant::now();
        let locked = |reason: String| CacheError::Locked {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| locked(err.to_string()))?;
        }
        let mut file = LockFile::open(&path).map_err(|err| locked(err.to_string()))?;

        let mut announced = false;
        loop {
            if file.try_lock().map_err(|err| locked(err.to_string()))? {
                break;
            }
            if started_at.elapsed() >= timeout {
                warn!(
                    "event=cache_lock module=cache status=timeout path={} duration_ms={}",
                    path.display(),
                    started_at.elapsed().as_millis()
                );
                return Err(locked(format!(
                    "held by another writer for more than {} ms",
                    timeout.as_millis()
                )));
            }
            if !announced {
                info!(
                    "event=cache_lock module=cache status=wait path={}",
                    path.display()
                );
                announced = true;
            }
            thread::sleep(POLL_INTERVAL);
        }

        info!(
            "event=cache_lock module=cache status=ok path={} duration_ms={}",
            path.display(),
            started_at.elapsed().as_millis()
        );
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Debug for CacheLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock").field("path", &self.path).finish()
    }
}
