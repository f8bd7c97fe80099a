//! Cache snapshot, on-disk store and in-process publication.
//!
//! # Responsibility
//! - Hold the single authoritative picture of all cached items.
//! - Persist snapshots atomically so concurrent readers never see a torn file.
//! - Publish snapshots to readers by swapping an `Arc`, never mutating in place.
//! - Serialize writers of different processes through a lock file.
//!
//! # Invariants
//! - A source slice is replaced wholesale or not at all.
//! - A published snapshot is immutable.
//! - `last_refreshed` only moves on a successful refresh of that source.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod lock;
mod shared;
mod snapshot;
mod store;

pub use lock::CacheLock;
pub use shared::{CacheWriter, SharedCache};
pub use snapshot::{CacheSnapshot, SourceSlice};
pub use store::{CacheStore, CACHE_FORMAT_VERSION};

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug)]
pub enum CacheError {
    /// No snapshot could be loaded; fatal for the query path.
    Unavailable { path: PathBuf, reason: String },
    /// Written by a newer build; must not be read or overwritten.
    NewerFormat {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
    /// The writer lock could not be taken.
    Locked { path: PathBuf, reason: String },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize(serde_json::Error),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { path, reason } => {
                write!(f, "cache unavailable at `{}`: {reason}", path.display())
            }
            Self::NewerFormat {
                path,
                found,
                supported,
            } => write!(
                f,
                "cache at `{}` has format version {found}, newer than supported {supported}",
                path.display()
            ),
            Self::Locked { path, reason } => {
                write!(f, "cache lock `{}` not acquired: {reason}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "cache io failure at `{}`: {source}", path.display())
            }
            Self::Serialize(err) => write!(f, "cache serialization failed: {err}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { .. } | Self::NewerFormat { .. } | Self::Locked { .. } => None,
            Self::Io { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}
