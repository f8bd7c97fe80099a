//! Source fetcher capability and in-process registry.

use crate::model::item::Item;
use crate::model::source::Source;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type FetchResult<T> = Result<T, FetchError>;

/// Failure category for one source fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Auth,
    Parse,
    Io,
    Timeout,
    /// Adapter returned items violating the item invariants.
    InvalidItems,
    /// No fetcher is registered for the source.
    NotRegistered,
    /// The fetch worker ended without producing a result.
    Internal,
}

impl FetchErrorKind {
    /// Stable code used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parse => "parse",
            Self::Io => "io",
            Self::Timeout => "timeout",
            Self::InvalidItems => "invalid_items",
            Self::NotRegistered => "not_registered",
            Self::Internal => "internal",
        }
    }
}

/// Source-scoped fetch failure. Never fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub source: Source,
    pub kind: FetchErrorKind,
    pub message: String,
    /// Whether a later attempt may succeed without intervention.
    pub retryable: bool,
}

impl FetchError {
    pub fn new(source: Source, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            FetchErrorKind::Network | FetchErrorKind::Io | FetchErrorKind::Timeout
        );
        Self {
            source,
            kind,
            message: message.into(),
            retryable,
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} fetch failed ({}): {}",
            self.source,
            self.kind.as_str(),
            self.message
        )
    }
}

impl Error for FetchError {}

/// Capability implemented by one adapter per source.
///
/// Adapters map their native records into [`Item`], including tag
/// normalization and timestamp selection. Implementations may block.
pub trait SourceFetcher: Send + Sync {
    fn source(&self) -> Source;
    fn fetch(&self) -> FetchResult<Vec<Item>>;
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetcherRegistryError {
    DuplicateSource(Source),
}

impl Display for FetcherRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateSource(source) => {
                write!(f, "fetcher already registered for source: {source}")
            }
        }
    }
}

impl Error for FetcherRegistryError {}

/// Runtime fetcher registry keyed by source.
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: BTreeMap<Source, Arc<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one fetcher under the source it reports.
    pub fn register(
        &mut self,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<(), FetcherRegistryError> {
        let source = fetcher.source();
        if self.fetchers.contains_key(&source) {
            return Err(FetcherRegistryError::DuplicateSource(source));
        }
        self.fetchers.insert(source, fetcher);
        Ok(())
    }

    pub fn get(&self, source: Source) -> Option<Arc<dyn SourceFetcher>> {
        self.fetchers.get(&source).cloned()
    }

    /// Registered sources in canonical order.
    pub fn sources(&self) -> Vec<Source> {
        self.fetchers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}
