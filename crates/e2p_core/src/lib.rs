//! Core of the personal data aggregator.
//! Owns the item model, the snapshot cache, the refresh path and the query path.

pub mod cache;
pub mod config;
pub mod logging;
pub mod model;
pub mod query;
pub mod refresh;
pub mod sources;

pub use cache::{
    CacheError, CacheLock, CacheResult, CacheSnapshot, CacheStore, SharedCache, SourceSlice,
};
pub use config::{AppConfig, ConfigError, ConfigResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{normalize_tag, Item, ItemValidationError, Metadata};
pub use model::source::Source;
pub use query::engine::{evaluate, run_query, QueryRun};
pub use query::filter::Query;
pub use query::help::{render_help, TagDescriptions};
pub use query::parser::{
    parse_query, parse_query_at, ParsedQuery, QueryParseError, QueryWarning,
};
pub use query::render::{render_results, NO_RESULTS};
pub use refresh::fetcher::{
    FetchError, FetchErrorKind, FetchResult, FetcherRegistry, FetcherRegistryError, SourceFetcher,
};
pub use refresh::policy::{should_refresh, RefreshPolicy};
pub use refresh::scheduler::{
    RefreshOutcome, RefreshReport, RefreshRequest, RefreshScheduler, SliceUpdate, SourceReport,
};
pub use sources::registry_from_config;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
