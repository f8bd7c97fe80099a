//! Process configuration read from the environment.
//!
//! # Responsibility
//! - Resolve cache, lock, logging, timeout and per-source interval settings.
//! - Decide which local-file sources have a configured path.
//!
//! # Invariants
//! - Missing keys fall back to defaults; malformed values are errors
//!   naming the offending key.
//! - `log_dir` is always absolute so it can be handed to `init_logging`.

use crate::logging::default_log_level;
use crate::model::source::Source;
use crate::refresh::policy::RefreshPolicy;
use crate::refresh::scheduler::DEFAULT_FETCH_TIMEOUT;
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CACHE_FILE_PATH_KEY: &str = "CACHE_FILE_PATH";
pub const LOCK_FILE_PATH_KEY: &str = "LOCK_FILE_PATH";
pub const LOCK_TIMEOUT_KEY: &str = "E2P_LOCK_TIMEOUT_SECS";
pub const LOG_DIR_KEY: &str = "E2P_LOG_DIR";
pub const LOG_LEVEL_KEY: &str = "E2P_LOG_LEVEL";
pub const FETCH_TIMEOUT_KEY: &str = "E2P_FETCH_TIMEOUT_SECS";
pub const NOTES_VAULT_KEY: &str = "OBSIDIAN_PATH";
pub const ARTICLES_CSV_KEY: &str = "INSTAPAPER_CSV_PATH";
pub const HEALTH_CSV_KEY: &str = "HEALTH_CSV_PATH";

const DEFAULT_CACHE_FILE: &str = "cache.json";
const LOG_SUBDIR: &str = "logs";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid value `{value}` for {key}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Resolved settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub cache_path: PathBuf,
    /// Lock file serializing cache writers across processes.
    pub lock_path: PathBuf,
    /// How long a writer waits for `lock_path` before giving up.
    pub lock_timeout: Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub fetch_timeout: Duration,
    pub policy: RefreshPolicy,
    pub notes_vault_path: Option<PathBuf>,
    pub articles_csv_path: Option<PathBuf>,
    pub health_csv_path: Option<PathBuf>,
}

impl AppConfig {
    /// Loads an optional `.env` file, then reads the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let dotenv = dotenvy::dotenv().ok();
        let config = Self::from_vars(std::env::vars())?;
        info!(
            "event=config_load module=config status=ok dotenv={} cache_path={} sources={}",
            dotenv.is_some(),
            config.cache_path.display(),
            config.configured_sources().len()
        );
        Ok(config)
    }

    /// Builds configuration from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        let get = |key: &str| vars.get(key).map(|value| value.trim());

        let cache_path = PathBuf::from(get(CACHE_FILE_PATH_KEY).unwrap_or(DEFAULT_CACHE_FILE));
        let lock_path = match get(LOCK_FILE_PATH_KEY) {
            Some(path) => PathBuf::from(path),
            None => default_lock_path(&cache_path),
        };
        let lock_timeout = match get(LOCK_TIMEOUT_KEY) {
            Some(value) => parse_seconds(LOCK_TIMEOUT_KEY, value)?,
            None => DEFAULT_LOCK_TIMEOUT,
        };
        let log_dir = match get(LOG_DIR_KEY) {
            Some(dir) => absolute(Path::new(dir)),
            None => absolute(&default_log_dir(&cache_path)),
        };
        let log_level = get(LOG_LEVEL_KEY)
            .unwrap_or(default_log_level())
            .to_string();

        let fetch_timeout = match get(FETCH_TIMEOUT_KEY) {
            Some(value) => parse_seconds(FETCH_TIMEOUT_KEY, value)?,
            None => DEFAULT_FETCH_TIMEOUT,
        };

        let mut policy = RefreshPolicy::default();
        for source in Source::ALL {
            let key = refresh_interval_key(source);
            if let Some(value) = get(&key) {
                policy.set_interval(source, parse_seconds(&key, value)?);
            }
        }

        Ok(Self {
            cache_path,
            lock_path,
            lock_timeout,
            log_dir,
            log_level,
            fetch_timeout,
            policy,
            notes_vault_path: get(NOTES_VAULT_KEY).map(PathBuf::from),
            articles_csv_path: get(ARTICLES_CSV_KEY).map(PathBuf::from),
            health_csv_path: get(HEALTH_CSV_KEY).map(PathBuf::from),
        })
    }

    /// Sources with a local path configured.
    pub fn configured_sources(&self) -> Vec<Source> {
        [
            (Source::Notes, self.notes_vault_path.is_some()),
            (Source::Articles, self.articles_csv_path.is_some()),
            (Source::Health, self.health_csv_path.is_some()),
        ]
        .into_iter()
        .filter_map(|(source, configured)| configured.then_some(source))
        .collect()
    }
}

/// Environment key holding the refresh interval of `source`, in seconds.
pub fn refresh_interval_key(source: Source) -> String {
    format!("E2P_REFRESH_{}_SECS", source.as_str().to_ascii_uppercase())
}

/// `<cache file>.lock` next to the cache file.
fn default_lock_path(cache_path: &Path) -> PathBuf {
    let mut name = cache_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| DEFAULT_CACHE_FILE.into());
    name.push(".lock");
    cache_path.with_file_name(name)
}

fn default_log_dir(cache_path: &Path) -> PathBuf {
    match cache_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(LOG_SUBDIR),
        _ => PathBuf::from(LOG_SUBDIR),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn parse_seconds(key: &str, value: &str) -> ConfigResult<Duration> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let seconds = value
        .parse::<u64>()
        .map_err(|_| invalid("expected a whole number of seconds"))?;
    if seconds == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}
