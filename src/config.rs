//! Cache configuration
//!
//! Settings come from built-in defaults, then `SCHOLARCACHE_*` environment
//! variables, then command-line flags (see [`crate::cli`]).

use chrono::Duration;
use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default time-to-live: 7 days
pub const DEFAULT_TTL_SECS: u64 = 604_800;

/// Default bound on a single upstream request
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Largest TTL representable as a chrono `Duration`
const MAX_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

pub const ENV_CACHE_DIR: &str = "SCHOLARCACHE_DIR";
pub const ENV_TTL_SECS: &str = "SCHOLARCACHE_TTL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "SCHOLARCACHE_FETCH_TIMEOUT_SECS";

/// Errors that can occur while building a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No cache directory was given and none could be derived from the home directory
    #[error("Could not determine a cache directory; set SCHOLARCACHE_DIR or pass --cache-dir")]
    NoCacheDir,

    /// An environment variable held something other than a number of seconds
    #[error("Invalid value for {name}: '{value}' (expected a number of seconds)")]
    InvalidNumber { name: &'static str, value: String },

    /// The TTL does not fit in a `chrono::Duration`
    #[error("TTL of {0} seconds is too large")]
    TtlTooLarge(u64),
}

/// Runtime settings for the cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory where records are stored
    pub cache_dir: PathBuf,
    /// Age after which an entry is refreshed in the background
    pub ttl: Duration,
    /// Timeout applied by the HTTP fetcher to each upstream request
    pub fetch_timeout: std::time::Duration,
}

impl CacheConfig {
    /// Creates a configuration for `cache_dir` with default timings
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl: Duration::seconds(DEFAULT_TTL_SECS as i64),
            fetch_timeout: std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    /// Returns the XDG-compliant cache directory (`~/.cache/scholarcache/` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "scholarcache")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }

    /// Loads configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration using `lookup` to read variables
    ///
    /// Unset variables fall back to defaults; malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load(None, lookup)
    }

    /// Like [`CacheConfig::from_lookup`], with `cache_dir` taking precedence
    /// over the environment when given
    pub fn load<F>(cache_dir: Option<PathBuf>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => match lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
                Some(dir) => PathBuf::from(dir),
                None => Self::default_dir().ok_or(ConfigError::NoCacheDir)?,
            },
        };
        let mut config = Self::with_dir(cache_dir);

        if let Some(secs) = parse_secs(&lookup, ENV_TTL_SECS)? {
            config.set_ttl_secs(secs)?;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_FETCH_TIMEOUT_SECS)? {
            config.fetch_timeout = std::time::Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Sets the TTL, rejecting values chrono cannot represent
    pub fn set_ttl_secs(&mut self, secs: u64) -> Result<(), ConfigError> {
        if secs > MAX_TTL_SECS {
            return Err(ConfigError::TtlTooLarge(secs));
        }
        self.ttl = Duration::seconds(secs as i64);
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
