//! Command-line interface parsing for scholarcache
//!
//! Global flags override the `SCHOLARCACHE_*` environment variables; the
//! subcommands look a key up through the cache, inspect a stored record, or
//! show the file name a key maps to.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::cache::{is_stale, CacheEntry, CacheStore};
use crate::config::{CacheConfig, ConfigError};

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// Flags or environment produced an invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Cached lookups against a slow scholar metadata provider
#[derive(Parser, Debug)]
#[command(name = "scholarcache")]
#[command(about = "Persistent stale-while-revalidate cache for scholar metadata lookups")]
#[command(version)]
pub struct Cli {
    /// Directory for cache records (default: XDG cache dir)
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Seconds before an entry is refreshed in the background (default: 604800)
    #[arg(long, value_name = "SECS", global = true)]
    pub ttl_secs: Option<u64>,

    /// Timeout for each upstream request in seconds (default: 30)
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look KEY up through the cache, fetching from the endpoint when needed
    ///
    /// Examples:
    ///   scholarcache get "Marie Curie" --endpoint https://host/search_author
    ///   scholarcache get qc6CJjYAAAAJ --endpoint https://host/search_author_id --param id
    Get {
        /// Name, ID or query to look up
        key: String,
        /// Upstream lookup URL
        #[arg(long, value_name = "URL")]
        endpoint: String,
        /// Query parameter that carries the key
        #[arg(long, value_name = "NAME", default_value = "name")]
        param: String,
    },
    /// Print the stored record for KEY without fetching
    Show {
        key: String,
    },
    /// Print the file name KEY is stored under
    Key {
        key: String,
    },
}

impl Cli {
    /// Builds the cache configuration from flags and the process environment
    pub fn config(&self) -> Result<CacheConfig, CliError> {
        self.config_with(|name| env::var(name).ok())
    }

    /// Builds the cache configuration from flags, reading variables through `lookup`
    pub fn config_with<F>(&self, lookup: F) -> Result<CacheConfig, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::load(self.cache_dir.clone(), lookup)?;

        if let Some(secs) = self.ttl_secs {
            config.set_ttl_secs(secs)?;
        }
        if let Some(secs) = self.timeout_secs {
            config.fetch_timeout = std::time::Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Describes a stored record for `show`
pub fn describe_entry(
    store: &CacheStore,
    entry: &CacheEntry<Value>,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Value {
    json!({
        "key": entry.key,
        "file": store.record_path(&entry.key).display().to_string(),
        "timestamp": entry.timestamp.timestamp(),
        "age_secs": now.signed_duration_since(entry.timestamp).num_seconds(),
        "stale": is_stale(entry.timestamp, now, ttl),
        "data": entry.payload,
    })
}
