//! The get-or-fetch entry point
//!
//! Combines the store, the staleness check and the refresh coordinator:
//!
//! * no entry: the fetch runs inline and its result is stored and returned
//! * fresh entry: returned as-is, nothing is fetched
//! * stale entry: returned as-is while a background refresh is requested
//!
//! A stale payload is not flagged as such in the [`Outcome`]; freshness is
//! best-effort and eventual.

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

use super::refresh::RefreshCoordinator;
use super::staleness::is_stale;
use super::store::CacheStore;
use crate::config::CacheConfig;
use crate::error::FetchError;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// A payload, either from the cache or freshly fetched
    Ready(T),
    /// The key was not cached and fetching it failed
    Failed(FetchError),
}

impl<T> Outcome<T> {
    /// Converts into a standard `Result`
    pub fn into_result(self) -> Result<T, FetchError> {
        match self {
            Outcome::Ready(payload) => Ok(payload),
            Outcome::Failed(e) => Err(e),
        }
    }

    /// Returns true if a payload is available
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }
}

/// Stale-while-revalidate cache in front of a slow lookup
#[derive(Debug, Clone)]
pub struct CacheFacade {
    store: CacheStore,
    refresher: RefreshCoordinator,
    default_ttl: Duration,
}

impl CacheFacade {
    /// Creates a facade over `store` with its own refresh coordinator
    pub fn new(store: CacheStore, default_ttl: Duration) -> Self {
        let refresher = RefreshCoordinator::new(store.clone());
        Self {
            store,
            refresher,
            default_ttl,
        }
    }

    /// Creates a facade from loaded configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(CacheStore::new(config.cache_dir.clone()), config.ttl)
    }

    /// The underlying record store
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// The coordinator running background refreshes for this facade
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// The TTL used by [`CacheFacade::get`]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached payload for `key`, fetching it if needed
    ///
    /// Only a cold miss awaits `fetch`. A stale hit hands `fetch` to the
    /// refresh coordinator, which drops it if a refresh for `key` is already
    /// running. A failed write after a successful cold fetch is logged and the
    /// payload is still returned.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, fetch: F, ttl: Duration) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let Some(entry) = self.store.get::<T>(key) else {
            tracing::info!(key = %key, "Cache miss, fetching");
            return match fetch().await {
                Ok(payload) => {
                    if let Err(e) = self.store.put(key, &payload) {
                        tracing::warn!(key = %key, error = %e, "Failed to cache fetched payload");
                    }
                    Outcome::Ready(payload)
                }
                Err(e) => {
                    tracing::info!(key = %key, error = %e, "Fetch failed on cache miss");
                    Outcome::Failed(e)
                }
            };
        };

        if is_stale(entry.timestamp, Utc::now(), ttl) {
            tracing::debug!(key = %key, cached_at = %entry.timestamp, "Serving stale entry");
            self.refresher.try_start_refresh(key, fetch);
        } else {
            tracing::debug!(key = %key, "Cache hit");
        }

        Outcome::Ready(entry.payload)
    }

    /// Like [`CacheFacade::get_or_fetch`] with the configured default TTL
    pub async fn get<T, F, Fut>(&self, key: &str, fetch: F) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        self.get_or_fetch(key, fetch, self.default_ttl).await
    }
}
