//! Background refresh coordination
//!
//! Runs refreshes of stale entries as tokio tasks while guaranteeing that at
//! most one refresh per key is in flight. Callers never wait on a refresh and
//! never see its errors; the coordinator observes every completion itself to
//! release the key's slot and to decide whether to persist the result.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::Instrument;

use super::store::CacheStore;
use crate::error::FetchError;

struct Inner {
    store: CacheStore,
    /// Keys with a background refresh currently running
    in_flight: Mutex<HashSet<String>>,
    /// Refresh tasks not yet finished, including their persistence step
    active: AtomicUsize,
    idle: Notify,
}

/// Schedules background refreshes, coalescing concurrent requests per key
///
/// Cloning yields a handle to the same flight set.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.inner.store)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

/// Holds a key's flight-set membership; dropping it releases the key
///
/// Dropping also happens on panic or when the runtime discards the task, so
/// a key can never stay blocked.
struct FlightSlot {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.key);
    }
}

/// Counts a running refresh task until dropped
struct ActiveTask {
    inner: Arc<Inner>,
}

impl ActiveTask {
    fn start(inner: Arc<Inner>) -> Self {
        inner.active.fetch_add(1, Ordering::AcqRel);
        Self { inner }
    }
}

impl Drop for ActiveTask {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl RefreshCoordinator {
    /// Creates a coordinator that persists successful refreshes into `store`
    pub fn new(store: CacheStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                in_flight: Mutex::new(HashSet::new()),
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Starts a background refresh of `key` unless one is already running
    ///
    /// Returns `true` if `fetch` was scheduled, `false` if the request was
    /// coalesced into a running refresh (or no tokio runtime is available).
    /// On success the payload replaces the stored entry; on failure the
    /// stored entry is left as it was and the error is only logged.
    pub fn try_start_refresh<T, F, Fut>(&self, key: &str, fetch: F) -> bool
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(key = %key, "No tokio runtime, skipping background refresh");
            return false;
        };

        if !self.inner.in_flight.lock().insert(key.to_string()) {
            tracing::debug!(key = %key, "Refresh already in flight");
            return false;
        }

        let slot = FlightSlot {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
        };
        let task = ActiveTask::start(Arc::clone(&self.inner));
        let store = self.inner.store.clone();
        let key = key.to_string();

        tracing::info!(key = %key, "Background refresh accepted");

        let span = tracing::info_span!("refresh", key = %key);
        handle.spawn(
            async move {
                let _task = task;
                let result = AssertUnwindSafe(async move { fetch().await })
                    .catch_unwind()
                    .await;

                // Free the key before anything is persisted
                drop(slot);

                match result {
                    Ok(Ok(payload)) => match store.put(&key, &payload) {
                        Ok(()) => tracing::info!("Refreshed entry stored"),
                        Err(e) => tracing::warn!(error = %e, "Failed to store refreshed entry"),
                    },
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Background refresh failed, keeping stale entry")
                    }
                    Err(_) => tracing::warn!("Background refresh panicked, keeping stale entry"),
                }
            }
            .instrument(span),
        );

        true
    }

    /// Returns true if a refresh for `key` is currently running
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.inner.in_flight.lock().contains(key)
    }

    /// Number of keys currently being refreshed
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Waits until every accepted refresh has finished, including storing its result
    ///
    /// Returns immediately when nothing is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::CacheEntry;
    use tempfile::TempDir;

    fn create_test_coordinator() -> (RefreshCoordinator, CacheStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = CacheStore::new(temp_dir.path());
        (RefreshCoordinator::new(store.clone()), store, temp_dir)
    }

    #[tokio::test]
    async fn test_accepted_refresh_stores_payload() {
        let (coordinator, store, _temp_dir) = create_test_coordinator();

        let accepted = coordinator.try_start_refresh("alice", || async { Ok("fresh".to_string()) });
        assert!(accepted);

        coordinator.wait_idle().await;

        let entry: CacheEntry<String> = store.get("alice").expect("Refresh should persist");
        assert_eq!(entry.payload, "fresh");
        assert!(!coordinator.is_in_flight("alice"));
    }

    #[tokio::test]
    async fn test_second_refresh_is_coalesced_while_first_runs() {
        let (coordinator, _store, _temp_dir) = create_test_coordinator();
        let gate = Arc::new(Notify::new());

        let g = Arc::clone(&gate);
        assert!(coordinator.try_start_refresh("alice", move || async move {
            g.notified().await;
            Ok(1u32)
        }));
        assert!(coordinator.is_in_flight("alice"));
        assert!(!coordinator.try_start_refresh("alice", || async { Ok(2u32) }));

        gate.notify_one();
        coordinator.wait_idle().await;
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_refresh_independently() {
        let (coordinator, store, _temp_dir) = create_test_coordinator();

        assert!(coordinator.try_start_refresh("alice", || async { Ok("a") }));
        assert!(coordinator.try_start_refresh("bob", || async { Ok("b") }));

        coordinator.wait_idle().await;

        assert_eq!(store.get::<String>("alice").unwrap().payload, "a");
        assert_eq!(store.get::<String>("bob").unwrap().payload, "b");
    }

    #[tokio::test]
    async fn test_failed_refresh_releases_key_and_keeps_entry() {
        let (coordinator, store, _temp_dir) = create_test_coordinator();
        store.put("alice", &"old".to_string()).unwrap();

        assert!(coordinator.try_start_refresh("alice", || async {
            Err::<String, _>(FetchError::Transient("rate limited".into()))
        }));
        coordinator.wait_idle().await;

        assert!(!coordinator.is_in_flight("alice"));
        assert_eq!(store.get::<String>("alice").unwrap().payload, "old");

        // The key can be refreshed again
        assert!(coordinator.try_start_refresh("alice", || async { Ok("new".to_string()) }));
        coordinator.wait_idle().await;
        assert_eq!(store.get::<String>("alice").unwrap().payload, "new");
    }

    #[tokio::test]
    async fn test_panicking_refresh_releases_key() {
        let (coordinator, store, _temp_dir) = create_test_coordinator();

        assert!(coordinator.try_start_refresh("alice", || async {
            if true {
                panic!("scraper blew up");
            }
            Ok(0u8)
        }));
        coordinator.wait_idle().await;

        assert!(!coordinator.is_in_flight("alice"));
        assert!(store.get::<u8>("alice").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_still_releases_key() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let coordinator = RefreshCoordinator::new(CacheStore::new(&blocker));

        assert!(coordinator.try_start_refresh("alice", || async { Ok(1u8) }));
        coordinator.wait_idle().await;

        assert!(!coordinator.is_in_flight("alice"));
        assert!(coordinator.try_start_refresh("alice", || async { Ok(2u8) }));
        coordinator.wait_idle().await;
    }

    #[test]
    fn test_without_runtime_refresh_is_not_started() {
        let (coordinator, _store, _temp_dir) = create_test_coordinator();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        let accepted = coordinator.try_start_refresh("alice", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(1u8) }
        });

        assert!(!accepted);
        assert!(!coordinator.is_in_flight("alice"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_nothing_runs() {
        let (coordinator, _store, _temp_dir) = create_test_coordinator();
        coordinator.wait_idle().await;
    }
}
