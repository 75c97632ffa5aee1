//! Persistent stale-while-revalidate cache
//!
//! Entries are stored one JSON file per key. Lookups are served from disk;
//! missing keys are fetched inline, and stale keys are served immediately
//! while a single background refresh per key brings them up to date.

mod facade;
mod key;
mod refresh;
mod staleness;
mod store;

pub use facade::{CacheFacade, Outcome};
pub use key::sanitize_key;
pub use refresh::RefreshCoordinator;
pub use staleness::is_stale;
pub use store::{CacheEntry, CacheStore};
