//! Scholar metadata cache library
//!
//! Exposes the cache core plus the CLI, configuration and HTTP fetcher used by
//! the `scholarcache` binary and the integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod upstream;

pub use cache::{CacheFacade, Outcome};
pub use error::{FetchError, StoreError};
