//! Error types shared by the cache and its fetch capabilities

use thiserror::Error;

/// Errors a fetch capability can report back to the cache
///
/// `Clone` so a single failure can be logged by the cache and still handed
/// back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The lookup ran but the upstream provider had no record for the key
    #[error("No upstream record found for '{0}'")]
    NotFoundUpstream(String),

    /// Network failure, rate limiting or a remote fault
    #[error("Upstream request failed: {0}")]
    Transient(String),
}

impl FetchError {
    /// Returns true if the upstream answered definitively that nothing exists
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFoundUpstream(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transient(e.to_string())
    }
}

/// Errors raised by the on-disk store
///
/// These never reach callers of the facade: a corrupt record reads as a miss,
/// and a failed write is logged while the fetched payload is still returned.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the cache directory failed
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record could not be parsed
    #[error("Corrupt cache record: {0}")]
    CorruptRecord(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::NotFoundUpstream("alice".to_string());
        assert_eq!(err.to_string(), "No upstream record found for 'alice'");

        let err = FetchError::Transient("429 Too Many Requests".to_string());
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(FetchError::NotFoundUpstream("x".into()).is_not_found());
        assert!(!FetchError::Transient("x".into()).is_not_found());
    }

    #[test]
    fn test_store_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::CorruptRecord(_)));
    }
}
