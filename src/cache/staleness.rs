//! Freshness decision for cached entries

use chrono::{DateTime, Duration, Utc};

/// Returns true if an entry obtained at `timestamp` is older than `ttl` at `now`
///
/// An entry exactly `ttl` old is still fresh. A timestamp in the future (clock
/// skew between writes) is treated as fresh.
pub fn is_stale(timestamp: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(timestamp) > ttl
}
