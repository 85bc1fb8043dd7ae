//! Time utilities for safe timestamp handling.
//!
//! All token timestamps are whole seconds since the Unix epoch.

use crate::token::error::TokenError;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A function that provides the current time in seconds since the Unix epoch.
pub type TimeProviderFn = Arc<dyn Fn() -> Result<u64, TokenError> + Send + Sync>;

/// Get current timestamp in seconds since Unix epoch.
///
/// In the extremely rare case where system time is before Unix epoch,
/// it returns an error instead of panicking.
pub(crate) fn current_timestamp() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::CryptoError("System time is before Unix epoch".to_string()))
}

/// The default time provider backed by the system clock.
pub(crate) fn system_time_provider() -> TimeProviderFn {
    Arc::new(current_timestamp)
}

/// Seconds left until `expire_at`, clamped to zero.
pub(crate) fn remaining_seconds(expire_at: u64, now: u64) -> u64 {
    expire_at.saturating_sub(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_timestamp() {
        let ts = current_timestamp().unwrap();
        // Should be a reasonable timestamp (after year 2020)
        assert!(ts > 1577836800);
    }

    #[test]
    fn test_system_time_provider() {
        let provider = system_time_provider();
        let a = provider().unwrap();
        let b = current_timestamp().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn test_remaining_seconds() {
        assert_eq!(remaining_seconds(100, 40), 60);
        assert_eq!(remaining_seconds(100, 100), 0);
        // Never negative
        assert_eq!(remaining_seconds(100, 250), 0);
    }
}
