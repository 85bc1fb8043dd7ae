//! Automatic purging of expired store entries.
//!
//! Liveness records and challenge hashes stop being readable once their TTL
//! elapses, but backends without native expiry (memory, SQLite) keep holding
//! them until [`TokenStore::cleanup_expired`](crate::storage::TokenStore::cleanup_expired)
//! runs. A [`CleanupStrategy`] decides, after each store write made by the
//! manager, whether to run that purge in the background.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Decides when the manager purges expired store entries.
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    /// Called after every issuance that writes to the store.
    async fn should_cleanup(&self) -> bool;

    /// Called once a purge has been scheduled, to reset internal state.
    async fn mark_as_cleaned(&self);
}

/// Purges after a number of writes or once enough time has passed since
/// the last purge, whichever comes first.
///
/// The elapsed time is measured with the system clock, not the manager's
/// time provider.
pub struct HybridCleanupStrategy {
    count_threshold: u32,
    time_threshold: Duration,
    write_count: AtomicU32,
    last_cleanup_time: AtomicU64,
}

impl HybridCleanupStrategy {
    /// Creates a strategy with the given thresholds.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use token_auth::cleanup::HybridCleanupStrategy;
    ///
    /// // Purge every 500 writes or every 10 minutes
    /// let strategy = HybridCleanupStrategy::new(500, Duration::from_secs(600));
    /// ```
    pub fn new(count_threshold: u32, time_threshold: Duration) -> Self {
        Self {
            count_threshold,
            time_threshold,
            write_count: AtomicU32::new(0),
            last_cleanup_time: AtomicU64::new(unix_now()),
        }
    }

    pub fn count_threshold(&self) -> u32 {
        self.count_threshold
    }

    pub fn time_threshold(&self) -> Duration {
        self.time_threshold
    }
}

#[async_trait]
impl CleanupStrategy for HybridCleanupStrategy {
    async fn should_cleanup(&self) -> bool {
        let count = self.write_count.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if count >= self.count_threshold {
            return true;
        }

        let elapsed = unix_now().saturating_sub(self.last_cleanup_time.load(Ordering::SeqCst));
        elapsed >= self.time_threshold.as_secs()
    }

    async fn mark_as_cleaned(&self) {
        self.write_count.store(0, Ordering::SeqCst);
        self.last_cleanup_time.store(unix_now(), Ordering::SeqCst);
    }
}

impl Default for HybridCleanupStrategy {
    /// 100 writes or 5 minutes.
    fn default() -> Self {
        Self::new(100, Duration::from_secs(300))
    }
}

/// A strategy backed by a closure returning `Future<Output = bool>`.
///
/// Any state the closure needs is its own to keep; `mark_as_cleaned` does
/// nothing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use token_auth::cleanup::CustomCleanupStrategy;
///
/// let maintenance = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&maintenance);
/// let strategy = CustomCleanupStrategy::new(move || {
///     let flag = Arc::clone(&flag);
///     async move { flag.load(Ordering::Relaxed) }
/// });
/// ```
pub struct CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    strategy_fn: F,
}

impl<F, Fut> CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    pub fn new(strategy_fn: F) -> Self {
        Self { strategy_fn }
    }
}

#[async_trait]
impl<F, Fut> CleanupStrategy for CustomCleanupStrategy<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn should_cleanup(&self) -> bool {
        (self.strategy_fn)().await
    }

    async fn mark_as_cleaned(&self) {}
}

/// Boxed strategy as held by the manager.
pub type BoxedCleanupStrategy = Box<dyn CleanupStrategy>;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
