//! Manually stepped context for deterministic tests and headless replay.

use crate::DemoContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Context whose wall clock only moves when told to.
///
/// - `advance()` steps the clock forward
/// - `sleep()` advances the clock instead of blocking
/// - clones share the same clock
#[derive(Debug, Clone)]
pub struct ManualContext {
    /// Current wall-clock time (nanoseconds since context creation)
    time_ns: Arc<AtomicU64>,

    /// Epoch offset (time 0 maps to this calendar time)
    epoch: SystemTime,
}

impl ManualContext {
    /// Creates a new ManualContext at time zero.
    pub fn new() -> Self {
        Self {
            time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let delta = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.time_ns.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to a specific value.
    pub fn set_time(&self, time: Duration) {
        let ns = u64::try_from(time.as_nanos()).unwrap_or(u64::MAX);
        self.time_ns.store(ns, Ordering::SeqCst);
    }
}

impl Default for ManualContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DemoContext for ManualContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns.load(Ordering::SeqCst))
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_context_time() {
        let ctx = ManualContext::new();
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_manual_context_clone_shares_time() {
        let ctx1 = ManualContext::new();
        let ctx2 = ctx1.clone();

        ctx1.advance(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[test]
    fn test_manual_context_set_time() {
        let ctx = ManualContext::new();
        ctx.advance(Duration::from_secs(9));
        ctx.set_time(Duration::from_millis(250));
        assert_eq!(ctx.now(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_manual_sleep_advances_clock() {
        let ctx = ManualContext::new();
        ctx.sleep(Duration::from_millis(50)).await;
        ctx.sleep(Duration::from_millis(50)).await;
        assert_eq!(ctx.now(), Duration::from_millis(100));
        assert_eq!(
            ctx.system_time(),
            UNIX_EPOCH + Duration::from_secs(1704067200) + Duration::from_millis(100)
        );
    }
}
