//! Core environment context trait for the pulse engine.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The central interface for wall-clock interaction.
///
/// This trait abstracts the "real world" so that the demo engine can run
/// against the system clock or against a clock stepped by hand.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `Instant`, `tokio::time`
/// - **Manual**: `ManualContext` - a shared counter advanced explicitly
///
/// # Determinism
///
/// Notification expiry reads time exclusively through `now()`, so a
/// `ManualContext` makes every fade and removal reproducible.
#[async_trait]
pub trait DemoContext: Send + Sync + 'static {
    /// Returns the current monotonic wall-clock time since context creation.
    ///
    /// Used for notification timestamps and expiry deadlines.
    fn now(&self) -> Duration;

    /// Returns the calendar time, for export headers.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In manual mode: advances the clock and returns immediately
    async fn sleep(&self, duration: Duration);
}
