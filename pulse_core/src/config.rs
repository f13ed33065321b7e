//! Engine configuration.

use crate::error::EngineError;
use crate::scenario::ScenarioId;
use std::time::Duration;

/// Default real-time tick interval (tick granularity of the virtual clock).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Lowest allowed acceleration factor.
pub const MIN_ACCELERATION: f64 = 1.0;

/// Highest allowed acceleration factor.
pub const MAX_ACCELERATION: f64 = 100.0;

/// Configuration for a demo engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Real time between driver ticks (default: 50ms)
    pub tick_interval: Duration,

    /// Wall-clock lifetime of a visible notification (default: 5s)
    pub notification_ttl: Duration,

    /// Exit-animation window between Fading and Removed (default: 300ms)
    pub notification_fade: Duration,

    /// Maximum concurrent Visible + Fading notifications (default: 3)
    pub notification_capacity: usize,

    /// Seed for payload generation
    pub seed: u64,

    /// Scenario selected at construction and on unknown ids
    pub default_scenario: ScenarioId,

    /// Acceleration at construction and after reset (default: 1x)
    pub initial_acceleration: f64,

    /// Depth of the bundled recent-events consumer (default: 50)
    pub recent_events_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            notification_ttl: Duration::from_millis(5000),
            notification_fade: Duration::from_millis(300),
            notification_capacity: 3,
            seed: 42,
            default_scenario: ScenarioId::NewPatientOnboarding,
            initial_acceleration: MIN_ACCELERATION,
            recent_events_capacity: 50,
        }
    }
}

impl EngineConfig {
    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the default scenario.
    pub fn with_scenario(mut self, scenario: ScenarioId) -> Self {
        self.default_scenario = scenario;
        self
    }

    /// Sets the initial acceleration (clamped to [1, 100]).
    pub fn with_acceleration(mut self, factor: f64) -> Self {
        self.initial_acceleration = clamp_acceleration(factor);
        self
    }

    /// Sets notification lifetime and fade window.
    pub fn with_notification_timing(mut self, ttl: Duration, fade: Duration) -> Self {
        self.notification_ttl = ttl;
        self.notification_fade = fade;
        self
    }

    /// Sets the notification capacity (at least 1).
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }
}

/// Clamps an acceleration factor to [1, 100]; NaN becomes 1.
pub fn clamp_acceleration(factor: f64) -> f64 {
    if factor.is_nan() {
        MIN_ACCELERATION
    } else {
        factor.clamp(MIN_ACCELERATION, MAX_ACCELERATION)
    }
}

/// Strict check for outer surfaces (CLI flags): rejects instead of clamping.
pub fn validate_acceleration(factor: f64) -> Result<f64, EngineError> {
    if (MIN_ACCELERATION..=MAX_ACCELERATION).contains(&factor) {
        Ok(factor)
    } else {
        Err(EngineError::AccelerationOutOfRange(factor))
    }
}
