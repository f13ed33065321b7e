//! The "TIME" engine - virtual clock with live-adjustable acceleration.
//!
//! Real elapsed time is fed in through `tick()`; virtual time advances by
//! `real_delta × acceleration` while playing and stands still while paused.
//! Changing the acceleration never rescales time that has already elapsed.

use crate::config::{clamp_acceleration, MIN_ACCELERATION};
use std::time::Duration;

/// Converts real elapsed time into simulated time.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClock {
    /// Simulated time since the last reset
    virtual_time: Duration,

    /// Multiplier applied to each real delta, always within [1, 100]
    acceleration: f64,

    /// Whether ticks advance virtual time
    playing: bool,
}

impl VirtualClock {
    /// Creates a paused clock at zero with the given acceleration (clamped).
    pub fn new(acceleration: f64) -> Self {
        Self {
            virtual_time: Duration::ZERO,
            acceleration: clamp_acceleration(acceleration),
            playing: false,
        }
    }

    /// Advances virtual time by `real_delta × acceleration` if playing.
    ///
    /// Returns the virtual time after the tick.
    pub fn tick(&mut self, real_delta: Duration) -> Duration {
        if self.playing {
            let scaled = Duration::try_from_secs_f64(real_delta.as_secs_f64() * self.acceleration)
                .unwrap_or(Duration::MAX);
            self.virtual_time = self.virtual_time.saturating_add(scaled);
        }
        self.virtual_time
    }

    /// Sets the acceleration, clamped to [1, 100]. Takes effect on the next tick.
    ///
    /// Returns the factor actually applied.
    pub fn set_acceleration(&mut self, factor: f64) -> f64 {
        self.acceleration = clamp_acceleration(factor);
        self.acceleration
    }

    /// Starts advancing on ticks. Returns false if already playing.
    pub fn play(&mut self) -> bool {
        !std::mem::replace(&mut self.playing, true)
    }

    /// Stops advancing on ticks. Returns false if already paused.
    pub fn pause(&mut self) -> bool {
        std::mem::replace(&mut self.playing, false)
    }

    /// Zeroes virtual time and pauses. Acceleration is left untouched.
    pub fn reset(&mut self) {
        self.virtual_time = Duration::ZERO;
        self.playing = false;
    }

    /// Current virtual time.
    pub fn virtual_time(&self) -> Duration {
        self.virtual_time
    }

    /// Current acceleration factor.
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Whether the clock is playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(MIN_ACCELERATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const TICK: Duration = Duration::from_millis(50);

    #[test]
    fn test_huge_delta_saturates() {
        let mut clock = VirtualClock::new(100.0);
        clock.play();
        assert_eq!(clock.tick(Duration::from_secs(u64::MAX / 10)), Duration::MAX);
        assert_eq!(clock.tick(TICK), Duration::MAX);
    }

    #[test]
    fn test_paused_clock_does_not_advance() {
        let mut clock = VirtualClock::new(10.0);
        assert_eq!(clock.tick(TICK), Duration::ZERO);
    }

    #[test]
    fn test_tick_scales_by_acceleration() {
        let mut clock = VirtualClock::new(10.0);
        clock.play();
        assert_eq!(clock.tick(TICK), Duration::from_millis(500));
        assert_eq!(clock.tick(TICK), Duration::from_millis(1000));
    }

    #[test]
    fn test_acceleration_change_is_not_retroactive() {
        let mut clock = VirtualClock::new(1.0);
        clock.play();
        clock.tick(Duration::from_secs(1));
        clock.set_acceleration(100.0);
        assert_eq!(clock.virtual_time(), Duration::from_secs(1));
        clock.tick(Duration::from_secs(1));
        assert_eq!(clock.virtual_time(), Duration::from_secs(101));
    }

    #[test]
    fn test_set_acceleration_clamps() {
        let mut clock = VirtualClock::default();
        assert_eq!(clock.set_acceleration(0.25), 1.0);
        assert_eq!(clock.set_acceleration(1_000.0), 100.0);
        assert_eq!(clock.acceleration(), 100.0);
    }

    #[test]
    fn test_play_pause_are_idempotent() {
        let mut clock = VirtualClock::default();
        assert!(clock.play());
        assert!(!clock.play());
        assert!(clock.is_playing());
        assert!(clock.pause());
        assert!(!clock.pause());
        assert!(!clock.is_playing());
    }

    #[test]
    fn test_reset_zeroes_and_pauses() {
        let mut clock = VirtualClock::new(5.0);
        clock.play();
        clock.tick(Duration::from_secs(3));
        clock.reset();
        assert_eq!(clock.virtual_time(), Duration::ZERO);
        assert!(!clock.is_playing());
        assert_eq!(clock.acceleration(), 5.0);
    }

    proptest! {
        #[test]
        fn prop_virtual_time_tracks_acceleration(
            factor in 1u32..=100,
            ticks in 1usize..400,
        ) {
            let mut clock = VirtualClock::new(f64::from(factor));
            clock.play();
            for _ in 0..ticks {
                clock.tick(TICK);
            }
            let real = TICK * ticks as u32;
            let expected = real.as_secs_f64() * f64::from(factor);
            assert_relative_eq!(
                clock.virtual_time().as_secs_f64(),
                expected,
                epsilon = TICK.as_secs_f64() * f64::from(factor)
            );
        }

        #[test]
        fn prop_virtual_time_is_monotonic(
            steps in proptest::collection::vec((0u64..200, 0.0f64..150.0, any::<bool>()), 1..100),
        ) {
            let mut clock = VirtualClock::default();
            let mut last = Duration::ZERO;
            for (ms, factor, playing) in steps {
                clock.set_acceleration(factor);
                if playing { clock.play(); } else { clock.pause(); }
                let now = clock.tick(Duration::from_millis(ms));
                prop_assert!(now >= last);
                last = now;
            }
        }
    }
}
