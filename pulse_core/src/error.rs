//! Error types for the pulse engine.
//!
//! Nothing here is ever fatal to the host: configuration problems are
//! clamped or defaulted, delivery problems are isolated per subscriber,
//! and redundant lifecycle calls are plain no-ops.

use pulse_env::{EventId, SubscriptionId};
use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Scenario id not in the catalog (strict parsing only)
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// Acceleration factor outside [1, 100] or not a number (strict parsing only)
    #[error("Acceleration out of range: {0} (expected 1..=100)")]
    AccelerationOutOfRange(f64),

    /// A subscriber's handler returned an error
    #[error("Handler for {subscription} failed on {event}: {reason}")]
    HandlerFailed {
        subscription: SubscriptionId,
        event: EventId,
        reason: String,
    },

    /// A subscriber's handler panicked
    #[error("Handler for {subscription} panicked on {event}")]
    HandlerPanicked {
        subscription: SubscriptionId,
        event: EventId,
    },

    /// A handler published into the bus while it was itself being dispatched to
    #[error("Handler for {subscription} is already running; skipped {event}")]
    ReentrantDispatch {
        subscription: SubscriptionId,
        event: EventId,
    },

    /// A control command could not be parsed
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl EngineError {
    /// Creates a handler failure from any displayable cause.
    pub fn handler(
        subscription: SubscriptionId,
        event: EventId,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::HandlerFailed {
            subscription,
            event,
            reason: reason.to_string(),
        }
    }

    /// Returns true for failures raised while delivering an event.
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            EngineError::HandlerFailed { .. }
                | EngineError::HandlerPanicked { .. }
                | EngineError::ReentrantDispatch { .. }
        )
    }
}
