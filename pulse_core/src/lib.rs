//! Pulse Core - Demo-Mode Event Simulation Engine
//!
//! Plays scripted care-coordination scenarios against an accelerated
//! virtual clock and distributes the resulting events:
//! 1. **Virtual time**: wall-clock ticks scaled by a clamped acceleration factor
//! 2. **Scripted generation**: ordered, seeded scenario events with unique ids
//! 3. **Distribution**: fault-isolated pub/sub plus a bounded notification queue

pub mod bus;
pub mod clock;
pub mod config;
pub mod consumers;
pub mod engine;
pub mod error;
pub mod event;
pub mod generator;
pub mod notifications;
pub mod scenario;
pub mod timers;

mod registry;

// Re-export key types for convenience
pub use bus::{DispatchReport, EventBus};
pub use clock::VirtualClock;
pub use config::EngineConfig;
pub use consumers::{KpiSnapshot, LiveCounters, RecentEvents};
pub use engine::{ControlCommand, DemoEngine, SimulationRun, TickReport};
pub use error::EngineError;
pub use event::{DomainEvent, EventFilter, EventKind, EventPayload, Severity};
pub use generator::ScenarioGenerator;
pub use notifications::{NotificationCenter, NotificationRecord, NotificationState};
pub use pulse_env::{DemoContext, EventId, NotificationId, RunId, SubscriptionId};
pub use registry::{Handler, SubscriptionInfo};
pub use scenario::{Scenario, ScenarioId};
