//! Demo engine - the control surface and tick loop.
//!
//! This module wires the pieces together and is the only legitimate way
//! external code mutates engine state.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        DemoEngine                          │
//! │  play/pause/reset/set_acceleration/select_scenario         │
//! │          │                          │                      │
//! │  ┌───────▼───────┐         ┌────────▼─────────┐            │
//! │  │ VirtualClock  │────────►│ ScenarioGenerator│            │
//! │  └───────────────┘  vtime  └────────┬─────────┘            │
//! │                                     │ DomainEvent          │
//! │                            ┌────────▼─────────┐            │
//! │                            │     EventBus     │            │
//! │                            └──┬─────┬──────┬──┘            │
//! │                 NotificationCenter  KPIs  external         │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Tick ordering
//!
//! 1. Wall-clock notification timers due now are fired.
//! 2. The virtual clock advances by `real_delta × acceleration`.
//! 3. Every script entry now due is generated and fully dispatched, one at
//!    a time, in ascending offset order.
//!
//! `tick` takes `&mut self`, so two ticks can never overlap.

use crate::bus::{DispatchReport, EventBus};
use crate::clock::VirtualClock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::event::{millis, DomainEvent, EventFilter};
use crate::generator::ScenarioGenerator;
use crate::notifications::NotificationCenter;
use crate::scenario::ScenarioId;
use pulse_env::{DemoContext, EventId, NotificationId, RunId, SubscriptionId};
use serde::Serialize;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read model of the current playback session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRun {
    pub run_id: RunId,
    pub scenario_id: ScenarioId,
    pub acceleration_factor: f64,
    pub is_playing: bool,
    #[serde(with = "millis")]
    pub virtual_time: Duration,
    pub events_emitted_count: u64,
    /// Scripted events in the current scenario
    pub scenario_events: usize,
    /// Whether the current script has been fully emitted
    pub is_complete: bool,
}

/// What happened during one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    pub virtual_time: Duration,

    /// Events generated and dispatched this tick, in order
    pub emitted: Vec<EventId>,

    /// Isolated subscriber failures across those dispatches
    pub failures: Vec<EngineError>,

    /// Notification timers fired this tick
    pub timers_fired: usize,

    /// True on the tick that emitted the last script entry
    pub completed: bool,
}

/// An operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Play,
    Pause,
    Toggle,
    Reset,
    SetAcceleration(f64),
    SelectScenario(String),
    Dismiss(NotificationId),
}

impl std::str::FromStr for ControlCommand {
    type Err = EngineError;

    /// Parses `play`, `pause`, `toggle`, `reset`, `speed <x>`,
    /// `scenario <id>` and `dismiss <n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();
        let invalid = || EngineError::InvalidCommand(s.trim().to_string());

        match (verb.as_str(), arg) {
            ("play", None) => Ok(ControlCommand::Play),
            ("pause", None) => Ok(ControlCommand::Pause),
            ("toggle", None) => Ok(ControlCommand::Toggle),
            ("reset", None) => Ok(ControlCommand::Reset),
            ("speed" | "accel" | "acceleration", Some(x)) => x
                .trim_end_matches('x')
                .parse()
                .map(ControlCommand::SetAcceleration)
                .map_err(|_| invalid()),
            ("scenario", Some(id)) => Ok(ControlCommand::SelectScenario(id.to_string())),
            ("dismiss", Some(n)) => n
                .parse()
                .map(|n| ControlCommand::Dismiss(NotificationId(n)))
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

/// The demo simulation engine.
///
/// Generic over the wall-clock context so the same engine runs against
/// the system clock or a manually stepped one.
pub struct DemoEngine<Ctx: DemoContext> {
    config: EngineConfig,
    clock: VirtualClock,
    generator: ScenarioGenerator,
    bus: Rc<EventBus>,
    notifications: NotificationCenter<Ctx>,

    run_id: RunId,
    run_counter: u64,
    events_emitted: u64,
    ticks: u64,
    completion_reported: bool,
}

impl<Ctx: DemoContext> DemoEngine<Ctx> {
    /// Creates a paused engine on the configured default scenario.
    pub fn new(context: Arc<Ctx>, config: EngineConfig) -> Self {
        let bus = Rc::new(EventBus::new());
        let notifications = NotificationCenter::attach(&bus, context, &config);

        Self {
            clock: VirtualClock::new(config.initial_acceleration),
            generator: ScenarioGenerator::new(config.default_scenario, config.seed),
            run_id: RunId::from_seed(config.seed, 0),
            run_counter: 0,
            events_emitted: 0,
            ticks: 0,
            completion_reported: false,
            config,
            bus,
            notifications,
        }
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Starts playback. No-op if already playing.
    pub fn play(&mut self) {
        if self.clock.play() {
            info!(run = %self.run_id, scenario = %self.generator.scenario_id(), "Playing");
        }
    }

    /// Pauses playback. No-op if already paused.
    pub fn pause(&mut self) {
        if self.clock.pause() {
            info!(run = %self.run_id, virtual_ms = self.virtual_millis(), "Paused");
        }
    }

    /// Plays if paused, pauses if playing.
    pub fn toggle(&mut self) {
        if self.clock.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Starts a fresh run: virtual time and emitted count to zero, paused,
    /// acceleration back to its initial value, script rewound, and every
    /// notification and its timers dropped.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.clock.set_acceleration(self.config.initial_acceleration);
        self.generator.reset();
        let cleared = self.notifications.clear();

        self.run_counter += 1;
        self.run_id = RunId::from_seed(self.config.seed, self.run_counter);
        self.events_emitted = 0;
        self.completion_reported = false;
        info!(run = %self.run_id, cleared, "Reset");
    }

    /// Sets the acceleration, clamping to [1, 100]. Returns the applied factor.
    pub fn set_acceleration(&mut self, factor: f64) -> f64 {
        let applied = self.clock.set_acceleration(factor);
        if applied != factor {
            warn!(requested = factor, applied, "Acceleration out of range; clamped");
        } else {
            info!(acceleration = applied, "Acceleration set");
        }
        applied
    }

    /// Selects a scenario by id, falling back to the default on unknown ids.
    ///
    /// The new script starts at the current virtual time. Returns the
    /// scenario actually selected.
    pub fn select_scenario(&mut self, id: &str) -> ScenarioId {
        let (scenario, fell_back) = ScenarioId::resolve(id, self.config.default_scenario);
        if fell_back {
            warn!(requested = id, fallback = %scenario, "Unknown scenario; using default");
        }
        self.select(scenario);
        scenario
    }

    /// Selects a scenario; the new script starts at the current virtual time.
    pub fn select(&mut self, scenario: ScenarioId) {
        self.generator.select(scenario, self.clock.virtual_time());
        self.completion_reported = false;
        info!(%scenario, origin_ms = self.virtual_millis(), "Scenario selected");
    }

    /// Starts the exit window of a visible notification.
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        self.notifications.dismiss(id)
    }

    /// Applies an operator command.
    pub fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Play => self.play(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::Toggle => self.toggle(),
            ControlCommand::Reset => self.reset(),
            ControlCommand::SetAcceleration(factor) => {
                self.set_acceleration(factor);
            }
            ControlCommand::SelectScenario(id) => {
                self.select_scenario(&id);
            }
            ControlCommand::Dismiss(id) => {
                if !self.dismiss(id) {
                    debug!(%id, "Dismiss ignored");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick loop
    // ------------------------------------------------------------------

    /// Advances the engine by `real_delta` of wall-clock time.
    pub fn tick(&mut self, real_delta: Duration) -> TickReport {
        self.ticks += 1;
        let timers_fired = self.notifications.poll();
        let virtual_time = self.clock.tick(real_delta);

        let mut report = TickReport {
            virtual_time,
            timers_fired,
            ..TickReport::default()
        };
        if !self.clock.is_playing() {
            return report;
        }

        while let Some(event) = self.generator.next_due(virtual_time) {
            let dispatch = self.dispatch(&event);
            report.emitted.push(event.id);
            report.failures.extend(dispatch.failures);
        }

        if self.generator.is_finished() && !self.completion_reported {
            self.completion_reported = true;
            report.completed = true;
            info!(
                scenario = %self.generator.scenario_id(),
                events = self.events_emitted,
                virtual_ms = self.virtual_millis(),
                "Scenario complete"
            );
        }
        report
    }

    fn dispatch(&mut self, event: &DomainEvent) -> DispatchReport {
        self.events_emitted += 1;
        debug!(
            id = %event.id,
            kind = %event.kind,
            virtual_ms = event.virtual_timestamp.as_millis() as u64,
            "Emitting"
        );
        self.bus.publish(event)
    }

    // ------------------------------------------------------------------
    // Consumers
    // ------------------------------------------------------------------

    /// Subscribes an external consumer.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: FnMut(&DomainEvent) -> anyhow::Result<()> + 'static,
    {
        self.bus.subscribe(filter, handler)
    }

    /// Detaches an external consumer. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Handle to the bus, for consumers that attach themselves.
    pub fn bus(&self) -> Rc<EventBus> {
        Rc::clone(&self.bus)
    }

    /// The notification queue fed by this engine.
    pub fn notifications(&self) -> &NotificationCenter<Ctx> {
        &self.notifications
    }

    // ------------------------------------------------------------------
    // Read model
    // ------------------------------------------------------------------

    /// Snapshot of the current run.
    pub fn run(&self) -> SimulationRun {
        SimulationRun {
            run_id: self.run_id,
            scenario_id: self.generator.scenario_id(),
            acceleration_factor: self.clock.acceleration(),
            is_playing: self.clock.is_playing(),
            virtual_time: self.clock.virtual_time(),
            events_emitted_count: self.events_emitted,
            scenario_events: self.generator.scenario().len(),
            is_complete: self.generator.is_finished(),
        }
    }

    pub fn virtual_time(&self) -> Duration {
        self.clock.virtual_time()
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    /// Whether the current script has been fully emitted.
    pub fn is_complete(&self) -> bool {
        self.generator.is_finished()
    }

    /// Ticks processed over the engine lifetime.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn virtual_millis(&self) -> u64 {
        u64::try_from(self.clock.virtual_time().as_millis()).unwrap_or(u64::MAX)
    }
}
