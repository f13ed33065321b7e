//! Scenario runner - plays scripted scenarios headlessly and checks them.

use crate::exporter::RunExport;
use pulse_core::config::DEFAULT_TICK_INTERVAL;
use pulse_core::{DemoEngine, DomainEvent, EngineConfig, EventFilter, ScenarioId};
use pulse_env::{DemoContext, ManualContext};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    pub acceleration: f64,

    /// Whether the run passed every check
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Wall-clock time until the last scripted event was emitted
    pub completion_ms: u64,

    /// Wall-clock time until the notification queue drained
    pub real_elapsed_ms: u64,

    /// Virtual time at the end of the run
    pub virtual_elapsed_ms: u64,

    /// Events published on the engine's bus
    pub events_published: u64,

    /// Events delivered to an all-kinds subscriber
    pub events_delivered: usize,

    pub notifications_created: u64,
    pub notifications_evicted: u64,

    /// Highest Visible + Fading count observed
    pub peak_active: usize,

    /// Subscriber failures reported by dispatch
    pub delivery_failures: usize,

    /// Failure message if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Runs scenarios on a manual clock.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    acceleration: f64,

    /// Wall-clock step per tick
    tick_interval: Duration,
}

impl ScenarioRunner {
    /// Creates a new scenario runner at 1× with the default tick.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            acceleration: 1.0,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Sets the acceleration (clamped by the engine).
    pub fn with_acceleration(mut self, factor: f64) -> Self {
        self.acceleration = factor;
        self
    }

    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.play(scenario, None)
    }

    /// Runs a scenario, recording every delivery and transition.
    pub fn run_with_export(&self, scenario: ScenarioId) -> RunExport {
        let started_at_ms = millis(
            ManualContext::new()
                .system_time()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        );
        let mut export = RunExport::new(
            scenario.name(),
            self.seed,
            self.config(scenario).initial_acceleration,
            millis(self.tick_interval),
            started_at_ms,
        );
        let result = self.play(scenario, Some(&mut export));
        export.finalize(result);
        export
    }

    fn config(&self, scenario: ScenarioId) -> EngineConfig {
        EngineConfig::default()
            .with_seed(self.seed)
            .with_tick_interval(self.tick_interval)
            .with_scenario(scenario)
            .with_acceleration(self.acceleration)
    }

    fn play(&self, scenario: ScenarioId, mut export: Option<&mut RunExport>) -> ScenarioResult {
        let config = self.config(scenario);
        let acceleration = config.initial_acceleration;
        let capacity = config.notification_capacity;
        let drain = config.notification_ttl + config.notification_fade;
        let tick = config.tick_interval;
        info!(%scenario, seed = self.seed, acceleration, "Starting scenario");

        let context = ManualContext::shared();
        let mut engine = DemoEngine::new(Arc::clone(&context), config);

        let delivered: Rc<RefCell<Vec<(Duration, DomainEvent)>>> = Rc::default();
        let sink = Rc::clone(&delivered);
        let clock = Arc::clone(&context);
        engine.subscribe(EventFilter::All, move |event: &DomainEvent| {
            sink.borrow_mut().push((clock.now(), event.clone()));
            Ok(())
        });

        // Script at `acceleration`, then the exit window, with headroom
        let expected = scenario.scenario().duration.div_f64(acceleration);
        let max_ticks = 2 * ((expected + drain).as_nanos() / tick.as_nanos()) as u64 + 10;

        engine.play();
        let mut ticks = 0;
        let mut completion = None;
        let mut delivery_failures = 0;
        let mut cap_exceeded = false;

        while ticks < max_ticks {
            context.advance(tick);
            let report = engine.tick(tick);
            ticks += 1;

            delivery_failures += report.failures.len();
            if report.completed {
                completion = Some(context.now());
            }
            if engine.notifications().active_count() > capacity {
                cap_exceeded = true;
            }
            let transitions = engine.notifications().take_transitions();
            if let Some(export) = export.as_deref_mut() {
                export.transitions.extend(transitions);
            }
            if ticks % 100 == 0 {
                debug!(
                    ticks,
                    virtual_ms = millis(report.virtual_time),
                    active = engine.notifications().active_count(),
                    "Progress"
                );
            }

            if engine.is_complete() && engine.notifications().pending_timers() == 0 {
                break;
            }
        }

        let delivered = delivered.take();
        let stats = engine.notifications().stats();
        let scripted = scenario.scenario().len();

        let mut failures = Vec::new();
        if !delivered
            .windows(2)
            .all(|pair| pair[0].1.virtual_timestamp <= pair[1].1.virtual_timestamp)
        {
            failures.push("events delivered out of virtual-time order".to_string());
        }
        if delivered.len() != scripted {
            failures.push(format!("delivered {} of {} scripted events", delivered.len(), scripted));
        }
        if cap_exceeded || stats.peak_active > capacity {
            failures.push(format!(
                "notification cap {} exceeded (peak {})",
                capacity, stats.peak_active
            ));
        }
        match completion {
            Some(real) => {
                let slack = tick + Duration::from_millis(1);
                let early = expected.saturating_sub(real);
                let late = real.saturating_sub(expected);
                if early > slack || late > slack {
                    failures.push(format!(
                        "completed after {}ms, expected {}ms",
                        millis(real),
                        millis(expected)
                    ));
                }
            }
            None => failures.push(format!("script not complete after {} ticks", ticks)),
        }
        if delivery_failures > 0 {
            failures.push(format!("{} subscriber failures", delivery_failures));
        }

        if let Some(export) = export {
            for (at, event) in &delivered {
                export.add_event(millis(*at), event.clone());
            }
        }

        let passed = failures.is_empty();
        if passed {
            info!(
                %scenario,
                events = delivered.len(),
                evicted = stats.evicted,
                "Scenario complete"
            );
        } else {
            warn!(%scenario, reason = %failures.join("; "), "Scenario failed");
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            acceleration,
            passed,
            total_ticks: engine.ticks(),
            completion_ms: completion.map(millis).unwrap_or(0),
            real_elapsed_ms: millis(context.now()),
            virtual_elapsed_ms: millis(engine.virtual_time()),
            events_published: engine.bus().published_count(),
            events_delivered: delivered.len(),
            notifications_created: stats.created,
            notifications_evicted: stats.evicted,
            peak_active: stats.peak_active,
            delivery_failures,
            failure_reason: (!passed).then(|| failures.join("; ")),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onboarding_at_ten_times() {
        let result = ScenarioRunner::new(42)
            .with_acceleration(10.0)
            .run(ScenarioId::NewPatientOnboarding);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.events_delivered, 12);
        assert_eq!(result.events_published, 12);
        assert_eq!(result.total_ticks, result.real_elapsed_ms / 50);
        assert!((12_000..=12_050).contains(&result.completion_ms));
        assert_eq!(result.peak_active, 3);
        assert!(result.notifications_evicted > 0);
    }

    #[test]
    fn test_every_scenario_passes() {
        let runner = ScenarioRunner::new(42).with_acceleration(25.0);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_out_of_range_acceleration_is_clamped() {
        let result = ScenarioRunner::new(1)
            .with_acceleration(1_000.0)
            .run(ScenarioId::PaSuccess);
        assert_eq!(result.acceleration, 100.0);
        assert!(result.passed);
    }

    #[test]
    fn test_export_records_run() {
        let export = ScenarioRunner::new(9)
            .with_acceleration(50.0)
            .run_with_export(ScenarioId::HighRiskRecovery);

        assert!(export.passed());
        assert_eq!(export.events.len(), 12);
        assert!(export.transitions.len() >= 12);
        assert!(export
            .events
            .windows(2)
            .all(|w| w[0].delivered_at_ms <= w[1].delivered_at_ms));
    }

    #[test]
    fn test_same_seed_same_export() {
        let runner = ScenarioRunner::new(1234).with_acceleration(40.0);
        let a = runner.run_with_export(ScenarioId::AdverseEventHandling);
        let b = runner.run_with_export(ScenarioId::AdverseEventHandling);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }
}
