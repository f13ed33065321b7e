//! Headless runs across seeds and speeds.

use proptest::prelude::*;
use pulse_core::ScenarioId;
use pulse_sim::ScenarioRunner;
use std::time::Duration;

#[test]
fn all_scenarios_pass_at_default_speed() {
    let runner = ScenarioRunner::new(42).with_acceleration(10.0);
    for scenario in ScenarioId::all() {
        let result = runner.run(scenario);
        assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        assert_eq!(result.events_delivered, scenario.scenario().len());
        assert!(result.peak_active <= 3);
    }
}

#[test]
fn coarse_ticks_still_complete_in_order() {
    let result = ScenarioRunner::new(3)
        .with_acceleration(100.0)
        .with_tick_interval(Duration::from_millis(500))
        .run(ScenarioId::AdverseEventHandling);

    // Several entries share a tick at this granularity
    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.total_ticks < 30);
}

#[test]
fn export_is_deterministic_per_seed() {
    let a = ScenarioRunner::new(5).with_acceleration(30.0).run_with_export(ScenarioId::PaSuccess);
    let b = ScenarioRunner::new(5).with_acceleration(30.0).run_with_export(ScenarioId::PaSuccess);
    let c = ScenarioRunner::new(6).with_acceleration(30.0).run_with_export(ScenarioId::PaSuccess);

    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    assert_ne!(a.to_json().unwrap(), c.to_json().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_runs_pass_for_any_speed(
        seed in any::<u64>(),
        accel in 5.0f64..=100.0,
        index in 0usize..4,
    ) {
        let scenario = ScenarioId::all()[index];
        let result = ScenarioRunner::new(seed).with_acceleration(accel).run(scenario);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
        prop_assert!(result.peak_active <= 3);
    }
}
