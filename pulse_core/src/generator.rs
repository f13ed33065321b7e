//! Scenario event generator.
//!
//! Walks the selected script against virtual time, handing out one due
//! event at a time so the caller can fully dispatch it before the next one
//! is generated.
//!
//! # Determinism
//!
//! Open payload fields are filled from a ChaCha8 RNG that is re-seeded from
//! `(seed, scenario)` at every reset and scenario switch. Two runs with the
//! same seed, scenario and tick sequence emit identical payloads.

use crate::event::{
    CallCompleted, DomainEvent, EventPayload, FrictionDetected, MetricUpdate, NewCall,
    PatientUpdated, Severity,
};
use crate::scenario::{PatientRef, PayloadTemplate, Scenario, ScenarioId};
use pulse_env::EventId;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::time::Duration;

const FIRST_NAMES: &[&str] = &[
    "John", "Sarah", "Michael", "Emily", "David", "Lisa", "Robert", "Jennifer",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis",
];
const CALL_REASONS: &[&str] = &[
    "Refill Request",
    "Side Effects",
    "Insurance Question",
    "Prior Authorization",
    "Financial Assistance",
    "General Question",
    "Shipping Inquiry",
];
const UPDATE_FIELDS: &[&str] = &[
    "adherence_score",
    "journey_stage",
    "contact_preference",
    "insurance_info",
    "sdoh_risk_score",
];
const JOURNEY_STAGES: &[&str] =
    &["Awareness", "Start", "Treatment", "Established", "At Risk"];
const FRICTION_TOPICS: &[&str] = &[
    "Prior Authorization Delays",
    "High Out-of-Pocket Costs",
    "Insurance Coverage Issues",
    "Injection Site Reactions",
    "Shipping Delays",
];
const METRICS: &[&str] = &[
    "total_calls",
    "avg_sentiment",
    "first_call_resolution",
    "avg_handle_time",
    "adherence_rate",
];

/// Severity weights: low 30%, medium 40%, high 20%, critical 10%.
const SEVERITY_WEIGHTS: [(Severity, u32); 4] = [
    (Severity::Low, 30),
    (Severity::Medium, 40),
    (Severity::High, 20),
    (Severity::Critical, 10),
];

/// Maps a script plus virtual time onto emitted events.
#[derive(Debug)]
pub struct ScenarioGenerator {
    /// Script being played
    scenario: &'static Scenario,

    /// Index of the next entry to emit
    cursor: usize,

    /// Virtual time at which the current scenario started
    origin: Duration,

    /// Next event id; never rewound so ids stay unique across runs
    next_event_id: u64,

    /// Master seed for payload filling
    seed: u64,

    /// RNG for open template fields
    rng: ChaCha8Rng,

    /// Calls allocated in this run (for CALL-nnnn ids)
    call_seq: u32,

    /// Calls started by this scenario and not yet completed, oldest first
    open_calls: VecDeque<String>,
}

impl ScenarioGenerator {
    /// Creates a generator positioned at the start of `scenario`.
    pub fn new(scenario: ScenarioId, seed: u64) -> Self {
        Self {
            scenario: scenario.scenario(),
            cursor: 0,
            origin: Duration::ZERO,
            next_event_id: 1,
            seed,
            rng: scenario_rng(seed, scenario),
            call_seq: 0,
            open_calls: VecDeque::new(),
        }
    }

    /// Switches to another scenario whose offsets count from `origin`.
    ///
    /// Clears the emitted set; virtual time itself is not touched.
    pub fn select(&mut self, scenario: ScenarioId, origin: Duration) {
        self.scenario = scenario.scenario();
        self.cursor = 0;
        self.origin = origin;
        self.rng = scenario_rng(self.seed, scenario);
        self.open_calls.clear();
    }

    /// Rewinds to the start of the current scenario at virtual time zero.
    pub fn reset(&mut self) {
        self.select(self.scenario.id, Duration::ZERO);
        self.call_seq = 0;
    }

    /// Returns the next entry due at or before `virtual_time`, if any.
    ///
    /// Call repeatedly until `None` to drain a tick; entries come out in
    /// ascending offset order and each one exactly once.
    pub fn next_due(&mut self, virtual_time: Duration) -> Option<DomainEvent> {
        let entry = *self.scenario.script.get(self.cursor)?;
        let due_at = self.origin.saturating_add(entry.offset);
        if due_at > virtual_time {
            return None;
        }
        self.cursor += 1;

        let id = EventId(self.next_event_id);
        self.next_event_id += 1;

        let payload = self.render(&entry.template);
        Some(DomainEvent::new(id, due_at, payload))
    }

    /// True once every entry of the current script has been emitted.
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.scenario.len()
    }

    /// Current scenario id.
    pub fn scenario_id(&self) -> ScenarioId {
        self.scenario.id
    }

    /// Current scenario script.
    pub fn scenario(&self) -> &'static Scenario {
        self.scenario
    }

    /// Entries of the current script emitted so far.
    pub fn emitted(&self) -> usize {
        self.cursor
    }

    /// Virtual time the current scenario ends at.
    pub fn end_time(&self) -> Duration {
        self.origin.saturating_add(self.scenario.duration)
    }

    fn render(&mut self, template: &PayloadTemplate) -> EventPayload {
        match *template {
            PayloadTemplate::NewCall {
                patient,
                direction,
                reason,
            } => {
                self.call_seq += 1;
                let call_id = format!("CALL-{:04}", self.call_seq);
                self.open_calls.push_back(call_id.clone());
                let (patient_name, _) = self.patient(patient);
                let reason = self.fill(reason, CALL_REASONS);
                EventPayload::NewCall(NewCall {
                    call_id,
                    patient_name,
                    direction,
                    reason,
                })
            }
            PayloadTemplate::CallCompleted {
                resolution,
                duration_secs,
            } => {
                let call_id = match self.open_calls.pop_front() {
                    Some(id) => id,
                    None => {
                        self.call_seq += 1;
                        format!("CALL-{:04}", self.call_seq)
                    }
                };
                let duration_secs = duration_secs.unwrap_or_else(|| self.rng.gen_range(120..720));
                let sentiment = round_to(self.rng.gen_range(0.6..1.0), 100.0);
                EventPayload::CallCompleted(CallCompleted {
                    call_id,
                    duration_secs,
                    resolution,
                    sentiment,
                })
            }
            PayloadTemplate::PatientUpdated {
                patient,
                field,
                journey_stage,
            } => {
                let (patient_name, patient_id) = self.patient(patient);
                let field = self.fill(field, UPDATE_FIELDS);
                let journey_stage = self.fill(journey_stage, JOURNEY_STAGES);
                EventPayload::PatientUpdated(PatientUpdated {
                    patient_id,
                    patient_name,
                    field,
                    journey_stage,
                })
            }
            PayloadTemplate::FrictionDetected { topic, severity } => {
                let topic = self.fill(topic, FRICTION_TOPICS);
                let severity = severity.unwrap_or_else(|| self.weighted_severity());
                EventPayload::FrictionDetected(FrictionDetected {
                    topic,
                    severity,
                    patient_id: self.scenario.protagonist_id.to_string(),
                })
            }
            PayloadTemplate::MetricUpdate { metric, change_pct } => {
                let metric = self.fill(metric, METRICS);
                let value = self.rng.gen_range(0..100);
                let change_pct =
                    change_pct.unwrap_or_else(|| round_to(self.rng.gen_range(-10.0..10.0), 10.0));
                EventPayload::MetricUpdate(MetricUpdate {
                    metric,
                    value,
                    change_pct,
                })
            }
        }
    }

    /// Returns `(name, id)` for a patient reference.
    fn patient(&mut self, patient: PatientRef) -> (String, String) {
        match patient {
            PatientRef::Protagonist => (
                self.scenario.protagonist.to_string(),
                self.scenario.protagonist_id.to_string(),
            ),
            PatientRef::Random => {
                let name = format!("{} {}", self.pick(FIRST_NAMES), self.pick(LAST_NAMES));
                let id = format!("PAT-{:03}", self.rng.gen_range(0..1000));
                (name, id)
            }
        }
    }

    /// Scripted value if present, otherwise a draw from `pool`.
    fn fill(&mut self, scripted: Option<&'static str>, pool: &[&str]) -> String {
        match scripted {
            Some(value) => value.to_string(),
            None => self.pick(pool),
        }
    }

    fn pick(&mut self, pool: &[&str]) -> String {
        pool.choose(&mut self.rng).copied().unwrap_or_default().to_string()
    }

    fn weighted_severity(&mut self) -> Severity {
        let total: u32 = SEVERITY_WEIGHTS.iter().map(|(_, w)| w).sum();
        let mut roll = self.rng.gen_range(0..total);
        for (severity, weight) in SEVERITY_WEIGHTS {
            if roll < weight {
                return severity;
            }
            roll -= weight;
        }
        Severity::Medium
    }
}

fn scenario_rng(seed: u64, scenario: ScenarioId) -> ChaCha8Rng {
    let salt = ScenarioId::all()
        .iter()
        .position(|id| *id == scenario)
        .unwrap_or(0) as u64;
    ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x9e3779b97f4a7c15) ^ salt)
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn drain(generator: &mut ScenarioGenerator, virtual_time: Duration) -> Vec<DomainEvent> {
        std::iter::from_fn(|| generator.next_due(virtual_time)).collect()
    }

    #[test]
    fn test_emits_only_due_entries() {
        let mut generator = ScenarioGenerator::new(ScenarioId::NewPatientOnboarding, 42);
        assert!(drain(&mut generator, Duration::from_millis(1_999)).is_empty());

        let events = drain(&mut generator, Duration::from_millis(15_000));
        let stamps: Vec<u64> = events
            .iter()
            .map(|e| e.virtual_timestamp.as_millis() as u64)
            .collect();
        assert_eq!(stamps, vec![2_000, 8_000, 15_000]);
        assert_eq!(events[0].kind, EventKind::NewCall);
        assert_eq!(generator.emitted(), 3);
    }

    #[test]
    fn test_no_duplicates_on_repeated_ticks() {
        let mut generator = ScenarioGenerator::new(ScenarioId::PaSuccess, 1);
        let first = drain(&mut generator, Duration::from_secs(20));
        let again = drain(&mut generator, Duration::from_secs(20));
        assert_eq!(first.len(), 2);
        assert!(again.is_empty());
    }

    #[test]
    fn test_finishes_and_stays_finished() {
        let mut generator = ScenarioGenerator::new(ScenarioId::HighRiskRecovery, 7);
        let all = drain(&mut generator, Duration::from_secs(600));
        assert_eq!(all.len(), ScenarioId::HighRiskRecovery.scenario().len());
        assert!(generator.is_finished());
        assert!(drain(&mut generator, Duration::from_secs(6_000)).is_empty());
    }

    #[test]
    fn test_ids_unique_across_resets() {
        let mut generator = ScenarioGenerator::new(ScenarioId::NewPatientOnboarding, 42);
        let mut ids: Vec<EventId> = drain(&mut generator, Duration::from_secs(200))
            .iter()
            .map(|e| e.id)
            .collect();
        generator.reset();
        ids.extend(drain(&mut generator, Duration::from_secs(200)).iter().map(|e| e.id));

        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_same_seed_same_payloads() {
        let mut a = ScenarioGenerator::new(ScenarioId::AdverseEventHandling, 99);
        let mut b = ScenarioGenerator::new(ScenarioId::AdverseEventHandling, 99);
        assert_eq!(
            drain(&mut a, Duration::from_secs(300)),
            drain(&mut b, Duration::from_secs(300))
        );
    }

    #[test]
    fn test_reset_replays_identically() {
        let mut generator = ScenarioGenerator::new(ScenarioId::PaSuccess, 5);
        let first: Vec<EventPayload> = drain(&mut generator, Duration::from_secs(300))
            .into_iter()
            .map(|e| e.payload)
            .collect();
        generator.reset();
        let second: Vec<EventPayload> = drain(&mut generator, Duration::from_secs(300))
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_restarts_from_origin() {
        let mut generator = ScenarioGenerator::new(ScenarioId::NewPatientOnboarding, 42);
        drain(&mut generator, Duration::from_secs(30));

        generator.select(ScenarioId::AdverseEventHandling, Duration::from_secs(30));
        assert_eq!(generator.emitted(), 0);
        assert!(drain(&mut generator, Duration::from_millis(32_999)).is_empty());

        let events = drain(&mut generator, Duration::from_secs(33));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].virtual_timestamp, Duration::from_secs(33));
        assert_eq!(generator.end_time(), Duration::from_secs(330));
    }

    #[test]
    fn test_completion_closes_open_call() {
        let mut generator = ScenarioGenerator::new(ScenarioId::NewPatientOnboarding, 42);
        let events = drain(&mut generator, Duration::from_secs(40));

        let opened = events.iter().find_map(|e| match &e.payload {
            EventPayload::NewCall(call) => Some(call.call_id.clone()),
            _ => None,
        });
        let closed = events.iter().find_map(|e| match &e.payload {
            EventPayload::CallCompleted(done) => Some(done.call_id.clone()),
            _ => None,
        });
        assert_eq!(opened.as_deref(), Some("CALL-0001"));
        assert_eq!(opened, closed);
    }

    #[test]
    fn test_random_fields_in_range() {
        let mut generator = ScenarioGenerator::new(ScenarioId::PaSuccess, 3);
        for event in drain(&mut generator, Duration::from_secs(300)) {
            match event.payload {
                EventPayload::CallCompleted(done) => {
                    assert!((120..720).contains(&done.duration_secs) || done.duration_secs == 420);
                    assert!((0.6..=1.0).contains(&done.sentiment));
                }
                EventPayload::MetricUpdate(metric) => {
                    assert!(metric.value < 100);
                    assert!((-10.0..=10.0).contains(&metric.change_pct));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_open_fields_drawn_from_pools() {
        for seed in 0..20 {
            for id in ScenarioId::all() {
                let mut generator = ScenarioGenerator::new(id, seed);
                for event in drain(&mut generator, Duration::from_secs(600)) {
                    match event.payload {
                        EventPayload::PatientUpdated(update) => {
                            assert!(UPDATE_FIELDS.contains(&update.field.as_str()));
                            assert!(JOURNEY_STAGES.contains(&update.journey_stage.as_str()));
                        }
                        EventPayload::FrictionDetected(friction) => {
                            assert!(FRICTION_TOPICS.contains(&friction.topic.as_str()));
                        }
                        EventPayload::MetricUpdate(metric) => {
                            assert!(METRICS.contains(&metric.metric.as_str()));
                        }
                        EventPayload::NewCall(_) | EventPayload::CallCompleted(_) => {}
                    }
                }
            }
        }
    }

    #[test]
    fn test_open_fields_vary_with_seed() {
        // Entry at 200s leaves both update fields open
        let updates: std::collections::HashSet<(String, String)> = (0..20)
            .filter_map(|seed| {
                let mut generator = ScenarioGenerator::new(ScenarioId::AdverseEventHandling, seed);
                drain(&mut generator, Duration::from_secs(200))
                    .into_iter()
                    .last()
                    .and_then(|event| match event.payload {
                        EventPayload::PatientUpdated(update) => {
                            Some((update.field, update.journey_stage))
                        }
                        _ => None,
                    })
            })
            .collect();
        assert!(updates.len() > 1);
    }
}
