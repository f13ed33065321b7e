//! Scenario script library - the four rehearsed demo narratives.
//!
//! Each scenario is a static, time-ordered list of
//! `(virtual offset, payload template)` entries. Templates name the kind and
//! fix the narrative fields; fields left open are filled by the generator
//! from its seeded RNG.

use crate::error::EngineError;
use crate::event::{CallDirection, EventKind, Resolution, Severity};
use std::time::Duration;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// A new patient enrolls, hits an insurance snag, starts treatment
    NewPatientOnboarding,

    /// A lapsing patient is pulled back through financial assistance
    HighRiskRecovery,

    /// A prior authorization is denied, appealed and approved
    PaSuccess,

    /// A reported side effect is triaged, escalated and resolved
    AdverseEventHandling,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::NewPatientOnboarding,
            ScenarioId::HighRiskRecovery,
            ScenarioId::PaSuccess,
            ScenarioId::AdverseEventHandling,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::NewPatientOnboarding => "new_patient_onboarding",
            ScenarioId::HighRiskRecovery => "high_risk_recovery",
            ScenarioId::PaSuccess => "pa_success",
            ScenarioId::AdverseEventHandling => "adverse_event_handling",
        }
    }

    /// Returns the control-panel label.
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioId::NewPatientOnboarding => "New Patient Onboarding",
            ScenarioId::HighRiskRecovery => "High-Risk Recovery",
            ScenarioId::PaSuccess => "Prior Auth Success",
            ScenarioId::AdverseEventHandling => "Adverse Event Handling",
        }
    }

    /// Returns the script for this scenario.
    pub fn scenario(&self) -> &'static Scenario {
        match self {
            ScenarioId::NewPatientOnboarding => &NEW_PATIENT_ONBOARDING,
            ScenarioId::HighRiskRecovery => &HIGH_RISK_RECOVERY,
            ScenarioId::PaSuccess => &PA_SUCCESS,
            ScenarioId::AdverseEventHandling => &ADVERSE_EVENT_HANDLING,
        }
    }

    /// Lenient lookup: unknown ids fall back to `default` instead of failing.
    ///
    /// Returns the resolved id and whether the fallback was taken.
    pub fn resolve(id: &str, default: ScenarioId) -> (ScenarioId, bool) {
        match id.parse() {
            Ok(found) => (found, false),
            Err(_) => (default, true),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl serde::Serialize for ScenarioId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new_patient_onboarding" | "new_patient" | "onboarding" => {
                Ok(ScenarioId::NewPatientOnboarding)
            }
            "high_risk_recovery" | "high_risk" => Ok(ScenarioId::HighRiskRecovery),
            "pa_success" | "prior_auth" => Ok(ScenarioId::PaSuccess),
            "adverse_event_handling" | "adverse_event" => Ok(ScenarioId::AdverseEventHandling),
            _ => Err(EngineError::UnknownScenario(s.to_string())),
        }
    }
}

/// Who a patient-bearing entry is about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatientRef {
    /// The scenario's main patient
    Protagonist,
    /// Another patient drawn from the seeded name pool
    Random,
}

/// Kind plus the narrative-fixed fields of one scripted event.
///
/// `None` fields are filled by the generator's seeded RNG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadTemplate {
    NewCall {
        patient: PatientRef,
        direction: CallDirection,
        reason: Option<&'static str>,
    },
    /// Closes the oldest call still open in this run.
    CallCompleted {
        resolution: Resolution,
        duration_secs: Option<u32>,
    },
    PatientUpdated {
        patient: PatientRef,
        field: Option<&'static str>,
        journey_stage: Option<&'static str>,
    },
    FrictionDetected {
        topic: Option<&'static str>,
        severity: Option<Severity>,
    },
    MetricUpdate {
        metric: Option<&'static str>,
        change_pct: Option<f64>,
    },
}

impl PayloadTemplate {
    /// Returns the kind of event this template produces.
    pub fn kind(&self) -> EventKind {
        match self {
            PayloadTemplate::NewCall { .. } => EventKind::NewCall,
            PayloadTemplate::CallCompleted { .. } => EventKind::CallCompleted,
            PayloadTemplate::PatientUpdated { .. } => EventKind::PatientUpdated,
            PayloadTemplate::FrictionDetected { .. } => EventKind::FrictionDetected,
            PayloadTemplate::MetricUpdate { .. } => EventKind::MetricUpdate,
        }
    }
}

/// One timed line of a script.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEntry {
    /// Virtual time after scenario start at which the entry fires
    pub offset: Duration,
    pub template: PayloadTemplate,
}

/// A named, fixed script of timed events.
#[derive(Debug)]
pub struct Scenario {
    pub id: ScenarioId,

    /// Main patient of the narrative
    pub protagonist: &'static str,
    pub protagonist_id: &'static str,

    /// Total virtual duration (offset of the last entry)
    pub duration: Duration,

    /// Entries in ascending offset order
    pub script: &'static [ScriptEntry],
}

impl Scenario {
    /// Number of scripted events.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

const fn at(ms: u64, template: PayloadTemplate) -> ScriptEntry {
    ScriptEntry {
        offset: Duration::from_millis(ms),
        template,
    }
}

const fn call(
    patient: PatientRef,
    direction: CallDirection,
    reason: Option<&'static str>,
) -> PayloadTemplate {
    PayloadTemplate::NewCall {
        patient,
        direction,
        reason,
    }
}

const fn done(resolution: Resolution, duration_secs: Option<u32>) -> PayloadTemplate {
    PayloadTemplate::CallCompleted {
        resolution,
        duration_secs,
    }
}

const fn moved(
    field: Option<&'static str>,
    journey_stage: Option<&'static str>,
) -> PayloadTemplate {
    PayloadTemplate::PatientUpdated {
        patient: PatientRef::Protagonist,
        field,
        journey_stage,
    }
}

const fn friction(topic: Option<&'static str>, severity: Option<Severity>) -> PayloadTemplate {
    PayloadTemplate::FrictionDetected { topic, severity }
}

const fn metric(metric: Option<&'static str>, change_pct: Option<f64>) -> PayloadTemplate {
    PayloadTemplate::MetricUpdate { metric, change_pct }
}

use CallDirection::{Inbound, Outbound};
use PatientRef::{Protagonist, Random};
use Resolution::{Escalated, Resolved};

static NEW_PATIENT_ONBOARDING: Scenario = Scenario {
    id: ScenarioId::NewPatientOnboarding,
    protagonist: "Maria Lopez",
    protagonist_id: "PAT-101",
    duration: Duration::from_millis(120_000),
    script: &[
        at(2_000, call(Protagonist, Inbound, Some("Enrollment Question"))),
        at(8_000, moved(Some("journey_stage"), Some("Start"))),
        at(15_000, friction(Some("Insurance Coverage Issues"), Some(Severity::Medium))),
        at(24_000, metric(Some("total_calls"), Some(3.5))),
        at(35_000, done(Resolved, Some(540))),
        at(50_000, moved(Some("insurance_info"), Some("Start"))),
        at(62_000, call(Protagonist, Outbound, Some("Financial Assistance"))),
        at(75_000, metric(None, None)),
        at(88_000, done(Resolved, None)),
        at(100_000, moved(Some("journey_stage"), Some("Treatment"))),
        at(112_000, call(Random, Inbound, None)),
        at(120_000, metric(Some("adherence_rate"), Some(2.1))),
    ],
};

static HIGH_RISK_RECOVERY: Scenario = Scenario {
    id: ScenarioId::HighRiskRecovery,
    protagonist: "James Carter",
    protagonist_id: "PAT-214",
    duration: Duration::from_millis(180_000),
    script: &[
        at(5_000, friction(Some("High Out-of-Pocket Costs"), Some(Severity::High))),
        at(12_000, moved(Some("sdoh_risk_score"), Some("At Risk"))),
        at(20_000, call(Protagonist, Outbound, Some("Financial Assistance"))),
        at(38_000, metric(Some("adherence_rate"), Some(-4.8))),
        at(55_000, done(Escalated, Some(710))),
        at(70_000, friction(None, None)),
        at(85_000, call(Protagonist, Outbound, Some("Refill Request"))),
        at(104_000, done(Resolved, None)),
        at(120_000, moved(None, Some("Treatment"))),
        at(140_000, metric(Some("avg_sentiment"), Some(6.3))),
        at(160_000, moved(Some("journey_stage"), Some("Established"))),
        at(180_000, metric(Some("adherence_rate"), Some(5.4))),
    ],
};

static PA_SUCCESS: Scenario = Scenario {
    id: ScenarioId::PaSuccess,
    protagonist: "Linda Nguyen",
    protagonist_id: "PAT-307",
    duration: Duration::from_millis(240_000),
    script: &[
        at(4_000, call(Protagonist, Inbound, Some("Prior Authorization"))),
        at(15_000, friction(Some("Prior Authorization Delays"), Some(Severity::High))),
        at(30_000, done(Escalated, None)),
        at(48_000, call(Protagonist, Outbound, Some("Prior Authorization"))),
        at(70_000, moved(Some("insurance_info"), Some("Start"))),
        at(95_000, done(Resolved, Some(420))),
        at(120_000, metric(Some("first_call_resolution"), Some(3.2))),
        at(150_000, moved(Some("journey_stage"), None)),
        at(175_000, call(Random, Inbound, Some("Shipping Inquiry"))),
        at(200_000, done(Resolved, None)),
        at(225_000, metric(Some("avg_handle_time"), Some(-7.5))),
        at(240_000, moved(Some("adherence_score"), Some("Established"))),
    ],
};

static ADVERSE_EVENT_HANDLING: Scenario = Scenario {
    id: ScenarioId::AdverseEventHandling,
    protagonist: "Robert Kim",
    protagonist_id: "PAT-482",
    duration: Duration::from_millis(300_000),
    script: &[
        at(3_000, call(Protagonist, Inbound, Some("Side Effects"))),
        at(10_000, friction(Some("Injection Site Reactions"), Some(Severity::Critical))),
        at(25_000, moved(Some("journey_stage"), Some("At Risk"))),
        at(45_000, done(Escalated, Some(660))),
        at(70_000, call(Protagonist, Outbound, Some("Side Effects"))),
        at(100_000, done(Resolved, None)),
        at(130_000, metric(Some("avg_sentiment"), Some(-3.1))),
        at(165_000, friction(Some("Injection Site Reactions"), Some(Severity::Low))),
        at(200_000, moved(None, None)),
        at(240_000, call(Random, Inbound, None)),
        at(270_000, done(Resolved, None)),
        at(300_000, metric(Some("adherence_rate"), Some(1.8))),
    ],
};
