//! Domain events emitted by the scenario generator.
//!
//! Every event has the same outer shape `{ id, kind, virtual_timestamp, payload }`.
//! The payload fields are fixed per kind and documented once here.

use pulse_env::EventId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The five kinds of simulated fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewCall,
    CallCompleted,
    PatientUpdated,
    FrictionDetected,
    MetricUpdate,
}

impl EventKind {
    /// Returns all kinds in declaration order.
    pub fn all() -> [EventKind; 5] {
        [
            EventKind::NewCall,
            EventKind::CallCompleted,
            EventKind::PatientUpdated,
            EventKind::FrictionDetected,
            EventKind::MetricUpdate,
        ]
    }

    /// Returns the wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::NewCall => "new_call",
            EventKind::CallCompleted => "call_completed",
            EventKind::PatientUpdated => "patient_updated",
            EventKind::FrictionDetected => "friction_detected",
            EventKind::MetricUpdate => "metric_update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .into_iter()
            .find(|kind| kind.name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown event kind: {}", s))
    }
}

/// What a subscription wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only events of one kind.
    Kind(EventKind),
}

impl EventFilter {
    /// Returns true if the event passes this filter.
    pub fn matches(&self, event: &DomainEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kind(kind) => *kind == event.kind,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

impl std::str::FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(EventFilter::All)
        } else {
            s.parse().map(EventFilter::Kind)
        }
    }
}

/// An immutable, timestamped fact about the simulated world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique within a run
    pub id: EventId,

    /// Kind of fact; always agrees with `payload`
    pub kind: EventKind,

    /// Simulated time at which the event "occurred"
    #[serde(with = "millis")]
    pub virtual_timestamp: Duration,

    /// Kind-specific data
    pub payload: EventPayload,
}

impl DomainEvent {
    /// Creates an event, deriving `kind` from the payload.
    pub fn new(id: EventId, virtual_timestamp: Duration, payload: EventPayload) -> Self {
        Self {
            id,
            kind: payload.kind(),
            virtual_timestamp,
            payload,
        }
    }

    /// One-line human summary, used for toasts and logs.
    pub fn headline(&self) -> String {
        match &self.payload {
            EventPayload::NewCall(call) => format!(
                "New Call: {} call from {}",
                match call.direction {
                    CallDirection::Inbound => "Incoming",
                    CallDirection::Outbound => "Outbound",
                },
                call.patient_name
            ),
            EventPayload::CallCompleted(done) => format!(
                "Call Completed: {} {} ({}m {}s)",
                done.call_id,
                done.resolution,
                done.duration_secs / 60,
                done.duration_secs % 60
            ),
            EventPayload::PatientUpdated(update) => format!(
                "Patient Updated: {} moved to {}",
                update.patient_name, update.journey_stage
            ),
            EventPayload::FrictionDetected(friction) => format!(
                "Friction Detected: {} (severity: {})",
                friction.topic, friction.severity
            ),
            EventPayload::MetricUpdate(metric) => format!(
                "Metric Updated: {} {:+.1}%",
                metric.metric, metric.change_pct
            ),
        }
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    NewCall(NewCall),
    CallCompleted(CallCompleted),
    PatientUpdated(PatientUpdated),
    FrictionDetected(FrictionDetected),
    MetricUpdate(MetricUpdate),
}

impl EventPayload {
    /// Returns the kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::NewCall(_) => EventKind::NewCall,
            EventPayload::CallCompleted(_) => EventKind::CallCompleted,
            EventPayload::PatientUpdated(_) => EventKind::PatientUpdated,
            EventPayload::FrictionDetected(_) => EventKind::FrictionDetected,
            EventPayload::MetricUpdate(_) => EventKind::MetricUpdate,
        }
    }
}

/// Direction of a call relative to the support center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Resolved,
    Escalated,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::Resolved => write!(f, "resolved"),
            Resolution::Escalated => write!(f, "escalated"),
        }
    }
}

/// Severity of a detected friction point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// A call has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCall {
    pub call_id: String,
    pub patient_name: String,
    pub direction: CallDirection,
    pub reason: String,
}

/// A previously started call has ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCompleted {
    pub call_id: String,
    pub duration_secs: u32,
    pub resolution: Resolution,
    /// Sentiment score in [0, 1]
    pub sentiment: f64,
}

/// A patient record changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientUpdated {
    pub patient_id: String,
    pub patient_name: String,
    pub field: String,
    pub journey_stage: String,
}

/// A barrier to therapy was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrictionDetected {
    pub topic: String,
    pub severity: Severity,
    pub patient_id: String,
}

/// A dashboard KPI moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUpdate {
    pub metric: String,
    pub value: u32,
    /// Signed percent change
    pub change_pct: f64,
}

/// Serde helper: `Duration` as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
