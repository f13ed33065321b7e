//! JSON exporter for recorded runs.
//!
//! Captures every delivered event with the wall-clock instant it arrived,
//! plus the notification transitions, so a run can be inspected or diffed
//! offline.

use crate::runner::ScenarioResult;
use pulse_core::notifications::NotificationTransition;
use pulse_core::DomainEvent;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Failures while writing an export.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Export I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One delivered event.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedEvent {
    /// Wall-clock milliseconds since the run started
    pub delivered_at_ms: u64,
    pub event: DomainEvent,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize)]
pub struct RunExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub acceleration: f64,
    pub tick_ms: u64,

    /// Unix milliseconds of the context's calendar clock at start
    pub started_at_ms: u64,

    /// Every event delivered, in delivery order
    pub events: Vec<ExportedEvent>,

    /// Notification state changes, oldest first
    pub transitions: Vec<NotificationTransition>,

    /// Final results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScenarioResult>,
}

impl RunExport {
    /// Creates a new export container.
    pub fn new(
        scenario: &str,
        seed: u64,
        acceleration: f64,
        tick_ms: u64,
        started_at_ms: u64,
    ) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            acceleration,
            tick_ms,
            started_at_ms,
            events: Vec::new(),
            transitions: Vec::new(),
            result: None,
        }
    }

    /// Adds a delivered event.
    pub fn add_event(&mut self, delivered_at_ms: u64, event: DomainEvent) {
        self.events.push(ExportedEvent {
            delivered_at_ms,
            event,
        });
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, result: ScenarioResult) {
        self.result = Some(result);
    }

    /// Whether the recorded run passed its checks.
    pub fn passed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.passed)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::event::{EventPayload, MetricUpdate};
    use pulse_core::EventId;
    use std::time::Duration;

    fn metric_event() -> DomainEvent {
        DomainEvent::new(
            EventId(1),
            Duration::from_millis(2_000),
            EventPayload::MetricUpdate(MetricUpdate {
                metric: "total_calls".to_string(),
                value: 12,
                change_pct: 3.5,
            }),
        )
    }

    #[test]
    fn test_export_json_shape() {
        let mut export = RunExport::new("pa_success", 7, 10.0, 50, 1_704_067_200_000);
        export.add_event(200, metric_event());

        let json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(json["scenario"], "pa_success");
        assert_eq!(json["events"][0]["delivered_at_ms"], 200);
        assert_eq!(json["events"][0]["event"]["kind"], "metric_update");
        assert!(json.get("result").is_none());
        assert!(!export.passed());
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let export = RunExport::new("pa_success", 7, 10.0, 50, 0);
        let err = export
            .write_to_file("/nonexistent-dir/pulse/export.json")
            .unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }

    #[test]
    fn test_write_round_trip() {
        let path = std::env::temp_dir().join(format!("pulse-export-{}.json", std::process::id()));
        let mut export = RunExport::new("adverse_event_handling", 1, 2.0, 50, 0);
        export.add_event(10, metric_event());
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(text.contains("\"adverse_event_handling\""));
        assert!(text.contains("\"total_calls\""));
    }
}
