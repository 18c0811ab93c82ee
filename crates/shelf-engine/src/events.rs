//! Observer event envelope: `{"type": ..., "payload": ..., "timestamp": ...}`

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shelf_core::{CellSnapshot, Job, JobAction, LayoutInfo, ShelfSummary};

/// Payload of `job_completed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompleted {
    #[serde(rename = "completedJobId")]
    pub completed_job_id: String,
    pub lot_no: String,
    pub biz: String,
    pub shelf_id: String,
    pub level: u32,
    pub block: u32,
    pub action: JobAction,
    /// Full cell snapshot after the mutation
    pub shelf_state: Vec<CellSnapshot>,
}

/// Payload of `completion_reported`, sent once the Gateway answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReported {
    #[serde(rename = "completedJobId")]
    pub completed_job_id: String,
    pub lot_no: String,
    pub gateway_success: bool,
}

/// Payload of `layout_updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutUpdated {
    pub layout: LayoutInfo,
    pub shelf_state: Vec<CellSnapshot>,
    /// Lots that did not survive the new layout, as `"<lot> at <position>"`
    pub dropped: Vec<String>,
}

/// Payload of `shelf_state_updated` / `shelf_state_restored`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChanged {
    pub shelf_state: Vec<CellSnapshot>,
    pub summary: ShelfSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

/// Full state delivered to a newly connected observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfSnapshot {
    pub shelf_id: Option<String>,
    pub layout: LayoutInfo,
    pub shelf_state: Vec<CellSnapshot>,
    pub jobs: Vec<Job>,
    pub summary: ShelfSummary,
}

/// Events fanned out to every observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ShelfEvent {
    NewJob(Job),
    JobCompleted(JobCompleted),
    CompletionReported(CompletionReported),
    JobError(Job),
    JobCanceled(Job),
    SystemReset,
    LayoutUpdated(LayoutUpdated),
    ShelfStateUpdated(StateChanged),
    ShelfStateRestored(StateChanged),
    InitialState(ShelfSnapshot),
}

impl ShelfEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewJob(_) => "new_job",
            Self::JobCompleted(_) => "job_completed",
            Self::CompletionReported(_) => "completion_reported",
            Self::JobError(_) => "job_error",
            Self::JobCanceled(_) => "job_canceled",
            Self::SystemReset => "system_reset",
            Self::LayoutUpdated(_) => "layout_updated",
            Self::ShelfStateUpdated(_) => "shelf_state_updated",
            Self::ShelfStateRestored(_) => "shelf_state_restored",
            Self::InitialState(_) => "initial_state",
        }
    }

    /// Serialize into a timestamped JSON message
    pub fn to_message(&self) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "timestamp".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_core::{Inventory, JobRequest, PlaceFlag, Position};

    #[test]
    fn test_envelope_shape() {
        let request = JobRequest::new("A1", Position::new(1, 1), PlaceFlag::Place, 5, "IS");
        let job = Job::from_request("job_1".into(), request, "PC2".into());
        let message = ShelfEvent::NewJob(job).to_message().unwrap();
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["type"], "new_job");
        assert_eq!(value["payload"]["jobId"], "job_1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_unit_event_has_no_payload() {
        let value = serde_json::to_value(ShelfEvent::SystemReset).unwrap();
        assert_eq!(value, serde_json::json!({"type": "system_reset"}));
    }

    #[test]
    fn test_kind_matches_serialized_type() {
        let inventory = Inventory::default();
        let events = [
            ShelfEvent::SystemReset,
            ShelfEvent::CompletionReported(CompletionReported {
                completed_job_id: "job_1".into(),
                lot_no: "A1".into(),
                gateway_success: false,
            }),
            ShelfEvent::ShelfStateUpdated(StateChanged {
                shelf_state: inventory.snapshot(),
                summary: inventory.summary(),
                rejected: vec![],
            }),
            ShelfEvent::InitialState(ShelfSnapshot {
                shelf_id: None,
                layout: inventory.layout().info(),
                shelf_state: inventory.snapshot(),
                jobs: vec![],
                summary: inventory.summary(),
            }),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }
}
