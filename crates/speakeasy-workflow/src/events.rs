//! Workflow observer events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use speakeasy_types::WorkflowState;

/// Events a view can subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The workflow moved to a new state.
    StateChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Uuid>,
        state: WorkflowState,
    },
    /// A video passed validation and is ready to submit.
    CandidateSelected {
        file_name: String,
        size_bytes: u64,
        mime_type: String,
    },
    /// A selection was rejected.
    ValidationFailed { message: String },
    /// Live recording started.
    CaptureStarted { mime_type: String },
    /// Camera or microphone failed.
    CaptureFailed { message: String },
    /// Live recording stopped and was assembled.
    CaptureFinished { file_name: String, size_bytes: u64 },
    /// The session was cleared.
    Reset,
}

impl WorkflowEvent {
    /// Event type name, as serialized.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::StateChanged { .. } => "state_changed",
            WorkflowEvent::CandidateSelected { .. } => "candidate_selected",
            WorkflowEvent::ValidationFailed { .. } => "validation_failed",
            WorkflowEvent::CaptureStarted { .. } => "capture_started",
            WorkflowEvent::CaptureFailed { .. } => "capture_failed",
            WorkflowEvent::CaptureFinished { .. } => "capture_finished",
            WorkflowEvent::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_serde() {
        let event = WorkflowEvent::StateChanged {
            session: None,
            state: WorkflowState::Uploading { progress: 40 },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"state_changed","state":{"state":"uploading","progress":40}}"#
        );
        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_name_matches_tag() {
        let events = [
            WorkflowEvent::Reset,
            WorkflowEvent::ValidationFailed {
                message: "bad".into(),
            },
            WorkflowEvent::CaptureFinished {
                file_name: "r.webm".into(),
                size_bytes: 3,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }
}
