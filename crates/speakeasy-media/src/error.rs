//! Error taxonomy shared by validation, upload and capture.

use thiserror::Error;

/// Message shown when a selection is not a video.
pub const INVALID_VIDEO_MESSAGE: &str = "Please upload a valid video file.";

/// Message shown when the service gave no usable reason.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to analyze video. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Selection rejected locally; never reaches the network.
    #[error("{}", INVALID_VIDEO_MESSAGE)]
    Validation { mime_type: String },
    /// Transport failed before a response arrived.
    #[error("{message}")]
    Network { message: String },
    /// The service answered with a non-success status.
    #[error("{message}")]
    Service { status: u16, message: String },
    /// Camera or microphone could not be used.
    #[error("{message}")]
    Capture { message: String },
}

impl AnalysisError {
    pub fn network(detail: impl std::fmt::Display) -> Self {
        tracing::debug!("Transport failure: {detail}");
        AnalysisError::Network {
            message: GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Build a service error, preferring the server-supplied message.
    pub fn service(status: u16, message: Option<String>) -> Self {
        AnalysisError::Service {
            status,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        AnalysisError::Capture {
            message: message.into(),
        }
    }

    /// The text shown to the user.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
