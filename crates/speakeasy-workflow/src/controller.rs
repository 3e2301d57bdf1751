//! WorkflowController: one analysis session from selection to result.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use speakeasy_media::capture::{CaptureDevice, Recording};
use speakeasy_media::normalizer;
use speakeasy_media::validator;
use speakeasy_media::{AnalysisError, AnalysisService, ProgressReporter, ProgressUpdate, UploadRequest};
use speakeasy_types::{AnalysisMode, AnalysisResult, UploadCandidate, WorkflowState};

use crate::events::WorkflowEvent;

/// Status shown while the service processes a fully uploaded video.
pub const ANALYZING_MESSAGE: &str = "Analyzing your speech...";

/// Operations invoked in a state that does not allow them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("no video selected")]
    NoCandidate,

    #[error("live recording is not available in upload mode")]
    CaptureDisabled,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    /// Selection or capture failed; the message is also kept on the controller.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Drives the upload/analysis state machine.
///
/// Only one session runs at a time: `submit` borrows the controller mutably
/// until the terminal state is reached. Progress tagged with any other
/// session id is discarded.
pub struct WorkflowController {
    service: Arc<dyn AnalysisService>,
    mode: AnalysisMode,
    state: WorkflowState,
    candidate: Option<UploadCandidate>,
    validation_error: Option<String>,
    capture_error: Option<String>,
    recording: Option<Recording>,
    session: Option<Uuid>,
    events: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl WorkflowController {
    pub fn new(service: Arc<dyn AnalysisService>, mode: AnalysisMode) -> Self {
        Self {
            service,
            mode,
            state: WorkflowState::Idle,
            candidate: None,
            validation_error: None,
            capture_error: None,
            recording: None,
            session: None,
            events: None,
        }
    }

    /// Attach an observer channel.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn candidate(&self) -> Option<&UploadCandidate> {
        self.candidate.as_ref()
    }

    /// Message from the last rejected selection.
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// Message from the last camera/microphone failure.
    pub fn capture_error(&self) -> Option<&str> {
        self.capture_error.as_deref()
    }

    /// Current upload session, if one was started since the last reset.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.state.result()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Whole seconds recorded so far.
    pub fn recording_elapsed(&self) -> Option<u64> {
        self.recording.as_ref().map(Recording::elapsed_secs)
    }

    /// Watch the recording timer.
    pub fn subscribe_elapsed(&self) -> Option<watch::Receiver<u64>> {
        self.recording.as_ref().map(Recording::subscribe_elapsed)
    }

    /// Offer an artifact for analysis.
    ///
    /// A rejected artifact leaves the state and any previous candidate
    /// untouched and records the validation message.
    pub fn select(&mut self, candidate: UploadCandidate) -> Result<(), WorkflowError> {
        if !self.state.accepts_selection() {
            return Err(self.invalid("select a video"));
        }
        if self.recording.is_some() {
            return Err(WorkflowError::AlreadyRecording);
        }

        if let Err(e) = validator::validate(&candidate) {
            let message = e.user_message();
            warn!(file = %candidate.file_name, mime = %candidate.mime_type, "Rejected selection");
            self.validation_error = Some(message.clone());
            self.emit(WorkflowEvent::ValidationFailed { message });
            return Err(e.into());
        }

        debug!(file = %candidate.file_name, size = candidate.size_bytes, "Selected video");
        self.validation_error = None;
        self.emit(WorkflowEvent::CandidateSelected {
            file_name: candidate.file_name.clone(),
            size_bytes: candidate.size_bytes,
            mime_type: candidate.mime_type.clone(),
        });
        self.candidate = Some(candidate);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.candidate = None;
        self.validation_error = None;
    }

    /// Upload the selected candidate and wait for the terminal state.
    ///
    /// Service and transport failures end in `Error`; they are not returned
    /// as `Err`. Dropping the returned future abandons the session, after
    /// which [`reset`](Self::reset) returns to `Idle`.
    pub async fn submit(
        &mut self,
        speech_purpose: Option<String>,
    ) -> Result<&WorkflowState, WorkflowError> {
        if !self.state.accepts_selection() {
            return Err(self.invalid("submit"));
        }
        if self.recording.is_some() {
            return Err(WorkflowError::AlreadyRecording);
        }
        let candidate = self.candidate.clone().ok_or(WorkflowError::NoCandidate)?;

        let session = Uuid::new_v4();
        self.session = Some(session);
        info!(%session, file = %candidate.file_name, service = self.service.id(), "Submitting video");
        self.transition(WorkflowState::Uploading { progress: 0 });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(session, tx);
        let request = UploadRequest {
            candidate,
            speech_purpose: speech_purpose.filter(|p| !p.trim().is_empty()),
        };

        let service = Arc::clone(&self.service);
        let upload = service.analyze(request, reporter);
        tokio::pin!(upload);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(update) = rx.recv() => self.apply_progress(update),
                outcome = &mut upload => break outcome,
            }
        };
        while let Ok(update) = rx.try_recv() {
            self.apply_progress(update);
        }

        match outcome {
            Ok(json) => {
                let result = normalizer::normalize(&json);
                if matches!(self.state, WorkflowState::Uploading { .. }) {
                    self.transition(WorkflowState::Analyzing {
                        status_message: Some(ANALYZING_MESSAGE.to_string()),
                    });
                }
                info!(%session, overall = result.overall_score, "Analysis complete");
                self.transition(WorkflowState::Success {
                    result: Box::new(result),
                });
            }
            Err(e) => {
                warn!(%session, error = ?e, "Analysis failed");
                self.transition(WorkflowState::Error {
                    message: e.user_message(),
                });
            }
        }

        Ok(&self.state)
    }

    /// Return to `Idle`, dropping the candidate, result and any recording.
    ///
    /// Allowed from any state; progress from the abandoned session is ignored.
    pub async fn reset(&mut self) {
        if let Some(recording) = self.recording.take() {
            recording.abort().await;
        }
        if let Some(session) = self.session.take() {
            debug!(%session, "Session cleared");
        }
        self.candidate = None;
        self.validation_error = None;
        self.capture_error = None;
        self.emit(WorkflowEvent::Reset);
        if !matches!(self.state, WorkflowState::Idle) {
            self.transition(WorkflowState::Idle);
        }
    }

    /// Open the device and begin recording.
    ///
    /// Failure records the capture message and leaves the state unchanged.
    pub async fn start_capture(&mut self, device: &dyn CaptureDevice) -> Result<(), WorkflowError> {
        if !self.mode.allows_capture() {
            return Err(WorkflowError::CaptureDisabled);
        }
        if !self.state.accepts_selection() {
            return Err(self.invalid("start recording"));
        }
        if self.recording.is_some() {
            return Err(WorkflowError::AlreadyRecording);
        }

        match Recording::start(device).await {
            Ok(recording) => {
                self.capture_error = None;
                self.emit(WorkflowEvent::CaptureStarted {
                    mime_type: recording.mime_type().to_string(),
                });
                self.recording = Some(recording);
                Ok(())
            }
            Err(e) => Err(self.capture_failed(e)),
        }
    }

    /// Stop recording and select the assembled video.
    pub async fn stop_capture(&mut self) -> Result<(), WorkflowError> {
        let recording = self.recording.take().ok_or(WorkflowError::NotRecording)?;
        match recording.stop().await {
            Ok(candidate) => {
                self.emit(WorkflowEvent::CaptureFinished {
                    file_name: candidate.file_name.clone(),
                    size_bytes: candidate.size_bytes,
                });
                self.select(candidate)
            }
            Err(e) => Err(self.capture_failed(e)),
        }
    }

    fn capture_failed(&mut self, e: AnalysisError) -> WorkflowError {
        let message = e.user_message();
        warn!(error = %message, "Capture failed");
        self.capture_error = Some(message.clone());
        self.emit(WorkflowEvent::CaptureFailed { message });
        e.into()
    }

    fn apply_progress(&mut self, update: ProgressUpdate) {
        if self.session != Some(update.session) {
            debug!(session = %update.session, "Ignoring progress from stale session");
            return;
        }
        let WorkflowState::Uploading { progress } = self.state else {
            return;
        };
        let percent = update.percent.min(100);
        if percent <= progress {
            return;
        }
        self.transition(WorkflowState::Uploading { progress: percent });
        if percent == 100 {
            self.transition(WorkflowState::Analyzing {
                status_message: Some(ANALYZING_MESSAGE.to_string()),
            });
        }
    }

    fn transition(&mut self, next: WorkflowState) {
        debug!(from = self.state.name(), to = next.name(), "State transition");
        self.state = next;
        self.emit(WorkflowEvent::StateChanged {
            session: self.session,
            state: self.state.clone(),
        });
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidTransition {
            action,
            state: self.state.name(),
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
