use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use speakeasy_config::SpeakEasyConfig;
use speakeasy_media::AnalysisService;
use speakeasy_media::uploader::HttpAnalysisService;
use speakeasy_media::validator;
use speakeasy_types::WorkflowState;
use speakeasy_workflow::{WorkflowController, WorkflowEvent};

use crate::presenter::Presenter;

/// Upload one file and render the session until it ends.
pub async fn run_analyze(
    config: SpeakEasyConfig,
    file: PathBuf,
    purpose: Option<String>,
    presenter: Presenter,
    json: bool,
) -> Result<()> {
    let service = HttpAnalysisService::from_config(&config.service)
        .context("Failed to build analysis client")?;
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut ctrl = controller(&config, Arc::new(service), tx);

    let candidate = validator::candidate_from_path(&file)
        .await
        .with_context(|| format!("Cannot read {}", file.display()))?;
    if ctrl.select(candidate).is_err() {
        let message = ctrl.validation_error().unwrap_or_default().to_string();
        fail(&presenter, &message);
    }
    if let Some(candidate) = ctrl.candidate() {
        eprintln!("{}", presenter.selection(candidate));
    }

    let purpose = purpose.or(config.speech_purpose);
    submit_and_render(&mut ctrl, &mut events, purpose, presenter, json).await
}

/// Controller in the configured mode.
pub fn controller(
    config: &SpeakEasyConfig,
    service: Arc<dyn AnalysisService>,
    events: mpsc::UnboundedSender<WorkflowEvent>,
) -> WorkflowController {
    WorkflowController::new(service, config.mode).with_events(events)
}

/// Submit the selected candidate, render every event, and exit non-zero on
/// an `Error` outcome. Ctrl-C abandons the upload.
pub async fn submit_and_render(
    ctrl: &mut WorkflowController,
    events: &mut mpsc::UnboundedReceiver<WorkflowEvent>,
    purpose: Option<String>,
    presenter: Presenter,
    json: bool,
) -> Result<()> {
    let outcome = {
        let submit = ctrl.submit(purpose);
        tokio::pin!(submit);
        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => show(&presenter, &event, json),
                done = &mut submit => break Some(done.map(|_| ())),
                _ = tokio::signal::ctrl_c() => break None,
            }
        }
    };

    let Some(done) = outcome else {
        ctrl.reset().await;
        anyhow::bail!("Analysis cancelled");
    };
    done?;
    while let Ok(event) = events.try_recv() {
        show(&presenter, &event, json);
    }

    match ctrl.state() {
        WorkflowState::Success { result } if json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        WorkflowState::Error { .. } => std::process::exit(1),
        _ => {}
    }
    Ok(())
}

fn show(presenter: &Presenter, event: &WorkflowEvent, json: bool) {
    match event {
        WorkflowEvent::CandidateSelected { .. } | WorkflowEvent::CaptureFinished { .. } => {
            tracing::debug!(event = event.name(), "Workflow event");
        }
        WorkflowEvent::ValidationFailed { message } | WorkflowEvent::CaptureFailed { message } => {
            eprintln!("{}", presenter.error(message));
        }
        WorkflowEvent::StateChanged { state, .. } => match state {
            WorkflowState::Success { .. } if json => {}
            WorkflowState::Success { .. } => {
                if let Some(view) = presenter.state(state) {
                    println!("{view}");
                }
            }
            _ => {
                if let Some(view) = presenter.state(state) {
                    eprintln!("{view}");
                }
            }
        },
        WorkflowEvent::CaptureStarted { .. } | WorkflowEvent::Reset => {}
    }
}

pub fn fail(presenter: &Presenter, message: &str) -> ! {
    eprintln!("{}", presenter.error(message));
    std::process::exit(1);
}
