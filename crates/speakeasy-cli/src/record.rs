use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use speakeasy_config::SpeakEasyConfig;
use speakeasy_media::capture::CommandCaptureDevice;
use speakeasy_media::uploader::HttpAnalysisService;
use speakeasy_workflow::WorkflowError;

use crate::analyze::{controller, fail, submit_and_render};
use crate::presenter::Presenter;

const CAPTURE_DISABLED_HINT: &str =
    "Live recording is disabled in upload mode. Set \"mode\": \"live\" in the config or pass --mode live.";

/// Record until Ctrl-C, the time limit, or the source ends, then analyze.
pub async fn run_record(
    config: SpeakEasyConfig,
    purpose: Option<String>,
    seconds: Option<u64>,
    presenter: Presenter,
    json: bool,
) -> Result<()> {
    let service = HttpAnalysisService::from_config(&config.service)
        .context("Failed to build analysis client")?;
    let device = CommandCaptureDevice::from_config(&config.capture);
    let (tx, mut events) = mpsc::unbounded_channel();
    let mut ctrl = controller(&config, Arc::new(service), tx);

    match ctrl.start_capture(&device).await {
        Ok(()) => {}
        Err(WorkflowError::CaptureDisabled) => fail(&presenter, CAPTURE_DISABLED_HINT),
        Err(_) => {
            let message = ctrl.capture_error().unwrap_or_default().to_string();
            fail(&presenter, &message);
        }
    }
    let mut elapsed = ctrl
        .subscribe_elapsed()
        .context("Recording did not start")?;

    eprintln!("Recording... press Ctrl-C to stop");
    let limit = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(limit);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut limit => break,
            changed = elapsed.changed() => {
                if changed.is_err() {
                    break;
                }
                let secs = *elapsed.borrow_and_update();
                eprint!("\r{}", presenter.recording(secs));
            }
        }
    }
    eprintln!();

    if ctrl.stop_capture().await.is_err() {
        let message = ctrl
            .capture_error()
            .or(ctrl.validation_error())
            .unwrap_or_default()
            .to_string();
        fail(&presenter, &message);
    }
    if let Some(candidate) = ctrl.candidate() {
        eprintln!("{}", presenter.selection(candidate));
    }

    let purpose = purpose.or(config.speech_purpose);
    submit_and_render(&mut ctrl, &mut events, purpose, presenter, json).await
}
