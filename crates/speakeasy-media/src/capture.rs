//! Live camera and microphone capture.
//!
//! A [`CaptureDevice`] hands out a [`CaptureStream`] of container bytes. A
//! [`Recording`] pulls that stream on a background task, counts elapsed
//! seconds, and on stop assembles everything into one in-memory artifact that
//! uploads exactly like a user-selected file.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use speakeasy_config::CaptureConfig;
use speakeasy_types::UploadCandidate;

use crate::error::AnalysisError;

/// How long a stopped source may take to flush its tail before it is killed.
pub const FINISH_GRACE: Duration = Duration::from_secs(5);

/// Written to the capture program's stdin to ask it to finish (ffmpeg's quit key).
const STOP_INPUT: &[u8] = b"q\n";

/// Source of a combined audio/video capture.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Device identifier.
    fn id(&self) -> &str;
    /// Acquire camera and microphone. Fails with [`AnalysisError::Capture`].
    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, AnalysisError>;
}

/// An acquired capture producing container bytes.
#[async_trait]
pub trait CaptureStream: Send {
    /// MIME type of the produced container.
    fn mime_type(&self) -> &str;
    /// Next chunk, or `None` once the source has ended. Must be cancel safe.
    async fn next_chunk(&mut self) -> Option<Result<Bytes, AnalysisError>>;
    /// Ask the source to flush and end; remaining chunks are still read.
    async fn finish(&mut self) {}
    /// Release the underlying tracks.
    async fn release(&mut self);
}

/// Capture through an external program writing the container to stdout.
pub struct CommandCaptureDevice {
    program: String,
    args: Vec<String>,
    mime_type: String,
}

impl CommandCaptureDevice {
    pub fn new(program: impl Into<String>, args: Vec<String>, mime_type: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.mime_type.clone(),
        )
    }
}

#[async_trait]
impl CaptureDevice for CommandCaptureDevice {
    fn id(&self) -> &str {
        &self.program
    }

    async fn acquire(&self) -> Result<Box<dyn CaptureStream>, AnalysisError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AnalysisError::capture(format!(
                    "Camera or microphone unavailable: capture program '{}' not found.",
                    self.program
                )),
                std::io::ErrorKind::PermissionDenied => AnalysisError::capture(
                    "Permission to use the camera or microphone was denied.",
                ),
                _ => AnalysisError::capture(format!("Could not start capture: {e}")),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AnalysisError::capture("Capture program has no output stream."))?;

        let stdin = child.stdin.take();

        info!(program = %self.program, pid = ?child.id(), "Capture started");
        Ok(Box::new(CommandStream {
            child,
            stdin,
            stdout: ReaderStream::new(stdout),
            mime_type: self.mime_type.clone(),
        }))
    }
}

struct CommandStream {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ReaderStream<ChildStdout>,
    mime_type: String,
}

#[async_trait]
impl CaptureStream for CommandStream {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, AnalysisError>> {
        self.stdout.next().await.map(|chunk| {
            chunk.map_err(|e| AnalysisError::capture(format!("Capture stream failed: {e}")))
        })
    }

    async fn finish(&mut self) {
        // Closing stdin after the quit key lets the program write its trailer
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(STOP_INPUT).await {
                debug!("Capture program stdin closed early: {e}");
            }
        }
    }

    async fn release(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.start_kill() {
            debug!("Capture program already exited: {e}");
        }
        let _ = self.child.wait().await;
    }
}

struct Captured {
    chunks: Vec<Bytes>,
    error: Option<AnalysisError>,
}

/// An in-progress recording.
pub struct Recording {
    stop: CancellationToken,
    abort: CancellationToken,
    elapsed: watch::Receiver<u64>,
    task: JoinHandle<Captured>,
    mime_type: String,
    started_at: chrono::DateTime<chrono::Local>,
}

impl Recording {
    /// Acquire the device and start accumulating chunks.
    pub async fn start(device: &dyn CaptureDevice) -> Result<Self, AnalysisError> {
        let mut stream = device.acquire().await?;
        let mime_type = stream.mime_type().to_string();
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let (elapsed_tx, elapsed) = watch::channel(0u64);

        let (stop_token, abort_token) = (stop.clone(), abort.clone());
        let task = tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut error = None;
            let mut finishing = false;
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = abort_token.cancelled() => break,
                    _ = stop_token.cancelled() => {
                        finishing = true;
                        break;
                    }
                    _ = ticker.tick() => elapsed_tx.send_modify(|secs| *secs += 1),
                    chunk = stream.next_chunk() => match chunk {
                        Some(Ok(bytes)) => chunks.push(bytes),
                        Some(Err(e)) => {
                            warn!("Capture stream failed: {e}");
                            error = Some(e);
                            break;
                        }
                        None => {
                            debug!("Capture source ended");
                            break;
                        }
                    },
                }
            }

            if finishing {
                stream.finish().await;
                match tokio::time::timeout(FINISH_GRACE, drain(stream.as_mut(), &mut chunks)).await {
                    Ok(tail_error) => error = tail_error,
                    Err(_) => warn!("Capture source did not finish within {FINISH_GRACE:?}"),
                }
            }

            stream.release().await;
            Captured { chunks, error }
        });

        info!(device = device.id(), %mime_type, "Recording started");
        Ok(Self {
            stop,
            abort,
            elapsed,
            task,
            mime_type,
            started_at: chrono::Local::now(),
        })
    }

    /// Whole seconds recorded so far.
    pub fn elapsed_secs(&self) -> u64 {
        *self.elapsed.borrow()
    }

    /// Watch the elapsed-seconds counter.
    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed.clone()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Whether the source ended on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the source to finish, read its remaining output, release the
    /// device, and assemble the artifact.
    pub async fn stop(self) -> Result<UploadCandidate, AnalysisError> {
        self.stop.cancel();
        let captured = self
            .task
            .await
            .map_err(|e| AnalysisError::capture(format!("Recording task failed: {e}")))?;

        if captured.chunks.is_empty() {
            return Err(captured
                .error
                .unwrap_or_else(|| AnalysisError::capture("No audio or video was captured.")));
        }
        if let Some(e) = captured.error {
            warn!("Keeping partial recording after capture error: {e}");
        }

        let data = assemble(captured.chunks);
        let file_name = format!(
            "recording-{}.{}",
            self.started_at.format("%Y%m%d-%H%M%S"),
            extension_for(&self.mime_type)
        );
        info!(file = %file_name, size_bytes = data.len(), "Recording assembled");
        Ok(UploadCandidate::from_memory(file_name, self.mime_type, data))
    }

    /// Stop and release the device, discarding everything captured.
    pub async fn abort(self) {
        self.abort.cancel();
        if let Err(e) = self.task.await {
            warn!("Recording task failed during abort: {e}");
        }
        debug!("Recording aborted");
    }
}

/// Read until the source ends, returning the error that ended it, if any.
async fn drain(stream: &mut dyn CaptureStream, chunks: &mut Vec<Bytes>) -> Option<AnalysisError> {
    while let Some(chunk) = stream.next_chunk().await {
        match chunk {
            Ok(bytes) => chunks.push(bytes),
            Err(e) => {
                warn!("Capture stream failed while finishing: {e}");
                return Some(e);
            }
        }
    }
    debug!("Capture source finished");
    None
}

fn assemble(chunks: Vec<Bytes>) -> Bytes {
    let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    buf.freeze()
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use speakeasy_types::ArtifactSource;

    struct FakeStream {
        chunks: VecDeque<Bytes>,
        hold_open: bool,
        tail: Option<&'static str>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CaptureStream for FakeStream {
        fn mime_type(&self) -> &str {
            "video/webm"
        }

        async fn next_chunk(&mut self) -> Option<Result<Bytes, AnalysisError>> {
            match self.chunks.pop_front() {
                Some(chunk) => Some(Ok(chunk)),
                None if self.hold_open => futures::future::pending().await,
                None => None,
            }
        }

        async fn finish(&mut self) {
            if let Some(tail) = self.tail.take() {
                self.chunks.push_back(Bytes::from_static(tail.as_bytes()));
                self.hold_open = false;
            }
        }

        async fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct FakeDevice {
        chunks: Vec<&'static str>,
        hold_open: bool,
        tail: Option<&'static str>,
        deny: bool,
        released: Arc<AtomicBool>,
    }

    impl FakeDevice {
        fn new(chunks: Vec<&'static str>, hold_open: bool) -> Self {
            Self {
                chunks,
                hold_open,
                tail: None,
                deny: false,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl CaptureDevice for FakeDevice {
        fn id(&self) -> &str {
            "fake"
        }

        async fn acquire(&self) -> Result<Box<dyn CaptureStream>, AnalysisError> {
            if self.deny {
                return Err(AnalysisError::capture("Permission denied"));
            }
            Ok(Box::new(FakeStream {
                chunks: self
                    .chunks
                    .iter()
                    .copied()
                    .map(|c| Bytes::from_static(c.as_bytes()))
                    .collect(),
                hold_open: self.hold_open,
                tail: self.tail,
                released: self.released.clone(),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_assembles_chunks_and_counts_seconds() {
        let device = FakeDevice::new(vec!["abc", "def"], true);
        let recording = Recording::start(&device).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(recording.elapsed_secs(), 3);

        let candidate = recording.stop().await.unwrap();
        assert!(device.released.load(Ordering::SeqCst));
        assert_eq!(candidate.mime_type, "video/webm");
        assert_eq!(candidate.size_bytes, 6);
        assert!(candidate.file_name.starts_with("recording-"));
        assert!(candidate.file_name.ends_with(".webm"));
        match candidate.source {
            ArtifactSource::Memory { data } => assert_eq!(&data[..], b"abcdef"),
            other => panic!("Expected in-memory artifact, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_keeps_output_written_while_finishing() {
        let mut device = FakeDevice::new(vec!["head"], true);
        device.tail = Some("trailer");
        let recording = Recording::start(&device).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let candidate = recording.stop().await.unwrap();
        assert!(device.released.load(Ordering::SeqCst));
        match candidate.source {
            ArtifactSource::Memory { data } => assert_eq!(&data[..], b"headtrailer"),
            other => panic!("Expected in-memory artifact, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_source_released_after_grace() {
        let device = FakeDevice::new(vec!["abc"], true);
        let recording = Recording::start(&device).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let before = tokio::time::Instant::now();
        let candidate = recording.stop().await.unwrap();
        assert!(before.elapsed() >= FINISH_GRACE);
        assert_eq!(candidate.size_bytes, 3);
        assert!(device.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_acquire_failure_is_capture_error() {
        let mut device = FakeDevice::new(vec![], false);
        device.deny = true;
        let err = Recording::start(&device).await.err().unwrap();
        assert!(matches!(err, AnalysisError::Capture { .. }));
    }

    #[tokio::test]
    async fn test_empty_recording_is_capture_error() {
        let device = FakeDevice::new(vec![], false);
        let recording = Recording::start(&device).await.unwrap();
        let err = recording.stop().await.unwrap_err();
        assert_eq!(err.user_message(), "No audio or video was captured.");
        assert!(device.released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_releases_device() {
        let device = FakeDevice::new(vec!["x"], true);
        let recording = Recording::start(&device).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        recording.abort().await;
        assert!(device.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_program_is_capture_error() {
        let device = CommandCaptureDevice::new(
            "speakeasy-no-such-capture-program",
            vec![],
            "video/webm",
        );
        let err = Recording::start(&device).await.err().unwrap();
        match err {
            AnalysisError::Capture { message } => assert!(message.contains("not found")),
            other => panic!("Expected capture error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_capture_reads_stdout() {
        let device = CommandCaptureDevice::new(
            "sh",
            vec!["-c".into(), "printf hello".into()],
            "video/mp4",
        );
        let recording = Recording::start(&device).await.unwrap();
        for _ in 0..500 {
            if recording.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let candidate = recording.stop().await.unwrap();
        assert!(candidate.file_name.ends_with(".mp4"));
        match candidate.source {
            ArtifactSource::Memory { data } => assert_eq!(&data[..], b"hello"),
            other => panic!("Expected in-memory artifact, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_capture_flushes_tail_on_stop() {
        let device = CommandCaptureDevice::new(
            "sh",
            vec![
                "-c".into(),
                "printf HEAD; read key; printf TRAILER".into(),
            ],
            "video/webm",
        );
        let recording = Recording::start(&device).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!recording.is_finished());

        let candidate = recording.stop().await.unwrap();
        match candidate.source {
            ArtifactSource::Memory { data } => assert_eq!(&data[..], b"HEADTRAILER"),
            other => panic!("Expected in-memory artifact, got {other:?}"),
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("video/webm"), "webm");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
