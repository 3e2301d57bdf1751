//! Service trait and upload progress plumbing.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use speakeasy_types::UploadCandidate;

use crate::error::AnalysisError;

/// One upload submitted to the analysis service.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Validated artifact.
    pub candidate: UploadCandidate,
    /// Optional `speech_purpose` form field.
    pub speech_purpose: Option<String>,
}

/// Percentage progress of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Session the update belongs to.
    pub session: Uuid,
    /// 0..=100.
    pub percent: u8,
}

/// Turns bytes handed to the transport into session-tagged percentages.
///
/// Reported values never decrease and never exceed 100. A closed receiver is
/// not an error: the session was abandoned and nobody is listening.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    session: Uuid,
    total: u64,
    sent: u64,
    last: Option<u8>,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new(session: Uuid, tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self {
            session,
            total: 0,
            sent: 0,
            last: None,
            tx,
        }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Set the number of bytes the upload will carry.
    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    /// Record `bytes` more handed to the transport.
    pub fn advance(&mut self, bytes: u64) {
        self.sent = self.sent.saturating_add(bytes);
        let percent = if self.total == 0 {
            100
        } else {
            let sent = self.sent.min(self.total);
            ((sent * 100 + self.total / 2) / self.total) as u8
        };
        self.report(percent);
    }

    /// Report an absolute percentage; regressions are dropped.
    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        let _ = self.tx.send(ProgressUpdate {
            session: self.session,
            percent,
        });
    }

    pub fn complete(&mut self) {
        self.report(100);
    }

    /// Last value reported, if any.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Trait for the remote analysis service.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Service identifier.
    fn id(&self) -> &str;

    /// Upload the artifact and wait for the raw JSON result.
    ///
    /// Progress is reported through `progress` while bytes are sent.
    async fn analyze(
        &self,
        request: UploadRequest,
        progress: ProgressReporter,
    ) -> Result<serde_json::Value, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update.percent);
        }
        out
    }

    #[test]
    fn test_advance_reports_rounded_percent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(Uuid::new_v4(), tx);
        reporter.set_total(300);
        reporter.report(0);
        reporter.advance(100);
        reporter.advance(100);
        reporter.advance(100);
        assert_eq!(drain(&mut rx), vec![0, 33, 67, 100]);
    }

    #[test]
    fn test_progress_never_regresses_or_overflows() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(Uuid::new_v4(), tx);
        reporter.report(40);
        reporter.report(20);
        reporter.report(40);
        reporter.report(250);
        reporter.complete();
        assert_eq!(drain(&mut rx), vec![40, 100]);
        assert_eq!(reporter.last(), Some(100));
    }

    #[test]
    fn test_empty_body_is_complete() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(Uuid::new_v4(), tx);
        reporter.advance(0);
        assert_eq!(drain(&mut rx), vec![100]);
    }

    #[test]
    fn test_updates_carry_session() {
        let session = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reporter = ProgressReporter::new(session, tx);
        reporter.report(5);
        assert_eq!(rx.try_recv().unwrap().session, session);
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut reporter = ProgressReporter::new(Uuid::new_v4(), tx);
        reporter.report(50);
        assert_eq!(reporter.last(), Some(50));
    }
}
