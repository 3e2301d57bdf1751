//! Terminal views of the workflow state.

use std::fmt::Write;

use speakeasy_types::{AnalysisResult, ScoreGroup, ScoreRating, ScoreTone, UploadCandidate, WorkflowState};

const BAR_WIDTH: usize = 30;
const RETRY_HINT: &str = "Run the command again to retry.";

/// Renders views as plain strings, optionally with ANSI colour.
#[derive(Debug, Clone, Copy)]
pub struct Presenter {
    color: bool,
}

impl Presenter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// One line per state; `Idle` renders nothing.
    pub fn state(&self, state: &WorkflowState) -> Option<String> {
        match state {
            WorkflowState::Idle => None,
            WorkflowState::Uploading { progress } => Some(self.progress(*progress)),
            WorkflowState::Analyzing { status_message } => Some(
                status_message
                    .clone()
                    .unwrap_or_else(|| "Analyzing...".to_string()),
            ),
            WorkflowState::Success { result } => Some(self.results(result)),
            WorkflowState::Error { message } => Some(self.error(message)),
        }
    }

    pub fn selection(&self, candidate: &UploadCandidate) -> String {
        format!(
            "Selected {} ({:.2} MB)",
            candidate.file_name,
            candidate.size_mb()
        )
    }

    pub fn progress(&self, percent: u8) -> String {
        let percent = percent.min(100);
        let filled = usize::from(percent) * BAR_WIDTH / 100;
        format!(
            "Uploading [{}{}] {percent:>3}%",
            "#".repeat(filled),
            "-".repeat(BAR_WIDTH - filled)
        )
    }

    pub fn recording(&self, secs: u64) -> String {
        format!(
            "{} {}:{:02}",
            self.paint("● REC", ScoreTone::Red),
            secs / 60,
            secs % 60
        )
    }

    pub fn error(&self, message: &str) -> String {
        format!("{} {message}\n  {RETRY_HINT}", self.paint("Error:", ScoreTone::Red))
    }

    pub fn results(&self, result: &AnalysisResult) -> String {
        let mut out = String::new();

        if let Some(overall) = result.overall_score {
            let rating = ScoreRating::from_score(overall);
            let _ = writeln!(
                out,
                "Overall Score: {}",
                self.paint(&format!("{overall} ({})", rating.label()), rating.tone())
            );
            out.push('\n');
        }

        for group in result.groups() {
            self.group(&mut out, group);
        }

        let metrics = &result.speaking_metrics;
        let _ = writeln!(out, "Speaking Metrics");
        let _ = writeln!(out, "  {:<24}{}", "Word Count", metrics.word_count);
        let _ = writeln!(out, "  {:<24}{}", "Words per Minute", metrics.words_per_minute);
        let _ = writeln!(out, "  {:<24}{}", "Duration", metrics.duration);
        out.push('\n');

        list(&mut out, "Strengths", &result.coaching.strengths);
        list(&mut out, "Areas for Improvement", &result.coaching.improvements);
        list(&mut out, "Practice Exercises", &result.coaching.exercises);

        if let Some(context) = &result.speech_context {
            let _ = writeln!(out, "Speech Context");
            for (label, value) in [
                ("Specific Topic", &context.specific_topic),
                ("General Topic", &context.general_topic),
                ("Format", &context.format),
            ] {
                if !value.is_empty() {
                    let _ = writeln!(out, "  {label:<24}{value}");
                }
            }
            out.push('\n');
        }
        if let Some(feedback) = &result.coach_feedback {
            let _ = writeln!(out, "Coach Feedback\n  {feedback}\n");
        }
        if let Some(examples) = &result.examples {
            let _ = writeln!(out, "Examples\n  {examples}\n");
        }

        out.trim_end().to_string()
    }

    fn group(&self, out: &mut String, group: &ScoreGroup) {
        let _ = writeln!(out, "{}", group.kind.title());
        for sub in &group.scores {
            let rating = ScoreRating::from_score(sub.score);
            let _ = writeln!(
                out,
                "  {:<24}{:>3}  {}",
                sub.label,
                sub.score,
                self.paint(rating.label(), rating.tone())
            );
        }
        out.push('\n');
    }

    fn paint(&self, text: &str, tone: ScoreTone) -> String {
        if !self.color {
            return text.to_string();
        }
        let code = match tone {
            ScoreTone::Green => "32",
            ScoreTone::Amber => "33",
            ScoreTone::Red => "31",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{title}");
    for item in items {
        let _ = writeln!(out, "  • {item}");
    }
    out.push('\n');
}
