use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ──────────────────── Artifact Types ────────────────────

/// Where the bytes of an artifact live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSource {
    /// A file the user picked from disk.
    File { path: PathBuf },
    /// A recording assembled in memory by live capture.
    Memory {
        #[serde(skip)]
        data: Bytes,
    },
}

/// A user-selected (or captured) artifact waiting to be analyzed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCandidate {
    /// Handle to the artifact bytes.
    pub source: ArtifactSource,
    /// Display name, also used as the multipart file name.
    pub file_name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// MIME type (e.g. "video/mp4").
    pub mime_type: String,
}

impl UploadCandidate {
    /// Build a candidate around an in-memory recording.
    pub fn from_memory(file_name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            size_bytes: data.len() as u64,
            source: ArtifactSource::Memory { data },
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Size in megabytes, as shown next to the file name.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

// ──────────────────── Mode ────────────────────

/// Which entry points a workflow session exposes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// File upload only.
    #[default]
    Upload,
    /// File upload plus live recording.
    Live,
}

impl AnalysisMode {
    pub fn allows_capture(self) -> bool {
        matches!(self, AnalysisMode::Live)
    }
}

/// Speech purposes offered to the user.
pub const SPEECH_PURPOSES: &[&str] = &[
    "class presentation",
    "job interview",
    "conference talk",
    "wedding speech",
    "business pitch",
    "debate",
    "storytelling",
    "other",
];

// ──────────────────── Score Types ────────────────────

/// The four fixed score groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreGroupKind {
    ContentQuality,
    Structure,
    VocabularyStyle,
    GrammarFluency,
}

impl ScoreGroupKind {
    pub const ALL: [ScoreGroupKind; 4] = [
        ScoreGroupKind::ContentQuality,
        ScoreGroupKind::Structure,
        ScoreGroupKind::VocabularyStyle,
        ScoreGroupKind::GrammarFluency,
    ];

    /// Key of the group object in the service payload.
    pub fn key(self) -> &'static str {
        match self {
            ScoreGroupKind::ContentQuality => "content_quality",
            ScoreGroupKind::Structure => "structure",
            ScoreGroupKind::VocabularyStyle => "vocabulary_style",
            ScoreGroupKind::GrammarFluency => "grammar_fluency",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ScoreGroupKind::ContentQuality => "Content Quality",
            ScoreGroupKind::Structure => "Structure",
            ScoreGroupKind::VocabularyStyle => "Vocabulary & Style",
            ScoreGroupKind::GrammarFluency => "Grammar & Fluency",
        }
    }

    /// Payload field name and display label of each sub-score, in display order.
    pub fn fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ScoreGroupKind::ContentQuality => &[
                ("clarity_score", "Clarity"),
                ("relevance_score", "Relevance"),
                ("example_usage_score", "Examples Usage"),
            ],
            ScoreGroupKind::Structure => &[
                ("logical_flow_score", "Logical Flow"),
                ("transition_score", "Transitions"),
                ("balance_score", "Balance"),
            ],
            ScoreGroupKind::VocabularyStyle => &[
                ("lexical_richness", "Lexical Richness"),
                ("word_appropriateness", "Word Appropriateness"),
                ("repetition_score", "Repetition Control"),
            ],
            ScoreGroupKind::GrammarFluency => &[
                ("grammar_correctness", "Grammar Correctness"),
                ("sentence_fluency", "Sentence Fluency"),
                ("filler_word_density", "Filler Word Control"),
            ],
        }
    }
}

/// A single named metric, stored as an integer percentage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubScore {
    pub key: String,
    pub label: String,
    /// 0..=100.
    pub score: u8,
}

/// One score group with its sub-scores in display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreGroup {
    pub kind: ScoreGroupKind,
    pub scores: Vec<SubScore>,
}

impl ScoreGroup {
    /// Look up a sub-score by its payload key.
    pub fn get(&self, key: &str) -> Option<u8> {
        self.scores.iter().find(|s| s.key == key).map(|s| s.score)
    }
}

/// Speaking-length metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakingMetrics {
    pub word_count: u64,
    pub words_per_minute: u64,
    /// Display string such as "2:05".
    pub duration: String,
}

impl Default for SpeakingMetrics {
    fn default() -> Self {
        Self {
            word_count: 0,
            words_per_minute: 0,
            duration: "0:00".to_string(),
        }
    }
}

/// Coaching text, each list in display order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coaching {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub exercises: Vec<String>,
}

/// Context the service inferred about the speech.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeechContext {
    #[serde(default)]
    pub specific_topic: String,
    #[serde(default)]
    pub general_topic: String,
    #[serde(default)]
    pub format: String,
}

/// Normalized analysis result, replaced wholesale on every analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u8>,
    pub content_quality: ScoreGroup,
    pub structure: ScoreGroup,
    pub vocabulary_style: ScoreGroup,
    pub grammar_fluency: ScoreGroup,
    pub speaking_metrics: SpeakingMetrics,
    pub coaching: Coaching,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_context: Option<SpeechContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coach_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<String>,
}

impl AnalysisResult {
    /// Score groups in display order.
    pub fn groups(&self) -> [&ScoreGroup; 4] {
        [
            &self.content_quality,
            &self.structure,
            &self.vocabulary_style,
            &self.grammar_fluency,
        ]
    }

    pub fn group(&self, kind: ScoreGroupKind) -> &ScoreGroup {
        match kind {
            ScoreGroupKind::ContentQuality => &self.content_quality,
            ScoreGroupKind::Structure => &self.structure,
            ScoreGroupKind::VocabularyStyle => &self.vocabulary_style,
            ScoreGroupKind::GrammarFluency => &self.grammar_fluency,
        }
    }
}

// ──────────────────── Rating ────────────────────

/// Qualitative label for a 0..=100 score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRating {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

/// Display colour for a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTone {
    Green,
    Amber,
    Red,
}

impl ScoreRating {
    /// Same thresholds for sub-scores and the overall score.
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => ScoreRating::Excellent,
            60..=79 => ScoreRating::Good,
            40..=59 => ScoreRating::Fair,
            _ => ScoreRating::NeedsImprovement,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreRating::Excellent => "Excellent",
            ScoreRating::Good => "Good",
            ScoreRating::Fair => "Fair",
            ScoreRating::NeedsImprovement => "Needs Improvement",
        }
    }

    pub fn tone(self) -> ScoreTone {
        match self {
            ScoreRating::Excellent => ScoreTone::Green,
            ScoreRating::Good => ScoreTone::Amber,
            ScoreRating::Fair | ScoreRating::NeedsImprovement => ScoreTone::Red,
        }
    }
}

// ──────────────────── Workflow State ────────────────────

/// The single active state of one analysis session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    /// Waiting for a file.
    #[default]
    Idle,
    /// Sending the artifact; progress is a percentage.
    Uploading { progress: u8 },
    /// Upload finished, waiting on the service.
    Analyzing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_message: Option<String>,
    },
    /// Analysis finished.
    Success { result: Box<AnalysisResult> },
    /// Upload or analysis failed.
    Error { message: String },
}

impl WorkflowState {
    /// Snake-case name, used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Uploading { .. } => "uploading",
            WorkflowState::Analyzing { .. } => "analyzing",
            WorkflowState::Success { .. } => "success",
            WorkflowState::Error { .. } => "error",
        }
    }

    /// Whether an upload is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkflowState::Uploading { .. } | WorkflowState::Analyzing { .. }
        )
    }

    /// Whether the selection surface is shown (a file may be picked or resubmitted).
    pub fn accepts_selection(&self) -> bool {
        matches!(self, WorkflowState::Idle | WorkflowState::Error { .. })
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            WorkflowState::Success { result } => Some(result),
            _ => None,
        }
    }
}
