//! Normalization of analysis service payloads into [`AnalysisResult`].
//!
//! The service has shipped two payload shapes. Each has its own adapter:
//!
//! - [`ResponseShape::Process`]: `{ "results": { "audio_grades", "text_grades", "context", "examples" } }`
//! - [`ResponseShape::Analyze`]: `{ "overall_score", "transcript_scores", "speech_context", "coach_feedback", "public_speaking_examples" }`
//!
//! Adapters are total. Missing or malformed fields degrade to defaults
//! (scores to 0, counts to 0, duration to "0:00"); nothing here returns an error.

use serde_json::Value;

use speakeasy_types::{
    AnalysisResult, Coaching, ScoreGroup, ScoreGroupKind, SpeakingMetrics, SpeechContext, SubScore,
};

/// Strength shown when the service lists nothing.
pub const FALLBACK_STRENGTH: &str = "Great clarity and confidence!";

/// Practice exercises. Static: the service does not return any.
pub const PRACTICE_EXERCISES: [&str; 2] = [
    "Record a one-minute summary of your talk and replay it, noting every filler word.",
    "Rehearse your opening with a deliberate two-second pause after each key point.",
];

/// Strengths taken from the head of the improvement list.
const MAX_STRENGTHS: usize = 3;

/// Known upstream payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Process,
    Analyze,
}

/// Work out which adapter a payload needs.
pub fn detect_shape(json: &Value) -> ResponseShape {
    if json.get("results").is_some_and(Value::is_object) {
        ResponseShape::Process
    } else if json.get("transcript_scores").is_some() || json.get("overall_score").is_some() {
        ResponseShape::Analyze
    } else {
        ResponseShape::Process
    }
}

/// Normalize any known payload shape.
pub fn normalize(json: &Value) -> AnalysisResult {
    let shape = detect_shape(json);
    tracing::debug!(?shape, "Normalizing analysis payload");
    match shape {
        ResponseShape::Process => normalize_process(json),
        ResponseShape::Analyze => normalize_analyze(json),
    }
}

/// Adapter for the `/process` payload.
pub fn normalize_process(json: &Value) -> AnalysisResult {
    let root = json.get("results").filter(|r| r.is_object()).unwrap_or(json);
    let audio = root.get("audio_grades");
    let grades = root.get("text_grades");
    let length = field(grades, "speaking_length");

    let speaking_metrics = SpeakingMetrics {
        word_count: count(field(audio, "word_count").or_else(|| field(length, "word_count"))),
        words_per_minute: count(
            field(audio, "words_per_minute").or_else(|| field(length, "words_per_minute")),
        ),
        duration: duration(
            field(audio, "duration").or_else(|| field(grades, "video_duration_seconds")),
        ),
    };

    build(
        grades,
        None,
        speaking_metrics,
        coaching(field(audio, "areas_for_improvement")),
        root.get("context"),
        None,
        root.get("examples"),
    )
}

/// Adapter for the `/api/analyze` payload.
pub fn normalize_analyze(json: &Value) -> AnalysisResult {
    let scores = json.get("transcript_scores");
    let length = field(scores, "speaking_length");

    let speaking_metrics = SpeakingMetrics {
        word_count: count(field(length, "word_count")),
        words_per_minute: count(field(length, "words_per_minute")),
        duration: duration(field(scores, "video_duration_seconds")),
    };

    build(
        scores,
        json.get("overall_score"),
        speaking_metrics,
        coaching(json.get("areas_for_improvement")),
        json.get("speech_context"),
        json.get("coach_feedback"),
        json.get("public_speaking_examples"),
    )
}

fn build(
    groups: Option<&Value>,
    overall: Option<&Value>,
    speaking_metrics: SpeakingMetrics,
    coaching: Coaching,
    context: Option<&Value>,
    feedback: Option<&Value>,
    examples: Option<&Value>,
) -> AnalysisResult {
    let group = |kind: ScoreGroupKind| score_group(kind, field(groups, kind.key()));
    let overall_score = overall
        .and_then(fraction)
        .map(percent_of)
        .or_else(|| mean_score(groups));

    AnalysisResult {
        overall_score,
        content_quality: group(ScoreGroupKind::ContentQuality),
        structure: group(ScoreGroupKind::Structure),
        vocabulary_style: group(ScoreGroupKind::VocabularyStyle),
        grammar_fluency: group(ScoreGroupKind::GrammarFluency),
        speaking_metrics,
        coaching,
        speech_context: speech_context(context),
        coach_feedback: text(feedback),
        examples: text(examples),
    }
}

/// Scale a [0,1] fraction to an integer percentage, rounding half away from zero.
///
/// Non-numeric input is 0 and the result is clamped to [0,100].
pub fn to_percent(value: Option<&Value>) -> u8 {
    value.and_then(fraction).map(percent_of).unwrap_or(0)
}

fn percent_of(v: f64) -> u8 {
    // Snap to 1e-9 first: 0.845 * 100.0 is 84.49999999999999 in binary.
    let scaled = (v * 100.0 * 1e9).round() / 1e9;
    scaled.round().clamp(0.0, 100.0) as u8
}

/// Format seconds as `m:ss`.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn field<'a>(parent: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    parent.and_then(|p| p.get(key))
}

fn fraction(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn score_group(kind: ScoreGroupKind, source: Option<&Value>) -> ScoreGroup {
    let scores = kind
        .fields()
        .iter()
        .map(|(key, label)| SubScore {
            key: (*key).to_string(),
            label: (*label).to_string(),
            score: to_percent(field(source, key)),
        })
        .collect();
    ScoreGroup { kind, scores }
}

/// Mean of every sub-score fraction that is present and within [0,1].
fn mean_score(groups: Option<&Value>) -> Option<u8> {
    let values: Vec<f64> = ScoreGroupKind::ALL
        .iter()
        .flat_map(|kind| {
            let source = field(groups, kind.key());
            kind.fields()
                .iter()
                .filter_map(move |(key, _)| field(source, key).and_then(fraction))
        })
        .filter(|v| (0.0..=1.0).contains(v))
        .collect();

    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(percent_of(mean))
}

fn count(value: Option<&Value>) -> u64 {
    value
        .and_then(|v| {
            v.as_u64().or_else(|| {
                v.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f.round() as u64)
            })
        })
        .unwrap_or(0)
}

fn duration(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(format_duration)
            .unwrap_or_else(|| SpeakingMetrics::default().duration),
        None => SpeakingMetrics::default().duration,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn coaching(areas: Option<&Value>) -> Coaching {
    let improvements = string_list(areas);
    let strengths = if improvements.is_empty() {
        vec![FALLBACK_STRENGTH.to_string()]
    } else {
        improvements.iter().take(MAX_STRENGTHS).cloned().collect()
    };

    Coaching {
        strengths,
        improvements,
        exercises: PRACTICE_EXERCISES.iter().map(|s| s.to_string()).collect(),
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn speech_context(value: Option<&Value>) -> Option<SpeechContext> {
    let value = value.filter(|v| v.is_object())?;
    let get = |key: &str| text(value.get(key)).unwrap_or_default();
    let context = SpeechContext {
        specific_topic: get("specific_topic"),
        general_topic: get("general_topic"),
        format: get("format"),
    };
    if context == SpeechContext::default() {
        None
    } else {
        Some(context)
    }
}
