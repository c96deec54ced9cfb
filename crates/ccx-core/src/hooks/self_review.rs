use crate::config::SelfReviewConfig;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const BASE_QUESTIONS: &[&str] = &[
    "Have all requested features been fully implemented?",
    "Are error cases and edge conditions properly handled?",
    "Have you tested the implementation with various inputs?",
    "Is the code documented and readable?",
    "Are there any performance or security concerns?",
];

const CODE_QUESTIONS: &[&str] = &[
    "Are type hints/types properly defined?",
    "Is there adequate test coverage?",
    "Are there obvious performance improvements?",
];

const CODE_EXTENSIONS: &[&str] = &["py", "ts", "js", "tsx", "jsx", "go", "rs", "java"];

/// Emitted on stderr when a session ends without a review marker.
#[derive(Debug, Clone, Serialize)]
pub struct SelfReviewMissing {
    pub kind: &'static str,
    pub severity: &'static str,
    pub timestamp: String,
    pub questions: Vec<String>,
    pub transcript_path: String,
    pub file_path: Option<String>,
    pub question_count: usize,
}

/// Lowercase, with `-` and `_` read as spaces.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['-', '_'], " ")
}

/// True when any marker appears in the last `tail_lines` lines of `text`.
pub fn has_marker(text: &str, markers: &[String], tail_lines: usize) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    let tail = lines[lines.len().saturating_sub(tail_lines)..].join("\n");
    let normalized = normalize(&tail);
    markers.iter().any(|m| normalized.contains(&normalize(m)))
}

pub fn review_questions(file_path: Option<&str>) -> Vec<String> {
    let mut questions: Vec<String> = BASE_QUESTIONS.iter().map(|q| q.to_string()).collect();
    let is_code = file_path
        .and_then(|f| Path::new(f).extension())
        .is_some_and(|e| CODE_EXTENSIONS.contains(&e.to_string_lossy().as_ref()));
    if is_code {
        questions.extend(CODE_QUESTIONS.iter().map(|q| q.to_string()));
    }
    questions
}

/// Nudges the agent to review its own work before stopping.
pub struct SelfReview {
    config: SelfReviewConfig,
}

impl SelfReview {
    pub fn new(config: SelfReviewConfig) -> Self {
        Self { config }
    }
}

impl HookHandler for SelfReview {
    fn name(&self) -> &'static str {
        "self_review"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::Stop, HookEvent::SubagentStop]
    }

    fn description(&self) -> &'static str {
        "Ask review questions when a session stops without a self-review marker"
    }

    fn handle(&self, _event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !self.config.enabled || payload.stop_hook_active {
            return Ok(HookOutcome::Allow);
        }
        let Some(transcript) = payload.transcript_path.as_deref().filter(|p| p.is_file()) else {
            return Ok(HookOutcome::Allow);
        };
        let content = match std::fs::read(transcript) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(path = %transcript.display(), error = %e, "transcript unreadable");
                return Ok(HookOutcome::Allow);
            }
        };
        if has_marker(&content, &self.config.markers, self.config.tail_lines) {
            return Ok(HookOutcome::Allow);
        }

        let file_path = payload.file_path().map(str::to_string);
        let questions = review_questions(file_path.as_deref());
        let record = SelfReviewMissing {
            kind: "self_review_missing",
            severity: "warning",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            question_count: questions.len(),
            questions,
            transcript_path: transcript.display().to_string(),
            file_path,
        };
        Ok(HookOutcome::Warn {
            message: serde_json::to_string(&record)?,
        })
    }
}
