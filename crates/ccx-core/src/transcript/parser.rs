use crate::error::{CcxError, Result};
use crate::format::head_chars;
use crate::transcript::models::{
    span_seconds, Conversation, ConversationMetadata, Message, MessageType, ToolCall, ToolStatus,
};
use chrono::{DateTime, Utc};
use claude_log::{iter_jsonl, parse_timestamp, TranscriptLine};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const FILE_TOOLS: &[&str] = &[
    "read_files",
    "edit_files",
    "create_file",
    "Read",
    "Edit",
    "MultiEdit",
    "Write",
];
const PATTERN_TOOLS: &[&str] = &["grep", "file_glob", "Grep", "Glob"];
const SHELL_TOOLS: &[&str] = &["run_shell_command", "Bash"];

const COMMAND_TARGET_CHARS: usize = 50;

static SESSION_RE: OnceLock<Regex> = OnceLock::new();

fn session_re() -> &'static Regex {
    SESSION_RE.get_or_init(|| Regex::new(r"ses_([a-zA-Z0-9_]+)\.jsonl$").unwrap())
}

/// `.../ses_abc123.jsonl` → `abc123`; any other name → its file stem.
pub fn extract_session_id(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(caps) = session_re().captures(&name) {
        return caps[1].to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What a tool call acted on, by tool family.
///
/// File tools report the path, search tools their pattern, shell tools the
/// command (cut to 50 characters).
pub fn extract_target(tool_name: &str, input: &Value) -> Option<String> {
    if FILE_TOOLS.contains(&tool_name) {
        return first_string(input, &["file_path", "path", "files"]);
    }
    if PATTERN_TOOLS.contains(&tool_name) {
        return first_string(input, &["queries", "patterns", "query", "pattern"]);
    }
    if SHELL_TOOLS.contains(&tool_name) {
        let command = input.get("command")?.as_str()?;
        if command.chars().count() > COMMAND_TARGET_CHARS {
            return Some(format!("{}...", head_chars(command, COMMAND_TARGET_CHARS)));
        }
        return Some(command.to_string());
    }
    None
}

/// First present key, taking the first element when the value is a list.
fn first_string(input: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match input.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first()?.as_str().map(str::to_string),
        _ => None,
    })
}

/// Parse a transcript into messages and paired tool calls.
///
/// Lines without `type` or a parsable `timestamp` are skipped. Each
/// `tool_result` closes the most recent still-open call with the same tool
/// name.
pub fn parse_transcript(path: &Path) -> Result<Conversation> {
    if !path.is_file() {
        return Err(CcxError::TranscriptNotFound(path.display().to_string()));
    }
    let file_size_bytes = std::fs::metadata(path)?.len();

    let mut messages: Vec<Message> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut start_time: Option<DateTime<Utc>> = None;
    let mut end_time: Option<DateTime<Utc>> = None;

    for (line, value) in iter_jsonl(path)? {
        let record: TranscriptLine = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                debug!(path = %path.display(), line, error = %e, "skipping transcript line");
                continue;
            }
        };
        let Some(timestamp) = parse_timestamp(&record.timestamp) else {
            debug!(path = %path.display(), line, "skipping line with bad timestamp");
            continue;
        };
        widen(&mut start_time, &mut end_time, timestamp);

        let message_type = MessageType::from_record_type(&record.kind);
        let content = match message_type {
            MessageType::ToolUse | MessageType::ToolResult => value,
            MessageType::User | MessageType::Assistant => record.content.clone(),
        };

        match message_type {
            MessageType::ToolUse => {
                let name = record.tool_name.clone().unwrap_or_else(|| "unknown".to_string());
                tool_calls.push(ToolCall {
                    id: format!("{name}_{}", timestamp.to_rfc3339()),
                    target: extract_target(&name, &record.tool_input),
                    name,
                    input: record.tool_input.clone(),
                    status: ToolStatus::Running,
                    start_time: timestamp,
                    end_time: None,
                    error: None,
                });
            }
            MessageType::ToolResult => close_tool_call(&mut tool_calls, &record, timestamp),
            MessageType::User | MessageType::Assistant => {}
        }

        messages.push(Message {
            message_type,
            timestamp,
            content,
            role: record.role,
        });
    }

    let metadata = ConversationMetadata {
        session_id: extract_session_id(path),
        file_path: path.to_path_buf(),
        start_time,
        end_time,
        message_count: messages.len(),
        tool_call_count: tool_calls.len(),
        file_size_bytes,
        duration_seconds: span_seconds(start_time, end_time),
    };

    Ok(Conversation {
        metadata,
        messages,
        tool_calls,
    })
}

fn close_tool_call(calls: &mut [ToolCall], record: &TranscriptLine, at: DateTime<Utc>) {
    let Some(name) = record.tool_name.as_deref() else {
        return;
    };
    let Some(call) = calls
        .iter_mut()
        .rev()
        .find(|c| c.name == name && c.end_time.is_none())
    else {
        debug!(tool = name, "tool_result without an open tool_use");
        return;
    };
    call.end_time = Some(at);
    if record.is_error.unwrap_or(false) {
        call.status = ToolStatus::Error;
        call.error = Some(
            record
                .tool_output
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
        );
    } else {
        call.status = ToolStatus::Completed;
    }
}

fn widen(start: &mut Option<DateTime<Utc>>, end: &mut Option<DateTime<Utc>>, ts: DateTime<Utc>) {
    if start.map_or(true, |s| ts < s) {
        *start = Some(ts);
    }
    if end.map_or(true, |e| ts > e) {
        *end = Some(ts);
    }
}

/// Metadata from a single pass without building messages.
///
/// `message_count` counts every JSON object line; `tool_call_count` counts
/// `tool_use` lines.
pub fn transcript_metadata(path: &Path) -> Result<ConversationMetadata> {
    if !path.is_file() {
        return Err(CcxError::TranscriptNotFound(path.display().to_string()));
    }
    let file_size_bytes = std::fs::metadata(path)?.len();

    let mut message_count = 0;
    let mut tool_call_count = 0;
    let mut start_time = None;
    let mut end_time = None;

    for (_, value) in iter_jsonl(path)? {
        message_count += 1;
        if value.get("type").and_then(Value::as_str) == Some("tool_use") {
            tool_call_count += 1;
        }
        if let Some(ts) = value
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
        {
            widen(&mut start_time, &mut end_time, ts);
        }
    }

    Ok(ConversationMetadata {
        session_id: extract_session_id(path),
        file_path: path.to_path_buf(),
        start_time,
        end_time,
        message_count,
        tool_call_count,
        file_size_bytes,
        duration_seconds: span_seconds(start_time, end_time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_transcript(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn session_id_from_name() {
        assert_eq!(extract_session_id(Path::new("/t/ses_abc_123.jsonl")), "abc_123");
        assert_eq!(extract_session_id(Path::new("/t/other-file.jsonl")), "other-file");
    }

    #[test]
    fn target_by_tool_family() {
        assert_eq!(
            extract_target("read_files", &json!({"files": ["a.rs", "b.rs"]})).as_deref(),
            Some("a.rs")
        );
        assert_eq!(
            extract_target("Edit", &json!({"file_path": "/src/lib.rs"})).as_deref(),
            Some("/src/lib.rs")
        );
        assert_eq!(
            extract_target("grep", &json!({"queries": ["TODO"]})).as_deref(),
            Some("TODO")
        );
        assert_eq!(
            extract_target("Glob", &json!({"pattern": "**/*.rs"})).as_deref(),
            Some("**/*.rs")
        );
        assert_eq!(extract_target("WebFetch", &json!({"url": "x"})), None);
    }

    #[test]
    fn shell_target_truncated() {
        let long = "x".repeat(80);
        let target = extract_target("run_shell_command", &json!({ "command": long })).unwrap();
        assert_eq!(target.len(), 53);
        assert!(target.ends_with("..."));
        assert_eq!(
            extract_target("Bash", &json!({"command": "ls"})).as_deref(),
            Some("ls")
        );
    }

    #[test]
    fn parse_pairs_tool_calls() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            &dir,
            "ses_s1.jsonl",
            &[
                r#"{"type":"user","timestamp":"2025-01-15T10:00:00Z","content":"read it"}"#,
                r#"{"type":"tool_use","timestamp":"2025-01-15T10:00:05Z","tool_name":"read_files","tool_input":{"files":["a.rs"]}}"#,
                r#"{"type":"tool_result","timestamp":"2025-01-15T10:00:06Z","tool_name":"read_files","tool_output":{"content":"ok"}}"#,
                r#"{"type":"tool_use","timestamp":"2025-01-15T10:00:10Z","tool_name":"run_shell_command","tool_input":{"command":"cargo test"}}"#,
                r#"{"type":"tool_result","timestamp":"2025-01-15T10:00:20Z","tool_name":"run_shell_command","is_error":true,"tool_output":{"error":"exit 101"}}"#,
                r#"{"type":"assistant","timestamp":"2025-01-15T10:01:00Z","content":"done","role":"assistant"}"#,
            ],
        );
        let conv = parse_transcript(&path).unwrap();
        assert_eq!(conv.metadata.session_id, "s1");
        assert_eq!(conv.messages.len(), 6);
        assert_eq!(conv.tool_calls.len(), 2);
        assert_eq!(conv.tool_calls[0].status, ToolStatus::Completed);
        assert_eq!(conv.tool_calls[0].target.as_deref(), Some("a.rs"));
        assert_eq!(conv.tool_calls[1].status, ToolStatus::Error);
        assert_eq!(conv.tool_calls[1].error.as_deref(), Some("exit 101"));
        assert_eq!(conv.tool_calls[1].duration_seconds(), Some(10.0));
        assert_eq!(conv.duration(), Some(60.0));
        assert_eq!(conv.user_message_count(), 1);
        assert_eq!(conv.assistant_message_count(), 1);
        assert!(conv.has_errors());
    }

    #[test]
    fn time_span_uses_earliest_and_latest_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            &dir,
            "ses_s4.jsonl",
            &[
                r#"{"type":"user","timestamp":"2025-01-15T10:00:30Z","content":"second"}"#,
                r#"{"type":"user","timestamp":"2025-01-15T10:02:00Z","content":"last"}"#,
                r#"{"type":"assistant","timestamp":"2025-01-15T10:00:00Z","content":"first"}"#,
            ],
        );
        let conv = parse_transcript(&path).unwrap();
        let earliest = "2025-01-15T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let latest = "2025-01-15T10:02:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(conv.metadata.start_time, Some(earliest));
        assert_eq!(conv.metadata.end_time, Some(latest));
        assert_eq!(conv.duration(), Some(120.0));

        let meta = transcript_metadata(&path).unwrap();
        assert_eq!(meta.start_time, Some(earliest));
        assert_eq!(meta.duration_seconds, Some(120.0));
    }

    #[test]
    fn result_closes_most_recent_open_call() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            &dir,
            "ses_s2.jsonl",
            &[
                r#"{"type":"tool_use","timestamp":"2025-01-15T10:00:00Z","tool_name":"grep","tool_input":{}}"#,
                r#"{"type":"tool_use","timestamp":"2025-01-15T10:00:01Z","tool_name":"grep","tool_input":{}}"#,
                r#"{"type":"tool_result","timestamp":"2025-01-15T10:00:02Z","tool_name":"grep","is_error":true}"#,
            ],
        );
        let conv = parse_transcript(&path).unwrap();
        assert_eq!(conv.tool_calls[0].status, ToolStatus::Running);
        assert_eq!(conv.tool_calls[1].status, ToolStatus::Error);
        assert_eq!(conv.tool_calls[1].error.as_deref(), Some("Unknown error"));
    }

    #[test]
    fn parse_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            &dir,
            "ses_s3.jsonl",
            &[
                "{not json",
                r#"{"content":"no type"}"#,
                r#"{"type":"user","timestamp":"garbage","content":"x"}"#,
                r#"{"type":"thinking","timestamp":"2025-01-15T10:00:00Z","content":"hmm"}"#,
            ],
        );
        let conv = parse_transcript(&path).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].message_type, MessageType::Assistant);
    }

    #[test]
    fn missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = parse_transcript(&dir.path().join("ses_none.jsonl")).unwrap_err();
        assert!(matches!(err, CcxError::TranscriptNotFound(_)));
    }

    #[test]
    fn metadata_scan_counts_lines() {
        let dir = TempDir::new().unwrap();
        let path = write_transcript(
            &dir,
            "ses_m.jsonl",
            &[
                r#"{"type":"user","timestamp":"2025-01-15T10:00:00Z","content":"a"}"#,
                r#"{"type":"tool_use","timestamp":"2025-01-15T10:02:00Z","tool_name":"grep"}"#,
                r#"{"type":"note"}"#,
            ],
        );
        let meta = transcript_metadata(&path).unwrap();
        assert_eq!(meta.message_count, 3);
        assert_eq!(meta.tool_call_count, 1);
        assert_eq!(meta.duration_seconds, Some(120.0));
        assert!(meta.file_size_bytes > 0);
    }
}
