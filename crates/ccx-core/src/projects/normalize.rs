use crate::error::Result;
use claude_log::{Event, EventKind};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

/// One event flattened into a fixed set of columns. Fields that do not apply
/// to the event type are null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub session_id: Option<String>,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub t: Option<String>,
    pub role: Option<String>,
    pub event_type: &'static str,
    pub text: Option<String>,
    pub tool_name: Option<String>,
    pub tool_use_id: Option<String>,
    pub tool_input: Option<Value>,
    pub is_error: Option<bool>,
    pub tool_result_text: Option<String>,
}

pub fn normalize_event(event: &Event) -> NormalizedRow {
    let meta = &event.meta;
    let mut row = NormalizedRow {
        session_id: meta.session_id.clone(),
        uuid: meta.uuid.clone(),
        parent_uuid: meta.parent_uuid.clone(),
        t: meta.timestamp.clone(),
        role: meta.role.clone(),
        event_type: "message",
        text: None,
        tool_name: None,
        tool_use_id: None,
        tool_input: None,
        is_error: None,
        tool_result_text: None,
    };
    match &event.kind {
        EventKind::Message { text } => {
            row.text = Some(text.clone());
        }
        EventKind::ToolUse {
            tool_name,
            tool_use_id,
            tool_input,
        } => {
            row.event_type = "tool_use";
            row.tool_name = Some(tool_name.clone());
            row.tool_use_id = Some(tool_use_id.clone());
            row.tool_input = Some(tool_input.clone());
        }
        EventKind::ToolResult {
            tool_use_id,
            is_error,
            content_text,
        } => {
            row.event_type = "tool_result";
            row.tool_use_id = Some(tool_use_id.clone());
            row.is_error = Some(*is_error);
            row.tool_result_text = Some(content_text.clone());
        }
    }
    row
}

/// Stream normalized rows for every event in `files` as JSON lines.
/// Returns the number of rows written.
pub fn write_normalized<W: Write>(files: Vec<PathBuf>, out: &mut W) -> Result<usize> {
    let mut n = 0;
    for event in claude_log::iter_project_events(files) {
        crate::io::write_jsonl_line(out, &normalize_event(&event))?;
        n += 1;
    }
    Ok(n)
}
