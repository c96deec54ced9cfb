use crate::reader::iter_jsonl;
use crate::types::{ContentBlock, LogRecord, MessageContent};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Envelope fields every event inherits from its record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventMeta {
    pub session_id: Option<String>,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub timestamp: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    Message {
        text: String,
    },
    ToolUse {
        tool_name: String,
        tool_use_id: String,
        tool_input: Value,
    },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        content_text: String,
    },
}

/// A single conversational event: one text block, tool call or tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn session_id(&self) -> &str {
        self.meta.session_id.as_deref().unwrap_or("")
    }
}

/// Split one record into events, in block order.
///
/// A string `content` becomes a single message event. Block lists yield one
/// event per `text`, `tool_use` and `tool_result` block; thinking and image
/// blocks are ignored. Records without a `message` yield nothing.
pub fn extract_events(record: &LogRecord) -> Vec<Event> {
    let Some(entry) = record.entry() else {
        return Vec::new();
    };
    let Some(message) = &entry.message else {
        return Vec::new();
    };

    let meta = EventMeta {
        session_id: entry.session_id.clone(),
        uuid: entry.uuid.clone(),
        parent_uuid: entry.parent_uuid.clone(),
        timestamp: entry.timestamp.clone(),
        role: message.role.clone(),
    };

    let kinds: Vec<EventKind> = match &message.content {
        MessageContent::Text(text) => vec![EventKind::Message { text: text.clone() }],
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(EventKind::Message { text: text.clone() }),
                ContentBlock::ToolUse { id, name, input } => Some(EventKind::ToolUse {
                    tool_name: name.clone(),
                    tool_use_id: id.clone(),
                    tool_input: input.clone(),
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(EventKind::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    is_error: is_error.unwrap_or(false),
                    content_text: content.as_ref().map(|c| c.text()).unwrap_or_default(),
                }),
                ContentBlock::Thinking { .. }
                | ContentBlock::Image { .. }
                | ContentBlock::Other => None,
            })
            .collect(),
    };

    kinds
        .into_iter()
        .map(|kind| Event {
            meta: meta.clone(),
            kind,
        })
        .collect()
}

/// Parse a raw JSON object and extract its events. Unrecognised shapes yield
/// nothing.
pub fn extract_events_from_value(value: Value) -> Vec<Event> {
    match serde_json::from_value::<LogRecord>(value) {
        Ok(record) => extract_events(&record),
        Err(e) => {
            debug!(error = %e, "skipping record that is not a log record");
            Vec::new()
        }
    }
}

/// Stream events from every file in `paths`, in order. Unreadable files are
/// skipped.
pub fn iter_project_events(paths: Vec<PathBuf>) -> impl Iterator<Item = Event> {
    paths
        .into_iter()
        .filter_map(|path| match iter_jsonl(&path) {
            Ok(reader) => Some(reader),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open log file");
                None
            }
        })
        .flatten()
        .flat_map(|(_, value)| extract_events_from_value(value))
}
