use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Project log records ──────────────────────────────────────────────────

/// One line of a project log (`~/.claude/projects/**/*.jsonl`).
/// Discriminated by the JSON `"type"` field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    User(ConversationEntry),
    Assistant(ConversationEntry),
    System(ConversationEntry),
    Summary(SummaryEntry),
    /// `file-history-snapshot`, `queue-operation` and anything newer.
    #[serde(other)]
    Other,
}

impl LogRecord {
    pub fn entry(&self) -> Option<&ConversationEntry> {
        match self {
            LogRecord::User(e) | LogRecord::Assistant(e) | LogRecord::System(e) => Some(e),
            LogRecord::Summary(_) | LogRecord::Other => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LogRecord::User(_) => "user",
            LogRecord::Assistant(_) => "assistant",
            LogRecord::System(_) => "system",
            LogRecord::Summary(_) => "summary",
            LogRecord::Other => "other",
        }
    }
}

/// Shared envelope of user, assistant and system records.
///
/// Claude Code writes these keys in camelCase (`sessionId`, `parentUuid`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sidechain: Option<bool>,
    #[serde(default)]
    pub message: Option<MessageBody>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryEntry {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub leaf_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MessageBody {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: MessageContent,
}

/// `message.content` is a bare string for typed user prompts and a block
/// list everywhere else.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

/// Content blocks within a message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs vary per tool, so Value is correct here.
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    Image {
        #[serde(default)]
        source: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl ToolResultContent {
    /// Flatten to plain text. Non-text blocks (images) are dropped.
    pub fn text(&self) -> String {
        match self {
            ToolResultContent::Text(s) => s.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

// ─── Transcript records ───────────────────────────────────────────────────

/// One line of a transcript file (`~/.claude/transcripts/ses_<id>.jsonl`).
///
/// `type` is one of `user`, `assistant`, `tool_use`, `tool_result`; anything
/// else is treated as assistant output by consumers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptLine {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tool_input: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tool_output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

// ─── Timestamps ───────────────────────────────────────────────────────────

/// Parse an ISO-8601 timestamp as written by Claude Code.
///
/// Accepts RFC 3339 (`2025-01-15T10:00:00.123Z`, `+02:00` offsets) and
/// offset-less datetimes, which are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}
