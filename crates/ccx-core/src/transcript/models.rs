use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// MessageType / ToolStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    ToolUse,
    ToolResult,
}

impl MessageType {
    /// Map a transcript `type` value. Unknown types are assistant output.
    pub fn from_record_type(kind: &str) -> Self {
        match kind {
            "user" => MessageType::User,
            "tool_use" => MessageType::ToolUse,
            "tool_result" => MessageType::ToolResult,
            _ => MessageType::Assistant,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::ToolUse => "tool_use",
            MessageType::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Error,
}

// ---------------------------------------------------------------------------
// Message / ToolCall
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    /// Text for user/assistant messages; the whole record for tool messages.
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Message {
    /// Searchable text of the message.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub status: ToolStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// File, pattern or command the call acted on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ToolCall {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

// ---------------------------------------------------------------------------
// ConversationMetadata / Conversation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub session_id: String,
    pub file_path: PathBuf,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub file_size_bytes: u64,
    pub duration_seconds: Option<f64>,
}

pub(crate) fn span_seconds(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<f64> {
    match (start, end) {
        (Some(s), Some(e)) => Some((e - s).num_milliseconds() as f64 / 1000.0),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub metadata: ConversationMetadata,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
}

impl Conversation {
    pub fn duration(&self) -> Option<f64> {
        self.metadata.duration_seconds
    }

    pub fn user_message_count(&self) -> usize {
        self.count_of(MessageType::User)
    }

    pub fn assistant_message_count(&self) -> usize {
        self.count_of(MessageType::Assistant)
    }

    fn count_of(&self, kind: MessageType) -> usize {
        self.messages
            .iter()
            .filter(|m| m.message_type == kind)
            .count()
    }

    pub fn unique_tools(&self) -> BTreeSet<&str> {
        self.tool_calls.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.tool_calls
            .iter()
            .any(|t| t.status == ToolStatus::Error)
    }
}

// ---------------------------------------------------------------------------
// SearchFilter
// ---------------------------------------------------------------------------

/// Criteria for narrowing a conversation listing. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Case-insensitive substring over message text.
    pub text_query: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    /// Matches when any listed tool was used.
    pub tools_used: Vec<String>,
    pub min_messages: Option<usize>,
    pub max_messages: Option<usize>,
    pub has_errors: Option<bool>,
}

impl SearchFilter {
    /// True when the filter can be decided from metadata alone.
    pub fn metadata_only(&self) -> bool {
        self.text_query.is_none() && self.tools_used.is_empty() && self.has_errors.is_none()
    }
}

// ---------------------------------------------------------------------------
// ConversationStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub total_tool_calls: usize,
    pub unique_tools_used: BTreeSet<String>,
    pub average_duration: Option<f64>,
    pub date_range: Option<DateRange>,
    pub tool_usage_counts: BTreeMap<String, usize>,
    /// `YYYY-MM-DD` → conversations started that day.
    pub conversations_by_date: BTreeMap<String, usize>,
}
