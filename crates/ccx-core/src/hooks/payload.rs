use crate::hooks::registry::HookEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// The JSON object Claude Code writes to a hook's stdin.
///
/// Only the fields ccx reads are typed; everything else is kept in `extra`
/// so payloads round-trip unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub tool_input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// SessionStart origin: `startup`, `resume`, `clear` or `compact`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookPayload {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn event(&self) -> Option<HookEvent> {
        self.hook_event_name.as_deref()?.parse().ok()
    }

    fn input_str(&self, key: &str) -> Option<&str> {
        self.tool_input.get(key).and_then(Value::as_str)
    }

    /// `tool_input.command` of a Bash call.
    pub fn command(&self) -> Option<&str> {
        self.input_str("command")
    }

    /// `tool_input.file_path` of an Edit/Write/MultiEdit call.
    pub fn file_path(&self) -> Option<&str> {
        self.input_str("file_path")
    }

    pub fn is_tool(&self, name: &str) -> bool {
        self.tool_name.as_deref() == Some(name)
    }
}
