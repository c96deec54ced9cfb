use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One line of `logs/ccx-hooks.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookInvocation {
    pub id: String,
    pub hook: String,
    pub event: Option<String>,
    pub tool: Option<String>,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// `allow`, `block`, `context`, `warn` or `error`.
    pub outcome: String,
}

impl HookInvocation {
    pub fn new(hook: &str, started_at: DateTime<Utc>, elapsed: Duration, outcome: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hook: hook.to_string(),
            event: None,
            tool: None,
            session_id: None,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            outcome: outcome.to_string(),
        }
    }
}

/// Append `entry` to the hook log. Failures are swallowed: logging must
/// never change a hook's verdict.
pub fn record(log_path: &Path, entry: &HookInvocation) {
    if let Err(e) = crate::io::append_jsonl(log_path, entry) {
        debug!(path = %log_path.display(), error = %e, "hook log write failed");
    }
}
