//! Tool-use training rows: each tool call paired with its result, the
//! conversation leading up to it, and a +1/-1 reward.

use crate::error::Result;
use claude_log::{Event, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 50;
const TOP_TOOL_COUNTS: usize = 50;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub t: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResultSummary {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub content_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceStep {
    ToolUse {
        uuid: Option<String>,
        t: Option<String>,
        tool_name: String,
        tool_use_id: String,
        tool_input: Value,
    },
    Message(ContextMessage),
    ToolResult {
        uuid: Option<String>,
        t: Option<String>,
        tool_use_id: String,
        is_error: bool,
        content_text: String,
    },
}

impl TraceStep {
    pub fn type_name(&self) -> &'static str {
        match self {
            TraceStep::ToolUse { .. } => "tool_use",
            TraceStep::Message(_) => "message",
            TraceStep::ToolResult { .. } => "tool_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    #[serde(default)]
    pub session_id: String,
    /// Timestamp of the tool_use.
    #[serde(default)]
    pub t: Option<String>,
    /// Up to N messages that preceded the tool_use.
    #[serde(default)]
    pub messages: Vec<ContextMessage>,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_result: ToolResultSummary,
    #[serde(default)]
    pub trace: Vec<TraceStep>,
    #[serde(default)]
    pub reward: f64,
}

// ---------------------------------------------------------------------------
// RowBuilder
// ---------------------------------------------------------------------------

struct Pending {
    row: DatasetRow,
}

#[derive(Default)]
struct SessionState {
    history: VecDeque<ContextMessage>,
    pending: HashMap<String, Pending>,
    /// Open tool_use ids in arrival order, so intermediate messages land in
    /// traces deterministically.
    order: Vec<String>,
}

/// Incrementally pairs tool_use events with their tool_result, per session.
///
/// Tool uses that never see a result are dropped.
pub struct RowBuilder {
    max_context: usize,
    sessions: HashMap<String, SessionState>,
}

impl RowBuilder {
    pub fn new(max_context: usize) -> Self {
        Self {
            max_context,
            sessions: HashMap::new(),
        }
    }

    /// Feed one event; returns a row when it completes a pair.
    pub fn push(&mut self, event: Event) -> Option<DatasetRow> {
        let session_id = event.session_id().to_string();
        let state = self.sessions.entry(session_id.clone()).or_default();
        let Event { meta, kind } = event;

        match kind {
            EventKind::Message { text } => {
                let msg = ContextMessage {
                    uuid: meta.uuid,
                    t: meta.timestamp,
                    role: meta.role,
                    text,
                };
                for id in &state.order {
                    if let Some(p) = state.pending.get_mut(id) {
                        p.row.trace.push(TraceStep::Message(msg.clone()));
                    }
                }
                state.history.push_back(msg);
                while state.history.len() > self.max_context {
                    state.history.pop_front();
                }
                None
            }
            EventKind::ToolUse {
                tool_name,
                tool_use_id,
                tool_input,
            } => {
                let row = DatasetRow {
                    session_id,
                    t: meta.timestamp.clone(),
                    messages: state.history.iter().cloned().collect(),
                    tool_name: tool_name.clone(),
                    tool_input: tool_input.clone(),
                    tool_result: ToolResultSummary::default(),
                    trace: vec![TraceStep::ToolUse {
                        uuid: meta.uuid,
                        t: meta.timestamp,
                        tool_name,
                        tool_use_id: tool_use_id.clone(),
                        tool_input,
                    }],
                    reward: 0.0,
                };
                state.order.retain(|id| id != &tool_use_id);
                state.order.push(tool_use_id.clone());
                state.pending.insert(tool_use_id, Pending { row });
                None
            }
            EventKind::ToolResult {
                tool_use_id,
                is_error,
                content_text,
            } => {
                let Some(Pending { mut row }) = state.pending.remove(&tool_use_id) else {
                    debug!(tool_use_id = %tool_use_id, "tool_result without a matching tool_use");
                    return None;
                };
                state.order.retain(|id| id != &tool_use_id);
                row.trace.push(TraceStep::ToolResult {
                    uuid: meta.uuid,
                    t: meta.timestamp,
                    tool_use_id,
                    is_error,
                    content_text: content_text.clone(),
                });
                row.tool_result = ToolResultSummary {
                    is_error,
                    content_text,
                };
                row.reward = if is_error { -1.0 } else { 1.0 };
                Some(row)
            }
        }
    }
}

pub fn rows_from_events(
    events: impl IntoIterator<Item = Event>,
    max_context: usize,
) -> Vec<DatasetRow> {
    let mut builder = RowBuilder::new(max_context);
    events
        .into_iter()
        .filter_map(|e| builder.push(e))
        .collect()
}

// ---------------------------------------------------------------------------
// build_dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DatasetOptions {
    pub max_files: Option<usize>,
    pub max_rows: Option<usize>,
    pub max_context_messages: usize,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            max_files: None,
            max_rows: None,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub rows: usize,
    pub files: usize,
    /// The 50 most frequent tool names.
    pub tool_name_counts: BTreeMap<String, usize>,
}

/// Keep the `n` highest counts, ties broken by name.
pub(crate) fn top_counts(counts: HashMap<String, usize>, n: usize) -> BTreeMap<String, usize> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).collect()
}

/// Files ordered newest first by modification time.
pub fn newest_first(mut files: Vec<PathBuf>) -> Vec<PathBuf> {
    files.sort_by_cached_key(|p| {
        std::cmp::Reverse(std::fs::metadata(p).and_then(|m| m.modified()).ok())
    });
    files
}

/// Write dataset rows for `files` to `out` as JSONL, plus
/// `<out>.stats.json`.
pub fn build_dataset(
    files: Vec<PathBuf>,
    out: &Path,
    opts: &DatasetOptions,
) -> Result<DatasetStats> {
    let mut files = newest_first(files);
    if let Some(max) = opts.max_files.filter(|&m| m > 0) {
        files.truncate(max);
    }

    if let Some(parent) = out.parent() {
        crate::io::ensure_dir(parent)?;
    }
    let mut writer = BufWriter::new(std::fs::File::create(out)?);

    let mut builder = RowBuilder::new(opts.max_context_messages);
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut rows = 0;
    for event in claude_log::iter_project_events(files.clone()) {
        let Some(row) = builder.push(event) else {
            continue;
        };
        crate::io::write_jsonl_line(&mut writer, &row)?;
        *counts.entry(row.tool_name).or_insert(0) += 1;
        rows += 1;
        if opts.max_rows.is_some_and(|m| m > 0 && rows >= m) {
            break;
        }
    }
    writer.flush()?;

    let stats = DatasetStats {
        rows,
        files: files.len(),
        tool_name_counts: top_counts(counts, TOP_TOOL_COUNTS),
    };
    crate::io::write_json_pretty(&super::sidecar_path(out, ".stats.json"), &stats)?;
    Ok(stats)
}
