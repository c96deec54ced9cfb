//! Session-level trajectories built from dataset rows, scored with a
//! weighted blend of reward signals and rendered as chat-completion style
//! message lists.

use crate::error::Result;
use crate::projects::dataset::{top_counts, DatasetRow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_MIN_LENGTH: usize = 3;
pub const DEFAULT_MAX_LENGTH: usize = 50;

/// Tool calls a focused edit is expected to need.
const EXPECTED_CALLS: f64 = 7.0;
const TOOL_RESULT_CHARS: usize = 2000;
const TOP_DISTRIBUTION: usize = 20;

/// Substrings that mark a tool result as failed.
pub const ERROR_PATTERNS: &[&str] = &[
    "error",
    "Error",
    "ERROR",
    "failed",
    "Failed",
    "FAILED",
    "not found",
    "does not exist",
    "permission denied",
    "timed out",
];

const WARMUP_MARKERS: &[&str] = &[
    "Warmup",
    "memory agent",
    "MEMORY PROCESSING",
    "observed_from_primary_session",
    "Claude-Mem",
];

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    #[serde(default = "default_tool_success")]
    pub tool_success: f64,
    #[serde(default = "default_efficiency")]
    pub efficiency: f64,
    #[serde(default = "default_task_completion")]
    pub task_completion: f64,
    #[serde(default = "default_error_recovery")]
    pub error_recovery: f64,
    #[serde(default = "default_code_quality")]
    pub code_quality: f64,
}

fn default_tool_success() -> f64 {
    0.3
}
fn default_efficiency() -> f64 {
    0.2
}
fn default_task_completion() -> f64 {
    0.3
}
fn default_error_recovery() -> f64 {
    0.1
}
fn default_code_quality() -> f64 {
    0.1
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            tool_success: default_tool_success(),
            efficiency: default_efficiency(),
            task_completion: default_task_completion(),
            error_recovery: default_error_recovery(),
            code_quality: default_code_quality(),
        }
    }
}

impl RewardWeights {
    pub fn total(&self) -> f64 {
        self.tool_success
            + self.efficiency
            + self.task_completion
            + self.error_recovery
            + self.code_quality
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrajectoryRewards {
    pub tool_success_rate: f64,
    pub efficiency: f64,
    pub task_completed: f64,
    pub error_recovery: f64,
    /// Reserved for external lint scores; always 0 here.
    pub code_quality: f64,
}

impl TrajectoryRewards {
    /// Weighted mean over the signals that fired. Success rate and
    /// efficiency always count; the others only when positive. With no
    /// weight in play the result is a neutral 0.5.
    pub fn combined(&self, w: &RewardWeights) -> f64 {
        let signals = [
            (self.tool_success_rate, w.tool_success, true),
            (self.efficiency, w.efficiency, true),
            (self.task_completed, w.task_completion, false),
            (self.error_recovery, w.error_recovery, false),
            (self.code_quality, w.code_quality, false),
        ];
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (value, weight, always) in signals {
            if value > 0.0 || always {
                total += weight * value;
                weight_sum += weight;
            }
        }
        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            0.5
        }
    }
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryCall {
    pub name: String,
    pub input: Value,
    pub result: String,
    pub success: bool,
    pub t: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryMessage {
    pub role: String,
    pub text: String,
    pub t: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Trajectory {
    pub session_id: String,
    pub messages: Vec<TrajectoryMessage>,
    pub tool_calls: Vec<TrajectoryCall>,
    pub rewards: TrajectoryRewards,
    pub final_reward: f64,
    pub file_paths: Vec<String>,
    pub languages: Vec<String>,
}

pub fn is_error_text(text: &str) -> bool {
    ERROR_PATTERNS.iter().any(|p| text.contains(p))
}

pub fn is_warmup(text: &str) -> bool {
    text.is_empty() || WARMUP_MARKERS.iter().any(|m| text.contains(m))
}

pub fn extract_file_path(input: &Value) -> Option<&str> {
    ["file_path", "path", "file"]
        .iter()
        .find_map(|k| input.get(k).and_then(Value::as_str))
}

pub fn detect_language(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "py" => "python",
        "go" => "go",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "rs" => "rust",
        "rb" => "ruby",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        _ => return None,
    })
}

pub fn compute_rewards(calls: &[TrajectoryCall]) -> TrajectoryRewards {
    let mut rewards = TrajectoryRewards::default();
    if calls.is_empty() {
        return rewards;
    }
    let n = calls.len() as f64;
    rewards.tool_success_rate = calls.iter().filter(|c| c.success).count() as f64 / n;
    rewards.efficiency = (EXPECTED_CALLS / n).clamp(0.0, 1.0);

    let completed_todo = calls
        .iter()
        .filter(|c| c.name == "TodoWrite")
        .filter_map(|c| c.input.get("todos").and_then(Value::as_array))
        .flatten()
        .any(|todo| todo.get("status").and_then(Value::as_str) == Some("completed"));
    if completed_todo {
        rewards.task_completed = 1.0;
    }

    let recovered = calls
        .windows(2)
        .any(|w| !w[0].success && w[1].success && w[0].name == w[1].name);
    if recovered {
        rewards.error_recovery = 0.5;
    }

    rewards
}

/// Build one trajectory from a session's rows (already sorted by time),
/// using at most `max_length` of them.
pub fn build_trajectory(
    session_id: &str,
    rows: &[DatasetRow],
    max_length: usize,
    weights: &RewardWeights,
) -> Trajectory {
    let rows = &rows[..rows.len().min(max_length)];
    let mut traj = Trajectory {
        session_id: session_id.to_string(),
        ..Default::default()
    };

    let mut seen: HashSet<&str> = HashSet::new();
    for msg in rows.iter().flat_map(|r| &r.messages) {
        let Some(uuid) = msg.uuid.as_deref() else {
            continue;
        };
        if is_warmup(&msg.text) || !seen.insert(uuid) {
            continue;
        }
        traj.messages.push(TrajectoryMessage {
            role: msg.role.clone().unwrap_or_else(|| "user".to_string()),
            text: msg.text.clone(),
            t: msg.t.clone(),
        });
    }

    let mut paths_seen: HashSet<String> = HashSet::new();
    let mut langs_seen: HashSet<&'static str> = HashSet::new();
    for row in rows {
        let input = match &row.tool_input {
            Value::String(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| json!({ "raw": raw }))
            }
            other => other.clone(),
        };
        let result = &row.tool_result;
        let success = !result.is_error && !is_error_text(&result.content_text);

        if let Some(path) = extract_file_path(&input) {
            if paths_seen.insert(path.to_string()) {
                traj.file_paths.push(path.to_string());
            }
            if let Some(lang) = detect_language(path) {
                if langs_seen.insert(lang) {
                    traj.languages.push(lang.to_string());
                }
            }
        }

        traj.tool_calls.push(TrajectoryCall {
            name: row.tool_name.clone(),
            input,
            result: result.content_text.clone(),
            success,
            t: row.t.clone(),
        });
    }

    traj.rewards = compute_rewards(&traj.tool_calls);
    traj.final_reward = traj.rewards.combined(weights);
    traj
}

impl Trajectory {
    pub fn system_prompt(&self) -> String {
        let langs = if self.languages.is_empty() {
            "code".to_string()
        } else {
            self.languages.join(", ")
        };
        format!(
            "You are a code completion assistant.\n\n\
             You have access to tools for reading files (Read), editing files (Edit), \
             running commands (Bash), searching code (Grep, Glob) and managing tasks (TodoWrite).\n\n\
             Current context: working with {langs} files.\n\n\
             Gather context first, then make targeted edits."
        )
    }

    /// `{reward, messages_and_choices, metadata}` with tool calls rendered as
    /// assistant `tool_calls` followed by a `tool` message.
    pub fn to_chat_format(&self) -> Value {
        let mut items = vec![json!({"role": "system", "content": self.system_prompt()})];
        for msg in &self.messages {
            items.push(json!({"role": msg.role, "content": msg.text}));
        }
        for call in &self.tool_calls {
            items.push(json!({
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.input.to_string()},
                }],
            }));
            let content: String = call.result.chars().take(TOOL_RESULT_CHARS).collect();
            items.push(json!({"role": "tool", "content": content, "name": call.name}));
        }
        json!({
            "reward": self.final_reward,
            "messages_and_choices": items,
            "metadata": {
                "session_id": self.session_id,
                "file_paths": self.file_paths,
                "languages": self.languages,
                "rewards_breakdown": self.rewards,
                "num_tool_calls": self.tool_calls.len(),
            },
        })
    }
}

/// Group rows by session (empty ids become `unknown`), each sorted by `t`.
pub fn group_by_session(rows: Vec<DatasetRow>) -> BTreeMap<String, Vec<DatasetRow>> {
    let mut sessions: BTreeMap<String, Vec<DatasetRow>> = BTreeMap::new();
    for row in rows {
        let key = if row.session_id.is_empty() {
            "unknown".to_string()
        } else {
            row.session_id.clone()
        };
        sessions.entry(key).or_default().push(row);
    }
    for rows in sessions.values_mut() {
        rows.sort_by(|a, b| a.t.cmp(&b.t));
    }
    sessions
}

// ---------------------------------------------------------------------------
// convert_dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConversionStats {
    pub input_rows: usize,
    pub sessions: usize,
    pub trajectories: usize,
    pub skipped: usize,
    pub avg_tool_calls: f64,
    pub avg_reward: f64,
    pub language_distribution: BTreeMap<String, usize>,
    pub tool_distribution: BTreeMap<String, usize>,
}

/// Read dataset rows from `input`, write one trajectory per qualifying
/// session to `output`, plus `<output>.stats.json`.
pub fn convert_dataset(
    input: &Path,
    output: &Path,
    min_length: usize,
    max_length: usize,
    weights: &RewardWeights,
) -> Result<ConversionStats> {
    let rows: Vec<DatasetRow> = claude_log::iter_jsonl(input)?
        .typed::<DatasetRow>()
        .map(|(_, row)| row)
        .collect();
    let input_rows = rows.len();
    let sessions = group_by_session(rows);

    let mut trajectories = Vec::new();
    let mut skipped = 0;
    for (session_id, session_rows) in &sessions {
        if session_rows.len() < min_length {
            skipped += 1;
            continue;
        }
        let traj = build_trajectory(session_id, session_rows, max_length, weights);
        if traj.tool_calls.len() < min_length {
            skipped += 1;
            continue;
        }
        trajectories.push(traj);
    }

    if let Some(parent) = output.parent() {
        crate::io::ensure_dir(parent)?;
    }
    let mut writer = BufWriter::new(std::fs::File::create(output)?);
    for traj in &trajectories {
        crate::io::write_jsonl_line(&mut writer, &traj.to_chat_format())?;
    }
    writer.flush()?;

    let mut langs: HashMap<String, usize> = HashMap::new();
    let mut tools: HashMap<String, usize> = HashMap::new();
    for traj in &trajectories {
        for lang in &traj.languages {
            *langs.entry(lang.clone()).or_insert(0) += 1;
        }
        for call in &traj.tool_calls {
            *tools.entry(call.name.clone()).or_insert(0) += 1;
        }
    }

    let n = trajectories.len();
    let mean = |sum: f64| if n == 0 { 0.0 } else { sum / n as f64 };
    let stats = ConversionStats {
        input_rows,
        sessions: sessions.len(),
        trajectories: n,
        skipped,
        avg_tool_calls: mean(trajectories.iter().map(|t| t.tool_calls.len() as f64).sum()),
        avg_reward: mean(trajectories.iter().map(|t| t.final_reward).sum()),
        language_distribution: top_counts(langs, TOP_DISTRIBUTION),
        tool_distribution: top_counts(tools, TOP_DISTRIBUTION),
    };
    crate::io::write_json_pretty(&super::sidecar_path(output, ".stats.json"), &stats)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::dataset::{ContextMessage, ToolResultSummary};
    use tempfile::TempDir;

    fn call(name: &str, success: bool) -> TrajectoryCall {
        TrajectoryCall {
            name: name.to_string(),
            input: json!({}),
            result: String::new(),
            success,
            t: None,
        }
    }

    fn row(
        session: &str,
        t: &str,
        tool: &str,
        input: Value,
        result: &str,
        msgs: &[(&str, &str)],
    ) -> DatasetRow {
        DatasetRow {
            session_id: session.to_string(),
            t: Some(t.to_string()),
            messages: msgs
                .iter()
                .map(|(uuid, text)| ContextMessage {
                    uuid: Some(uuid.to_string()),
                    t: None,
                    role: Some("user".to_string()),
                    text: text.to_string(),
                })
                .collect(),
            tool_name: tool.to_string(),
            tool_input: input,
            tool_result: ToolResultSummary {
                is_error: false,
                content_text: result.to_string(),
            },
            trace: Vec::new(),
            reward: 1.0,
        }
    }

    #[test]
    fn rewards_from_calls() {
        let calls = vec![
            call("Bash", false),
            call("Bash", true),
            call("Read", true),
            call("Read", true),
        ];
        let r = compute_rewards(&calls);
        assert_eq!(r.tool_success_rate, 0.75);
        assert_eq!(r.efficiency, 1.0);
        assert_eq!(r.error_recovery, 0.5);
        assert_eq!(r.task_completed, 0.0);
    }

    #[test]
    fn efficiency_drops_past_expected_calls() {
        let calls: Vec<_> = (0..14).map(|_| call("Read", true)).collect();
        assert_eq!(compute_rewards(&calls).efficiency, 0.5);
    }

    #[test]
    fn todo_completion_detected() {
        let mut todo = call("TodoWrite", true);
        todo.input = json!({"todos": [{"status": "pending"}, {"status": "completed"}]});
        assert_eq!(compute_rewards(&[todo]).task_completed, 1.0);
    }

    #[test]
    fn combined_reward_weighting() {
        let w = RewardWeights::default();
        let r = TrajectoryRewards {
            tool_success_rate: 1.0,
            efficiency: 1.0,
            ..Default::default()
        };
        assert!((r.combined(&w) - 1.0).abs() < 1e-9);

        let r = TrajectoryRewards {
            tool_success_rate: 0.5,
            efficiency: 0.5,
            task_completed: 1.0,
            ..Default::default()
        };
        // (0.3*0.5 + 0.2*0.5 + 0.3*1.0) / 0.8
        assert!((r.combined(&w) - 0.6875).abs() < 1e-9);

        let zero = RewardWeights {
            tool_success: 0.0,
            efficiency: 0.0,
            ..Default::default()
        };
        assert_eq!(TrajectoryRewards::default().combined(&zero), 0.5);
    }

    #[test]
    fn helpers() {
        assert!(is_error_text("Error: file not found"));
        assert!(!is_error_text("all good"));
        assert!(is_warmup(""));
        assert!(is_warmup("Warmup ping"));
        assert_eq!(extract_file_path(&json!({"path": "a.rs"})), Some("a.rs"));
        assert_eq!(detect_language("src/App.TSX"), Some("typescript"));
        assert_eq!(detect_language("Makefile"), None);
    }

    #[test]
    fn trajectory_dedupes_and_filters() {
        let rows = vec![
            row(
                "S",
                "1",
                "Read",
                json!({"file_path": "a.py"}),
                "ok",
                &[("m1", "fix it"), ("w", "Warmup")],
            ),
            row("S", "2", "Edit", json!({"file_path": "a.py"}), "ok", &[("m1", "fix it")]),
            row(
                "S",
                "3",
                "Bash",
                Value::String(r#"{"command":"pytest"}"#.to_string()),
                "3 failed",
                &[],
            ),
        ];
        let traj = build_trajectory("S", &rows, 50, &RewardWeights::default());
        assert_eq!(traj.messages.len(), 1);
        assert_eq!(traj.file_paths, vec!["a.py"]);
        assert_eq!(traj.languages, vec!["python"]);
        assert_eq!(traj.tool_calls[2].input["command"], "pytest");
        assert!(!traj.tool_calls[2].success);

        let out = traj.to_chat_format();
        let items = out["messages_and_choices"].as_array().unwrap();
        assert_eq!(items[0]["role"], "system");
        assert_eq!(items[2]["tool_calls"][0]["function"]["name"], "Read");
        assert_eq!(items[3]["role"], "tool");
        assert_eq!(out["metadata"]["num_tool_calls"], 3);
    }

    #[test]
    fn long_tool_results_truncated() {
        let long = "x".repeat(5000);
        let rows = vec![row("S", "1", "Read", json!({}), &long, &[])];
        let out = build_trajectory("S", &rows, 50, &RewardWeights::default()).to_chat_format();
        let content = out["messages_and_choices"][2]["content"].as_str().unwrap();
        assert_eq!(content.len(), 2000);
    }

    #[test]
    fn max_length_caps_rows() {
        let rows: Vec<_> = (0..5)
            .map(|i| row("S", &i.to_string(), "Read", json!({}), "ok", &[]))
            .collect();
        assert_eq!(build_trajectory("S", &rows, 2, &RewardWeights::default()).tool_calls.len(), 2);
    }

    #[test]
    fn convert_skips_short_sessions() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("rows.jsonl");
        let mut lines = Vec::new();
        for i in 0..3 {
            let r = row("long", &format!("{i}"), "Read", json!({"path": "x.rs"}), "ok", &[]);
            lines.push(serde_json::to_string(&r).unwrap());
        }
        let r = row("short", "0", "Read", json!({}), "ok", &[]);
        lines.push(serde_json::to_string(&r).unwrap());
        std::fs::write(&input, lines.join("\n")).unwrap();

        let output = dir.path().join("traj.jsonl");
        let stats = convert_dataset(&input, &output, 3, 50, &RewardWeights::default()).unwrap();
        assert_eq!(stats.input_rows, 4);
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.trajectories, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.avg_tool_calls, 3.0);
        assert_eq!(stats.language_distribution["rust"], 1);
        assert!(dir.path().join("traj.jsonl.stats.json").exists());
        assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 1);
    }
}
