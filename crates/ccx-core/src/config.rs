use crate::error::Result;
use crate::paths;
use crate::projects::trajectory::RewardWeights;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ExplorerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Overrides `<claude_dir>/transcripts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripts_dir: Option<PathBuf>,
    #[serde(default = "default_list_limit")]
    pub default_limit: usize,
}

fn default_list_limit() -> usize {
    20
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            transcripts_dir: None,
            default_limit: default_list_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hook settings
// ---------------------------------------------------------------------------

/// A command pattern the dangerous-command guard refuses to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DangerousPattern {
    /// Regex matched against the full Bash command.
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_dangerous_patterns() -> Vec<DangerousPattern> {
    let p = |pattern: &str, reason: &str| DangerousPattern {
        pattern: pattern.to_string(),
        reason: Some(reason.to_string()),
    };
    vec![
        p(
            r"\brm\s+(-[a-zA-Z]*[rR][a-zA-Z]*f|-[a-zA-Z]*f[a-zA-Z]*[rR]|-[rR]\s+-f|-f\s+-[rR])\b",
            "rm -rf is prohibited.",
        ),
        p(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bombs are prohibited."),
        p(r"\bmkfs(\.\w+)?\b", "formatting filesystems is prohibited."),
        p(r"\bdd\b.*\bof=/dev/", "raw writes to devices are prohibited."),
        p(r"\bchmod\s+-R\s+777\s+/", "recursive chmod 777 is prohibited."),
        p(r">\s*/dev/sd[a-z]\b", "raw writes to devices are prohibited."),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellcheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum severity reported: `error`, `warning`, `info` or `style`.
    #[serde(default = "default_shellcheck_severity")]
    pub severity: String,
    #[serde(default = "default_shellcheck_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_shellcheck_timeout")]
    pub timeout_seconds: u32,
}

fn default_true() -> bool {
    true
}

fn default_shellcheck_severity() -> String {
    "warning".to_string()
}

fn default_shellcheck_exclude() -> Vec<String> {
    // SC2317: "command appears unreachable", noisy on one-liners
    vec!["SC2317".to_string()]
}

fn default_shellcheck_timeout() -> u32 {
    5
}

impl Default for ShellcheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            severity: default_shellcheck_severity(),
            exclude: default_shellcheck_exclude(),
            timeout_seconds: default_shellcheck_timeout(),
        }
    }
}

pub const SHELLCHECK_SEVERITIES: &[&str] = &["error", "warning", "info", "style"];

/// A linter run against edited files with a matching extension.
///
/// `command` is split on whitespace; a `{file}` token is replaced by the
/// edited path, otherwise the path is appended as the last argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    pub extensions: Vec<String>,
    pub command: String,
    #[serde(default = "default_validator_timeout")]
    pub timeout_seconds: u32,
}

fn default_validator_timeout() -> u32 {
    30
}

fn default_validators() -> Vec<ValidatorConfig> {
    let v = |name: &str, exts: &[&str], command: &str| ValidatorConfig {
        name: name.to_string(),
        extensions: exts.iter().map(|e| e.to_string()).collect(),
        command: command.to_string(),
        timeout_seconds: default_validator_timeout(),
    };
    vec![
        v("ruff", &[".py"], "ruff check {file}"),
        v("shellcheck", &[".sh", ".bash"], "shellcheck {file}"),
        v("rustfmt", &[".rs"], "rustfmt --check --edition 2021 {file}"),
        v("gofmt", &[".go"], "gofmt -l {file}"),
        v("eslint", &[".js", ".jsx", ".ts", ".tsx"], "eslint {file}"),
        v("json", &[".json"], "python3 -m json.tool {file}"),
        v("yamllint", &[".yaml", ".yml"], "yamllint {file}"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseMapConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_map_depth")]
    pub max_depth: usize,
    #[serde(default = "default_map_exclude")]
    pub exclude: Vec<String>,
}

fn default_map_depth() -> usize {
    3
}

fn default_map_exclude() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "__pycache__",
        ".venv",
        "venv",
        "dist",
        "build",
        "target",
        ".pytest_cache",
        ".mypy_cache",
        ".ruff_cache",
        "coverage",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for CodebaseMapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: default_map_depth(),
            exclude: default_map_exclude(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContextConfig {
    #[serde(default = "default_true")]
    pub git_branch: bool,
    #[serde(default = "default_true")]
    pub recent_commits: bool,
    #[serde(default = "default_true")]
    pub uncommitted_count: bool,
    #[serde(default = "default_true")]
    pub resume_source: bool,
}

impl Default for SessionContextConfig {
    fn default() -> Self {
        Self {
            git_branch: true,
            recent_commits: true,
            uncommitted_count: true,
            resume_source: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfReviewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_review_markers")]
    pub markers: Vec<String>,
}

fn default_tail_lines() -> usize {
    500
}

fn default_review_markers() -> Vec<String> {
    [
        "self review",
        "critical review",
        "implementation complete",
        "testing complete",
        "edge cases considered",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for SelfReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tail_lines: default_tail_lines(),
            markers: default_review_markers(),
        }
    }
}

/// Snippets of files named or matched by a submitted prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitContextConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Budget for all injected text, at roughly four characters per token.
    #[serde(default = "default_jit_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_jit_max_files")]
    pub max_files: usize,
    /// Files larger than this are never searched.
    #[serde(default = "default_jit_max_file_kb")]
    pub max_file_size_kb: u64,
    /// Lines shown before and after each keyword match.
    #[serde(default = "default_jit_context_lines")]
    pub context_lines: usize,
    #[serde(default = "default_jit_matches")]
    pub max_matches_per_file: usize,
    #[serde(default = "default_jit_snippet_chars")]
    pub snippet_chars: usize,
    /// Directory names skipped while resolving globs from the prompt.
    #[serde(default = "default_map_exclude")]
    pub exclude: Vec<String>,
}

fn default_jit_max_tokens() -> usize {
    500
}

fn default_jit_max_files() -> usize {
    3
}

fn default_jit_max_file_kb() -> u64 {
    50
}

fn default_jit_context_lines() -> usize {
    3
}

fn default_jit_matches() -> usize {
    3
}

fn default_jit_snippet_chars() -> usize {
    200
}

impl Default for JitContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tokens: default_jit_max_tokens(),
            max_files: default_jit_max_files(),
            max_file_size_kb: default_jit_max_file_kb(),
            context_lines: default_jit_context_lines(),
            max_matches_per_file: default_jit_matches(),
            snippet_chars: default_jit_snippet_chars(),
            exclude: default_map_exclude(),
        }
    }
}

/// A tool the environment check requires, with an optional version
/// constraint (`>=3.12`, `>18`, `=1.2.0`).
///
/// Written either as `"python3:>=3.12"` or as a map with `name` and `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredTool {
    Short(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl RequiredTool {
    /// `(name, version requirement)`.
    pub fn requirement(&self) -> (&str, Option<&str>) {
        match self {
            RequiredTool::Short(spec) => match spec.split_once(':') {
                Some((name, version)) => (name.trim(), Some(version.trim())),
                None => (spec.trim(), None),
            },
            RequiredTool::Full { name, version } => (name.trim(), version.as_deref()),
        }
    }
}

/// Tools and environment variables checked at session start. Both lists
/// are empty by default, which turns the check off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvCheckConfig {
    #[serde(default)]
    pub required_tools: Vec<RequiredTool>,
    #[serde(default)]
    pub required_env_vars: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_commands: Vec<DangerousPattern>,
    #[serde(default)]
    pub shellcheck: ShellcheckConfig,
    #[serde(default = "default_validators")]
    pub validators: Vec<ValidatorConfig>,
    #[serde(default)]
    pub codebase_map: CodebaseMapConfig,
    #[serde(default)]
    pub session_context: SessionContextConfig,
    #[serde(default)]
    pub self_review: SelfReviewConfig,
    #[serde(default)]
    pub jit_context: JitContextConfig,
    #[serde(default)]
    pub env_check: EnvCheckConfig,
    /// Append one line per hook invocation to `logs/ccx-hooks.jsonl`.
    #[serde(default = "default_true")]
    pub log_invocations: bool,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            dangerous_commands: default_dangerous_patterns(),
            shellcheck: ShellcheckConfig::default(),
            validators: default_validators(),
            codebase_map: CodebaseMapConfig::default(),
            session_context: SessionContextConfig::default(),
            self_review: SelfReviewConfig::default(),
            jit_context: JitContextConfig::default(),
            env_check: EnvCheckConfig::default(),
            log_invocations: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CleanupSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Overrides `~/Documents/claude-archives`. A dated subdirectory is
    /// created per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_root: Option<PathBuf>,
    #[serde(default = "default_archive_dirs")]
    pub archive_dirs: Vec<String>,
    #[serde(default = "default_delete_only_dirs")]
    pub delete_only_dirs: Vec<String>,
    #[serde(default = "default_temp_patterns")]
    pub temp_patterns: Vec<String>,
}

fn default_retention_days() -> u32 {
    7
}

fn default_archive_dirs() -> Vec<String> {
    vec!["projects".to_string(), "transcripts".to_string()]
}

fn default_delete_only_dirs() -> Vec<String> {
    ["plugins", "debug", "shell-snapshots", "file-history", "logs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_temp_patterns() -> Vec<String> {
    ["paste-cache", "*.backup*", ".DS_Store"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            archive_root: None,
            archive_dirs: default_archive_dirs(),
            delete_only_dirs: default_delete_only_dirs(),
            temp_patterns: default_temp_patterns(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
    #[serde(default)]
    pub reward_weights: RewardWeights,
}

fn default_max_context_messages() -> usize {
    50
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            max_context_messages: default_max_context_messages(),
            reward_weights: RewardWeights::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub explorer: ExplorerConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub cleanup: CleanupSettings,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

impl Config {
    /// Load `<claude_dir>/ccx.yaml`. A missing file yields the defaults.
    pub fn load(claude_dir: &Path) -> Result<Self> {
        let path = paths::config_path(claude_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, claude_dir: &Path) -> Result<()> {
        let path = paths::config_path(claude_dir);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Transcripts directory after applying the explorer override.
    pub fn transcripts_dir(&self, claude_dir: &Path) -> PathBuf {
        self.explorer
            .transcripts_dir
            .clone()
            .unwrap_or_else(|| paths::transcripts_dir(claude_dir))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        for p in &self.hooks.dangerous_commands {
            if p.pattern.trim().is_empty() {
                warn(
                    WarnLevel::Error,
                    "hooks.dangerous_commands has an empty pattern (it would block every command)"
                        .to_string(),
                );
            } else if let Err(e) = Regex::new(&p.pattern) {
                warn(
                    WarnLevel::Error,
                    format!("hooks.dangerous_commands pattern '{}' is invalid: {e}", p.pattern),
                );
            }
        }

        if !SHELLCHECK_SEVERITIES.contains(&self.hooks.shellcheck.severity.as_str()) {
            warn(
                WarnLevel::Error,
                format!(
                    "hooks.shellcheck.severity '{}' is not one of: {}",
                    self.hooks.shellcheck.severity,
                    SHELLCHECK_SEVERITIES.join(", ")
                ),
            );
        }

        let mut names = HashSet::new();
        for v in &self.hooks.validators {
            if !names.insert(v.name.as_str()) {
                warn(
                    WarnLevel::Warning,
                    format!("validator '{}' is defined more than once", v.name),
                );
            }
            if v.command.trim().is_empty() {
                warn(
                    WarnLevel::Warning,
                    format!("validator '{}' has an empty command", v.name),
                );
            }
            if v.extensions.is_empty() {
                warn(
                    WarnLevel::Warning,
                    format!("validator '{}' has no extensions and never runs", v.name),
                );
            }
            for ext in &v.extensions {
                if !ext.starts_with('.') {
                    warn(
                        WarnLevel::Warning,
                        format!(
                            "validator '{}' extension '{ext}' should start with '.'",
                            v.name
                        ),
                    );
                }
            }
            if v.timeout_seconds == 0 {
                warn(
                    WarnLevel::Warning,
                    format!("validator '{}' has timeout_seconds=0 (no timeout)", v.name),
                );
            }
        }

        if self.hooks.codebase_map.max_depth == 0 {
            warn(
                WarnLevel::Warning,
                "hooks.codebase_map.max_depth is 0; the map will be empty".to_string(),
            );
        }

        if self.hooks.jit_context.enabled && self.hooks.jit_context.max_tokens == 0 {
            warn(
                WarnLevel::Warning,
                "hooks.jit_context.max_tokens is 0; no context will be added".to_string(),
            );
        }

        for tool in &self.hooks.env_check.required_tools {
            let (name, version) = tool.requirement();
            if name.is_empty() {
                warn(
                    WarnLevel::Error,
                    "hooks.env_check.required_tools has an entry without a name".to_string(),
                );
            }
            if let Some(v) = version {
                if crate::hooks::env_check::parse_requirement(v).is_none() {
                    warn(
                        WarnLevel::Warning,
                        format!("hooks.env_check version '{v}' for '{name}' is not a version"),
                    );
                }
            }
        }

        if self.cleanup.retention_days == 0 {
            warn(
                WarnLevel::Warning,
                "cleanup.retention_days is 0; every item counts as old".to_string(),
            );
        }

        if self.dataset.max_context_messages == 0 {
            warn(
                WarnLevel::Warning,
                "dataset.max_context_messages is 0; rows will carry no context".to_string(),
            );
        }

        if self.dataset.reward_weights.total() <= 0.0 {
            warn(
                WarnLevel::Warning,
                "dataset.reward_weights sum to 0; every trajectory scores 0.5".to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
