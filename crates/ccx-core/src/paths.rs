use crate::error::{CcxError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants (relative to the Claude dir, usually ~/.claude)
// ---------------------------------------------------------------------------

pub const CLAUDE_DIR: &str = ".claude";
pub const PROJECTS_DIR: &str = "projects";
pub const TRANSCRIPTS_DIR: &str = "transcripts";
pub const SHELL_SNAPSHOTS_DIR: &str = "shell-snapshots";
pub const LOGS_DIR: &str = "logs";

pub const CONFIG_FILE: &str = "ccx.yaml";
pub const HOOK_LOG_FILE: &str = "logs/ccx-hooks.jsonl";
pub const SESSION_STATE_DIR: &str = "ccx/sessions";

pub const ARCHIVE_ROOT: &str = "Documents/claude-archives";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `$HOME/.claude`.
pub fn default_claude_dir() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(CcxError::HomeNotFound)?;
    Ok(home.join(CLAUDE_DIR))
}

/// `$HOME/Documents/claude-archives`.
pub fn default_archive_root() -> Result<PathBuf> {
    let home = home::home_dir().ok_or(CcxError::HomeNotFound)?;
    Ok(home.join(ARCHIVE_ROOT))
}

pub fn config_path(claude_dir: &Path) -> PathBuf {
    claude_dir.join(CONFIG_FILE)
}

pub fn projects_dir(claude_dir: &Path) -> PathBuf {
    claude_dir.join(PROJECTS_DIR)
}

pub fn transcripts_dir(claude_dir: &Path) -> PathBuf {
    claude_dir.join(TRANSCRIPTS_DIR)
}

pub fn hook_log_path(claude_dir: &Path) -> PathBuf {
    claude_dir.join(HOOK_LOG_FILE)
}

/// Marker file recording that `hook` already ran for `session_id`.
pub fn session_marker(claude_dir: &Path, session_id: &str, hook: &str) -> Result<PathBuf> {
    validate_session_id(session_id)?;
    Ok(claude_dir
        .join(SESSION_STATE_DIR)
        .join(format!("{session_id}.{hook}")))
}

// ---------------------------------------------------------------------------
// Session id validation
// ---------------------------------------------------------------------------

static SESSION_ID_RE: OnceLock<Regex> = OnceLock::new();

fn session_id_re() -> &'static Regex {
    SESSION_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 128 || !session_id_re().is_match(id) {
        return Err(CcxError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
