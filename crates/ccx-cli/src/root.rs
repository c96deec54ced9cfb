use anyhow::Context;
use std::path::{Path, PathBuf};

/// Resolve the Claude data directory.
///
/// Priority:
/// 1. `--claude-dir` flag / `CCX_CLAUDE_DIR` env var (passed in as `explicit`)
/// 2. `$HOME/.claude`
///
/// The directory is not required to exist; commands that read from it
/// report the missing piece themselves.
pub fn resolve_claude_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    ccx_core::paths::default_claude_dir().context("cannot locate the Claude data directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_dir_wins() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_claude_dir(Some(dir.path())).unwrap(), dir.path());
    }

    #[test]
    fn default_ends_in_dot_claude() {
        if let Ok(dir) = resolve_claude_dir(None) {
            assert!(dir.ends_with(".claude"));
        }
    }
}
