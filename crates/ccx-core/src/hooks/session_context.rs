use crate::config::SessionContextConfig;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use crate::hooks::runner::run_with_timeout;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// stdout of `git <args>` in `cwd`, trimmed. `None` when git is missing,
/// fails or prints nothing.
fn git(cwd: &Path, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(cwd);
    let out = run_with_timeout(cmd, Some(GIT_TIMEOUT)).ok()?;
    let text = out.stdout.trim();
    (out.success && !text.is_empty()).then(|| text.to_string())
}

/// Git branch, recent commits and working-tree state at session start.
pub struct SessionContext {
    config: SessionContextConfig,
}

impl SessionContext {
    pub fn new(config: SessionContextConfig) -> Self {
        Self { config }
    }

    pub fn lines(&self, cwd: &Path, source: Option<&str>) -> Vec<String> {
        let mut lines = Vec::new();
        if self.config.git_branch {
            if let Some(branch) = git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]) {
                lines.push(format!("Git branch: {branch}"));
            }
        }
        if self.config.recent_commits {
            if let Some(log) = git(cwd, &["log", "-3", "--oneline"]) {
                let commits: Vec<&str> = log.lines().collect();
                lines.push(format!("Recent commits: {}", commits.join("; ")));
            }
        }
        if self.config.uncommitted_count {
            // Clean trees print nothing, which `git` maps to None.
            if git(cwd, &["rev-parse", "--is-inside-work-tree"]).is_some() {
                let count = git(cwd, &["status", "--porcelain"])
                    .map(|s| s.lines().count())
                    .unwrap_or(0);
                lines.push(format!("Uncommitted files: {count}"));
            }
        }
        if self.config.resume_source {
            if let Some(src) = source.filter(|s| !s.is_empty() && *s != "startup") {
                lines.push(format!("Session resumed via: {src}"));
            }
        }
        lines
    }
}

impl HookHandler for SessionContext {
    fn name(&self) -> &'static str {
        "session_context"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::SessionStart]
    }

    fn description(&self) -> &'static str {
        "Add git branch, recent commits and uncommitted file count at session start"
    }

    fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        let Some(cwd) = payload.cwd.as_deref().filter(|p| p.is_dir()) else {
            return Ok(HookOutcome::Allow);
        };
        let lines = self.lines(cwd, payload.source.as_deref());
        if lines.is_empty() {
            return Ok(HookOutcome::Allow);
        }
        let body: Vec<String> = lines.iter().map(|l| format!("- {l}")).collect();
        Ok(HookOutcome::Context {
            event,
            text: format!("**Session Context:**\n{}", body.join("\n")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    fn sh(dir: &Path, script: &str) {
        let status = Command::new("sh").arg("-c").arg(script).current_dir(dir).status().unwrap();
        assert!(status.success(), "script failed: {script}");
    }

    #[test]
    fn resume_source_only_outside_git() {
        let dir = TempDir::new().unwrap();
        let ctx = SessionContext::new(SessionContextConfig::default());
        let payload = HookPayload {
            cwd: Some(dir.path().to_path_buf()),
            source: Some("resume".to_string()),
            ..Default::default()
        };
        match ctx.handle(HookEvent::SessionStart, &payload).unwrap() {
            HookOutcome::Context { text, .. } => {
                assert_eq!(text, "**Session Context:**\n- Session resumed via: resume");
            }
            other => panic!("expected context, got {other:?}"),
        }
    }

    #[test]
    fn startup_outside_git_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = SessionContext::new(SessionContextConfig::default());
        assert!(ctx.lines(dir.path(), Some("startup")).is_empty());
    }

    #[test]
    fn reports_git_state() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        sh(
            dir.path(),
            "git init -q -b main \
             && git -c user.email=t@t -c user.name=t commit -q --allow-empty -m first \
             && git -c user.email=t@t -c user.name=t commit -q --allow-empty -m second \
             && touch a b",
        );
        let lines = SessionContext::new(SessionContextConfig::default()).lines(dir.path(), None);
        assert_eq!(lines[0], "Git branch: main");
        assert!(lines[1].starts_with("Recent commits: "));
        assert!(lines[1].contains("second;"));
        assert_eq!(lines[2], "Uncommitted files: 2");
        assert_eq!(lines.len(), 3);
    }
}
