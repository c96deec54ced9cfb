use crate::config::ShellcheckConfig;
use crate::error::Result;
use crate::format::head_chars;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use crate::hooks::runner::run_with_timeout;
use serde::Deserialize;
use std::io::Write;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Lines prepended to the command before linting. Reported line numbers are
/// shifted back by this much.
const PRELUDE: &str = "#!/usr/bin/env bash\nset -euo pipefail\n\n";
const PRELUDE_LINES: i64 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ShellcheckIssue {
    #[serde(default)]
    pub line: i64,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

impl ShellcheckIssue {
    fn is_blocking(&self) -> bool {
        matches!(self.level.as_str(), "error" | "warning")
    }

    fn render(&self) -> String {
        let line = (self.line - PRELUDE_LINES).max(1);
        format!("Line {line} (SC{}): {}", self.code, self.message)
    }
}

/// Messages to block with, given shellcheck's JSON output. `None` means the
/// command passes: no issues, info only, or output that doesn't parse.
pub fn assess(stdout: &str) -> Option<Vec<String>> {
    let issues: Vec<ShellcheckIssue> = serde_json::from_str(stdout).ok()?;
    if !issues.iter().any(ShellcheckIssue::is_blocking) {
        return None;
    }
    let (blocking, rest): (Vec<_>, Vec<_>) = issues.iter().partition(|i| i.is_blocking());
    Some(blocking.iter().chain(rest.iter()).map(|i| i.render()).collect())
}

/// Lints Bash commands with shellcheck before they run.
pub struct ShellcheckGuard {
    config: ShellcheckConfig,
}

impl ShellcheckGuard {
    pub fn new(config: ShellcheckConfig) -> Self {
        Self { config }
    }

    fn run(&self, command: &str) -> Result<Option<Vec<String>>> {
        let Ok(program) = which::which("shellcheck") else {
            debug!("shellcheck not installed, skipping");
            return Ok(None);
        };

        let mut script = tempfile::Builder::new()
            .prefix("ccx-shellcheck-")
            .suffix(".sh")
            .tempfile()?;
        script.write_all(PRELUDE.as_bytes())?;
        script.write_all(command.as_bytes())?;
        script.flush()?;

        let mut cmd = Command::new(program);
        cmd.arg("--format=json")
            .arg(format!("--severity={}", self.config.severity));
        if !self.config.exclude.is_empty() {
            cmd.arg(format!("--exclude={}", self.config.exclude.join(",")));
        }
        cmd.arg(script.path());

        let timeout = Duration::from_secs(u64::from(self.config.timeout_seconds.max(1)));
        let output = run_with_timeout(cmd, Some(timeout))?;
        if output.timed_out {
            debug!("shellcheck timed out, allowing");
            return Ok(None);
        }
        Ok(assess(&output.stdout))
    }
}

impl HookHandler for ShellcheckGuard {
    fn name(&self) -> &'static str {
        "shellcheck"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::PreToolUse]
    }

    fn description(&self) -> &'static str {
        "Lint Bash commands with shellcheck; block on errors and warnings"
    }

    fn handle(&self, _event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !self.config.enabled || !payload.is_tool("Bash") {
            return Ok(HookOutcome::Allow);
        }
        let command = payload.command().unwrap_or_default();
        if command.trim().is_empty() {
            return Ok(HookOutcome::Allow);
        }
        let Some(messages) = self.run(command)? else {
            return Ok(HookOutcome::Allow);
        };

        let reason = format!(
            "shellcheck found {} issue(s)\n  Command: {}...",
            messages.len(),
            head_chars(command, 100)
        );
        let mut hints = messages;
        hints.push("Fix these issues before running the command".to_string());
        hints.push("Run 'shellcheck' manually for more details".to_string());
        Ok(HookOutcome::block(reason, hints))
    }
}
