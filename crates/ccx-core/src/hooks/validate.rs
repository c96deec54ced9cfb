use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use crate::hooks::runner::run_with_timeout;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

const EDIT_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit"];

/// Runs the linters configured for an edited file's extension.
pub struct FileValidator {
    validators: Vec<ValidatorConfig>,
}

/// `.rs` for `src/main.rs`, lowercased. Empty when there is none.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Argument vector for `command` against `file`: `{file}` tokens are
/// substituted, otherwise the path goes last.
pub fn build_argv(command: &str, file: &Path) -> Vec<String> {
    let file = file.to_string_lossy();
    let mut substituted = false;
    let mut argv: Vec<String> = command
        .split_whitespace()
        .map(|tok| {
            if tok.contains("{file}") {
                substituted = true;
                tok.replace("{file}", &file)
            } else {
                tok.to_string()
            }
        })
        .collect();
    if !substituted {
        argv.push(file.into_owned());
    }
    argv
}

impl FileValidator {
    pub fn new(validators: Vec<ValidatorConfig>) -> Self {
        Self { validators }
    }

    pub fn matching(&self, path: &Path) -> impl Iterator<Item = &ValidatorConfig> {
        let ext = dotted_extension(path);
        self.validators
            .iter()
            .filter(move |v| {
                !ext.is_empty() && v.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
            })
    }

    /// Run every matching validator. Returns `(name, output)` per failure.
    pub fn validate(&self, path: &Path, cwd: Option<&Path>) -> Result<Vec<(String, String)>> {
        let mut failures = Vec::new();
        for v in self.matching(path) {
            let argv = build_argv(&v.command, path);
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            let Ok(program) = which::which(program) else {
                debug!(validator = %v.name, "validator not on PATH, skipping");
                continue;
            };

            let mut cmd = Command::new(program);
            cmd.args(args);
            if let Some(dir) = cwd.filter(|d| d.is_dir()) {
                cmd.current_dir(dir);
            }
            let timeout = (v.timeout_seconds > 0)
                .then(|| Duration::from_secs(u64::from(v.timeout_seconds)));
            let output = run_with_timeout(cmd, timeout)?;
            if !output.success {
                failures.push((v.name.clone(), output.combined()));
            }
        }
        Ok(failures)
    }
}

impl HookHandler for FileValidator {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::PostToolUse]
    }

    fn description(&self) -> &'static str {
        "Run linters on edited files, chosen by file extension"
    }

    fn handle(&self, _event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !EDIT_TOOLS.iter().any(|t| payload.is_tool(t)) {
            return Ok(HookOutcome::Allow);
        }
        let Some(file) = payload.file_path() else {
            return Ok(HookOutcome::Allow);
        };
        let mut path = PathBuf::from(file);
        if path.is_relative() {
            if let Some(cwd) = &payload.cwd {
                path = cwd.join(path);
            }
        }
        if !path.is_file() {
            return Ok(HookOutcome::Allow);
        }

        let failures = self.validate(&path, payload.cwd.as_deref())?;
        if failures.is_empty() {
            return Ok(HookOutcome::Allow);
        }
        let names: Vec<&str> = failures.iter().map(|(n, _)| n.as_str()).collect();
        let reason = format!("{} reported problems in {}", names.join(", "), path.display());
        let hints = failures
            .iter()
            .flat_map(|(_, out)| out.lines())
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        Ok(HookOutcome::block(reason, hints))
    }
}
