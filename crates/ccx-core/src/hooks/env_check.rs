use crate::config::{EnvCheckConfig, WarnLevel};
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use crate::hooks::runner::run_with_timeout;
use regex::Regex;
use serde::Serialize;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VersionOp {
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = ">")]
    Above,
    #[serde(rename = "=")]
    Exactly,
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").unwrap())
}

fn version_in_output_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)").unwrap())
}

/// `major.minor[.patch]` at the start of `s`, after an optional `v`.
pub fn try_parse_version(s: &str) -> Option<Vec<u64>> {
    let caps = version_re().captures(s.trim().trim_start_matches('v'))?;
    caps.iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().parse().ok())
        .collect()
}

/// Like [`try_parse_version`], with `[0]` for anything unparsable.
pub fn parse_version(s: &str) -> Vec<u64> {
    try_parse_version(s).unwrap_or_else(|| vec![0])
}

/// `>=3.12`, `>18.0`, `=1.2.3` or a bare version (meaning `>=`). `None`
/// when the version part doesn't parse.
pub fn parse_requirement(req: &str) -> Option<(VersionOp, Vec<u64>)> {
    let req = req.trim();
    let (op, rest) = if let Some(rest) = req.strip_prefix(">=") {
        (VersionOp::AtLeast, rest)
    } else if let Some(rest) = req.strip_prefix('>') {
        (VersionOp::Above, rest)
    } else if let Some(rest) = req.strip_prefix('=') {
        (VersionOp::Exactly, rest)
    } else {
        (VersionOp::AtLeast, req)
    };
    Some((op, try_parse_version(rest)?))
}

/// Compare with missing components as zero, so `3.12` equals `3.12.0`.
fn cmp_versions(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    let at = |v: &[u64], i: usize| v.get(i).copied().unwrap_or(0);
    (0..len)
        .map(|i| at(a, i).cmp(&at(b, i)))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

/// Whether `actual` satisfies `required`. An unparsable requirement is
/// never met.
pub fn compare_versions(actual: &str, required: &str) -> bool {
    let Some((op, want)) = parse_requirement(required) else {
        return false;
    };
    let ord = cmp_versions(&parse_version(actual), &want);
    match op {
        VersionOp::AtLeast => ord.is_ge(),
        VersionOp::Above => ord.is_gt(),
        VersionOp::Exactly => ord.is_eq(),
    }
}

fn version_command(tool: &str) -> Vec<&str> {
    match tool {
        "python" | "python3" => vec!["python3", "--version"],
        "go" => vec!["go", "version"],
        "rust" => vec!["rustc", "--version"],
        other => vec![other, "--version"],
    }
}

/// Version reported by the tool's version command, or its raw output when
/// no version number is in it. `None` when it can't be run or fails.
pub fn tool_version(tool: &str) -> Option<String> {
    let argv = version_command(tool);
    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);
    let out = run_with_timeout(cmd, Some(VERSION_TIMEOUT)).ok()?;
    if !out.success {
        return None;
    }
    let text = out.stdout.trim();
    match version_in_output_re().captures(text) {
        Some(caps) => Some(caps[1].to_string()),
        None => (!text.is_empty()).then(|| text.to_string()),
    }
}

/// One environment check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvCheckResult {
    pub name: String,
    pub passed: bool,
    pub severity: WarnLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl EnvCheckResult {
    fn pass(name: &str, message: String, version: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            severity: WarnLevel::Error,
            message,
            version,
        }
    }

    fn fail(name: &str, severity: WarnLevel, message: String, version: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            severity,
            message,
            version,
        }
    }
}

/// Whether `tool` is on PATH and, with `version_req`, new enough.
pub fn check_tool(tool: &str, version_req: Option<&str>) -> EnvCheckResult {
    if which::which(tool).is_err() {
        return EnvCheckResult::fail(
            tool,
            WarnLevel::Error,
            format!("Tool '{tool}' not found"),
            None,
        );
    }
    let version = tool_version(tool);
    let Some(req) = version_req.filter(|r| !r.trim().is_empty()) else {
        let message = match &version {
            Some(v) => format!("Tool '{tool}' is available (version {v})"),
            None => format!("Tool '{tool}' is available"),
        };
        return EnvCheckResult::pass(tool, message, version);
    };
    let Some(v) = version else {
        return EnvCheckResult::fail(
            tool,
            WarnLevel::Warning,
            format!("Tool '{tool}' found but version could not be determined"),
            None,
        );
    };
    if parse_requirement(req).is_none() {
        return EnvCheckResult::fail(
            tool,
            WarnLevel::Warning,
            format!("Tool '{tool}' has unparsable version requirement {req}"),
            Some(v),
        );
    }
    if compare_versions(&v, req) {
        let message = format!("Tool '{tool}' version {v} meets requirement {req}");
        EnvCheckResult::pass(tool, message, Some(v))
    } else {
        EnvCheckResult::fail(
            tool,
            WarnLevel::Error,
            format!("Tool '{tool}' version {v} does not meet requirement {req}"),
            Some(v),
        )
    }
}

/// Set and non-empty.
pub fn check_env_var(name: &str) -> EnvCheckResult {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => {
            EnvCheckResult::pass(name, format!("Environment variable '{name}' is set"), None)
        }
        _ => EnvCheckResult::fail(
            name,
            WarnLevel::Error,
            format!("Environment variable '{name}' not set"),
            None,
        ),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvReport {
    pub checks: Vec<EnvCheckResult>,
}

impl EnvReport {
    /// No failed check of error severity.
    pub fn success(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| !c.passed && c.severity == WarnLevel::Error)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EnvCheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Tools first, then environment variables, in config order.
pub fn validate_environment(config: &EnvCheckConfig) -> EnvReport {
    let tools = config.required_tools.iter().map(|t| {
        let (name, version) = t.requirement();
        check_tool(name, version)
    });
    let vars = config.required_env_vars.iter().map(|v| check_env_var(v));
    EnvReport {
        checks: tools.chain(vars).collect(),
    }
}

/// Reports missing tools and environment variables at session start.
pub struct EnvCheck {
    config: EnvCheckConfig,
}

impl EnvCheck {
    pub fn new(config: EnvCheckConfig) -> Self {
        Self { config }
    }
}

impl HookHandler for EnvCheck {
    fn name(&self) -> &'static str {
        "env_check"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::SessionStart]
    }

    fn description(&self) -> &'static str {
        "Check required tools, tool versions and environment variables at session start"
    }

    fn handle(&self, event: HookEvent, _payload: &HookPayload) -> Result<HookOutcome> {
        if self.config.required_tools.is_empty() && self.config.required_env_vars.is_empty() {
            return Ok(HookOutcome::Allow);
        }
        let report = validate_environment(&self.config);
        let lines: Vec<String> = report
            .failures()
            .map(|c| {
                let level = match c.severity {
                    WarnLevel::Error => "error",
                    WarnLevel::Warning => "warning",
                };
                format!("- [{level}] {}", c.message)
            })
            .collect();
        if lines.is_empty() {
            return Ok(HookOutcome::Allow);
        }
        Ok(HookOutcome::Context {
            event,
            text: format!("Environment check found problems:\n{}", lines.join("\n")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequiredTool;

    #[test]
    fn parses_versions() {
        assert_eq!(parse_version("3.12.1"), vec![3, 12, 1]);
        assert_eq!(parse_version("v18.2"), vec![18, 2]);
        assert_eq!(parse_version("latest"), vec![0]);
        assert_eq!(parse_version("18"), vec![0]);
        assert_eq!(
            parse_requirement(">= 3.12"),
            Some((VersionOp::AtLeast, vec![3, 12]))
        );
        assert_eq!(parse_requirement(">18.0"), Some((VersionOp::Above, vec![18, 0])));
        assert_eq!(
            parse_requirement("=1.2.3"),
            Some((VersionOp::Exactly, vec![1, 2, 3]))
        );
        assert_eq!(parse_requirement("2.0"), Some((VersionOp::AtLeast, vec![2, 0])));
        assert_eq!(parse_requirement(">=latest"), None);
    }

    #[test]
    fn compares_versions() {
        assert!(compare_versions("3.12.0", ">=3.12"));
        assert!(compare_versions("3.13", ">=3.12.4"));
        assert!(!compare_versions("3.11.9", ">=3.12"));
        assert!(compare_versions("v20.1.0", ">18.0"));
        assert!(!compare_versions("18.0.0", ">18.0"));
        assert!(compare_versions("1.2", "=1.2.0"));
        assert!(!compare_versions("1.2.1", "=1.2"));
        assert!(!compare_versions("9.9", ">=latest"));
    }

    #[test]
    fn missing_tool_and_env_var_fail_as_errors() {
        let tool = check_tool("ccx-definitely-not-a-tool", None);
        assert!(!tool.passed);
        assert_eq!(tool.severity, WarnLevel::Error);
        assert_eq!(tool.message, "Tool 'ccx-definitely-not-a-tool' not found");

        let var = check_env_var("CCX_TEST_SURELY_UNSET_VAR");
        assert!(!var.passed);
        assert_eq!(var.message, "Environment variable 'CCX_TEST_SURELY_UNSET_VAR' not set");
    }

    #[test]
    fn env_var_present() {
        assert!(check_env_var("PATH").passed);
    }

    #[cfg(unix)]
    #[test]
    fn version_requirement_checked_against_tool_output() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("fake-tool");
        std::fs::write(&tool, "#!/bin/sh\necho \"fake-tool v2.5.1 (build abc)\"\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        let tool = tool.to_str().unwrap();

        let ok = check_tool(tool, Some(">=2.5"));
        assert!(ok.passed, "{}", ok.message);
        assert_eq!(ok.version.as_deref(), Some("2.5.1"));
        assert!(ok.message.ends_with("version 2.5.1 meets requirement >=2.5"));

        let old = check_tool(tool, Some(">2.5.1"));
        assert!(!old.passed);
        assert_eq!(old.severity, WarnLevel::Error);

        let plain = check_tool(tool, None);
        assert!(plain.passed);
        assert!(plain.message.ends_with("is available (version 2.5.1)"));
    }

    #[test]
    fn report_success_ignores_warnings() {
        let report = EnvReport {
            checks: vec![EnvCheckResult::fail(
                "x",
                WarnLevel::Warning,
                "unknown version".to_string(),
                None,
            )],
        };
        assert!(report.success());
        let config = EnvCheckConfig {
            required_tools: vec![RequiredTool::Short("ccx-definitely-not-a-tool".to_string())],
            required_env_vars: vec![],
        };
        assert!(!validate_environment(&config).success());
    }

    #[test]
    fn handler_reports_only_failures() {
        let empty = EnvCheck::new(EnvCheckConfig::default());
        assert_eq!(
            empty.handle(HookEvent::SessionStart, &HookPayload::default()).unwrap(),
            HookOutcome::Allow
        );

        let check = EnvCheck::new(EnvCheckConfig {
            required_tools: vec![RequiredTool::Full {
                name: "ccx-definitely-not-a-tool".to_string(),
                version: None,
            }],
            required_env_vars: vec!["PATH".to_string()],
        });
        match check.handle(HookEvent::SessionStart, &HookPayload::default()).unwrap() {
            HookOutcome::Context { event, text } => {
                assert_eq!(event, HookEvent::SessionStart);
                assert_eq!(
                    text,
                    "Environment check found problems:\n\
                     - [error] Tool 'ccx-definitely-not-a-tool' not found"
                );
            }
            other => panic!("expected context, got {other:?}"),
        }
    }
}
