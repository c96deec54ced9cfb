use crate::config::DangerousPattern;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use regex::Regex;
use tracing::warn;

/// Blocks Bash commands matching any configured pattern.
pub struct DangerousCommandGuard {
    patterns: Vec<(Regex, Option<String>)>,
}

impl DangerousCommandGuard {
    /// Empty or unparsable patterns are skipped with a warning; the rest
    /// still guard. `ccx config validate` reports them as errors.
    pub fn new(patterns: &[DangerousPattern]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                if p.pattern.trim().is_empty() {
                    warn!("skipping empty dangerous-command pattern");
                    return None;
                }
                match Regex::new(&p.pattern) {
                    Ok(re) => Some((re, p.reason.clone())),
                    Err(e) => {
                        warn!(
                            pattern = %p.pattern,
                            error = %e,
                            "skipping invalid dangerous-command pattern"
                        );
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Reason of the first pattern matching `command`.
    pub fn check(&self, command: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(command))
            .map(|(re, reason)| {
                reason
                    .clone()
                    .unwrap_or_else(|| format!("matches '{}'", re.as_str()))
            })
    }
}

impl HookHandler for DangerousCommandGuard {
    fn name(&self) -> &'static str {
        "dangerous"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::PreToolUse]
    }

    fn description(&self) -> &'static str {
        "Block destructive Bash commands (rm -rf, mkfs, fork bombs, raw device writes)"
    }

    fn handle(&self, _event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !payload.is_tool("Bash") {
            return Ok(HookOutcome::Allow);
        }
        let Some(command) = payload.command() else {
            return Ok(HookOutcome::Allow);
        };
        Ok(match self.check(command) {
            Some(reason) => HookOutcome::block(
                format!("Dangerous command blocked: {command}"),
                vec![format!("Security: {reason}")],
            ),
            None => HookOutcome::Allow,
        })
    }
}
