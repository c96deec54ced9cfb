use crate::error::{CcxError, Result};
use crate::hooks::log::{self, HookInvocation};
use crate::hooks::payload::HookPayload;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

// ── HookEvent ───────────────────────────────────────────────────────────────

/// Claude Code lifecycle events a hook can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Notification,
    Stop,
    SubagentStop,
    PreCompact,
    SessionStart,
    SessionEnd,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl HookEvent {
    pub const ALL: &'static [HookEvent] = &[
        Self::PreToolUse,
        Self::PostToolUse,
        Self::UserPromptSubmit,
        Self::Notification,
        Self::Stop,
        Self::SubagentStop,
        Self::PreCompact,
        Self::SessionStart,
        Self::SessionEnd,
    ];

    /// Events whose stdout JSON may carry `additionalContext`.
    pub fn accepts_context(&self) -> bool {
        matches!(
            self,
            Self::SessionStart | Self::UserPromptSubmit | Self::PostToolUse
        )
    }
}

impl FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.to_string() == s)
            .ok_or_else(|| format!("unknown hook event '{s}'"))
    }
}

// ── HookOutcome ─────────────────────────────────────────────────────────────

/// What a handler decided.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HookOutcome {
    #[default]
    Allow,
    /// Refuse the tool call. Shown to the model on stderr.
    Block { reason: String, hints: Vec<String> },
    /// Extra text for the model's context.
    Context { event: HookEvent, text: String },
    /// Non-blocking notice written to stderr.
    Warn { message: String },
}

impl HookOutcome {
    pub fn block(reason: impl Into<String>, hints: Vec<String>) -> Self {
        Self::Block {
            reason: reason.into(),
            hints,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block { .. } => "block",
            Self::Context { .. } => "context",
            Self::Warn { .. } => "warn",
        }
    }
}

/// stdout JSON understood by Claude Code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    pub hook_event_name: String,
    pub additional_context: String,
}

// ── HookHandler trait ───────────────────────────────────────────────────────

pub trait HookHandler {
    fn name(&self) -> &'static str;

    fn events(&self) -> &'static [HookEvent];

    /// One line for `ccx hook list`.
    fn description(&self) -> &'static str;

    fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookOutcome>;
}

// ── HookReport ──────────────────────────────────────────────────────────────

/// Outcomes of one dispatch, in handler order.
#[derive(Debug, Clone, Default)]
pub struct HookReport {
    pub event: Option<HookEvent>,
    pub outcomes: Vec<(String, HookOutcome)>,
}

impl HookReport {
    pub fn blocked(&self) -> Option<(&str, &[String])> {
        self.outcomes.iter().find_map(|(_, o)| match o {
            HookOutcome::Block { reason, hints } => Some((reason.as_str(), hints.as_slice())),
            _ => None,
        })
    }

    /// Context from every handler, joined by blank lines.
    pub fn context(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .outcomes
            .iter()
            .filter_map(|(_, o)| match o {
                HookOutcome::Context { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|(_, o)| match o {
                HookOutcome::Warn { message } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 2 when blocked, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.blocked().is_some() {
            2
        } else {
            0
        }
    }

    pub fn output(&self) -> Option<HookOutput> {
        let event = self.event.filter(HookEvent::accepts_context)?;
        let text = self.context()?;
        Some(HookOutput {
            hook_specific_output: Some(HookSpecificOutput {
                hook_event_name: event.to_string(),
                additional_context: text,
            }),
        })
    }

    /// Everything destined for stderr: the block message, then warnings.
    pub fn stderr_text(&self) -> String {
        let mut lines = Vec::new();
        if let Some((reason, hints)) = self.blocked() {
            lines.push(format!("[Error] {reason}"));
            if !hints.is_empty() {
                lines.push("  Issues:".to_string());
                lines.extend(hints.iter().map(|h| format!("    - {h}")));
            }
        }
        lines.extend(self.warnings().into_iter().map(str::to_string));
        lines.join("\n")
    }
}

// ── HookRegistry ────────────────────────────────────────────────────────────

/// Registered handlers, dispatched in registration order.
#[derive(Default)]
pub struct HookRegistry {
    handlers: Vec<Box<dyn HookHandler>>,
    log_path: Option<PathBuf>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an invocation line per handler run to `path`.
    pub fn with_log(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    pub fn register(&mut self, handler: Box<dyn HookHandler>) {
        debug!(handler = handler.name(), "hook handler registered");
        self.handlers.push(handler);
    }

    pub fn handlers(&self) -> impl Iterator<Item = &dyn HookHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler subscribed to `event`. The first Block ends the
    /// dispatch. Handler errors are logged and count as Allow.
    pub fn dispatch(&self, event: HookEvent, payload: &HookPayload) -> HookReport {
        let mut report = HookReport {
            event: Some(event),
            outcomes: Vec::new(),
        };
        for handler in self.handlers.iter().filter(|h| h.events().contains(&event)) {
            let outcome = self.invoke(handler.as_ref(), event, payload);
            let stop = matches!(outcome, HookOutcome::Block { .. });
            report.outcomes.push((handler.name().to_string(), outcome));
            if stop {
                break;
            }
        }
        report
    }

    /// Run a single handler by name. The event comes from the payload, or
    /// the handler's first subscribed event when the payload names none.
    pub fn run_one(&self, name: &str, payload: &HookPayload) -> Result<HookReport> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.name() == name)
            .ok_or_else(|| CcxError::UnknownHook(name.to_string()))?;
        let event = payload
            .event()
            .or_else(|| handler.events().first().copied());
        let Some(event) = event else {
            return Ok(HookReport::default());
        };
        let outcome = if handler.events().contains(&event) {
            self.invoke(handler.as_ref(), event, payload)
        } else {
            debug!(handler = name, event = %event, "handler not subscribed to event");
            HookOutcome::Allow
        };
        Ok(HookReport {
            event: Some(event),
            outcomes: vec![(name.to_string(), outcome)],
        })
    }

    fn invoke(
        &self,
        handler: &dyn HookHandler,
        event: HookEvent,
        payload: &HookPayload,
    ) -> HookOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        let (outcome, label) = match handler.handle(event, payload) {
            Ok(o) => {
                let label = o.label();
                (o, label)
            }
            Err(e) => {
                warn!(handler = handler.name(), event = %event, error = %e, "hook handler failed");
                (HookOutcome::Allow, "error")
            }
        };
        if let Some(path) = &self.log_path {
            let mut entry = HookInvocation::new(handler.name(), started_at, start.elapsed(), label);
            entry.event = Some(event.to_string());
            entry.tool = payload.tool_name.clone();
            entry.session_id = payload.session_id.clone();
            log::record(path, &entry);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        outcome: HookOutcome,
    }

    impl HookHandler for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        fn events(&self) -> &'static [HookEvent] {
            &[HookEvent::PreToolUse, HookEvent::SessionStart]
        }
        fn description(&self) -> &'static str {
            "test"
        }
        fn handle(&self, _: HookEvent, _: &HookPayload) -> Result<HookOutcome> {
            Ok(self.outcome.clone())
        }
    }

    struct Failing;

    impl HookHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn events(&self) -> &'static [HookEvent] {
            &[HookEvent::PreToolUse]
        }
        fn description(&self) -> &'static str {
            "always errors"
        }
        fn handle(&self, _: HookEvent, _: &HookPayload) -> Result<HookOutcome> {
            Err(CcxError::Search("boom".to_string()))
        }
    }

    fn fixed(name: &'static str, outcome: HookOutcome) -> Box<dyn HookHandler> {
        Box::new(Fixed { name, outcome })
    }

    fn ctx(text: &str) -> HookOutcome {
        HookOutcome::Context {
            event: HookEvent::SessionStart,
            text: text.to_string(),
        }
    }

    #[test]
    fn event_names_round_trip() {
        for event in HookEvent::ALL {
            assert_eq!(event.to_string().parse::<HookEvent>().unwrap(), *event);
        }
        assert!("PreToolCall".parse::<HookEvent>().is_err());
    }

    #[test]
    fn first_block_wins() {
        let mut reg = HookRegistry::new();
        reg.register(fixed("a", HookOutcome::Allow));
        reg.register(fixed("b", HookOutcome::block("nope", vec!["hint".to_string()])));
        reg.register(fixed("c", HookOutcome::block("later", vec![])));

        let report = reg.dispatch(HookEvent::PreToolUse, &HookPayload::default());
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.blocked().unwrap().0, "nope");
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.stderr_text(), "[Error] nope\n  Issues:\n    - hint");
    }

    #[test]
    fn contexts_concatenate_into_output() {
        let mut reg = HookRegistry::new();
        reg.register(fixed("a", ctx("one")));
        reg.register(fixed("b", ctx("two")));
        let report = reg.dispatch(HookEvent::SessionStart, &HookPayload::default());
        assert_eq!(report.exit_code(), 0);
        let out = serde_json::to_value(report.output().unwrap()).unwrap();
        assert_eq!(out["hookSpecificOutput"]["hookEventName"], "SessionStart");
        assert_eq!(out["hookSpecificOutput"]["additionalContext"], "one\n\ntwo");
    }

    #[test]
    fn context_dropped_for_events_without_context() {
        let mut reg = HookRegistry::new();
        reg.register(fixed("a", ctx("one")));
        let report = reg.dispatch(HookEvent::PreToolUse, &HookPayload::default());
        assert_eq!(report.context().as_deref(), Some("one"));
        assert!(report.output().is_none());
    }

    #[test]
    fn unsubscribed_events_skip_handlers() {
        let mut reg = HookRegistry::new();
        reg.register(fixed("a", HookOutcome::block("x", vec![])));
        let report = reg.dispatch(HookEvent::Stop, &HookPayload::default());
        assert!(report.outcomes.is_empty());
        assert!(report.output().is_none());
    }

    #[test]
    fn handler_errors_allow_and_are_logged() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("hooks.jsonl");
        let mut reg = HookRegistry::new().with_log(log_path.clone());
        reg.register(Box::new(Failing));
        let payload = HookPayload {
            tool_name: Some("Bash".to_string()),
            ..Default::default()
        };
        let report = reg.dispatch(HookEvent::PreToolUse, &payload);
        assert_eq!(report.outcomes[0].1, HookOutcome::Allow);

        let line: HookInvocation =
            serde_json::from_str(std::fs::read_to_string(&log_path).unwrap().trim()).unwrap();
        assert_eq!(line.outcome, "error");
        assert_eq!(line.tool.as_deref(), Some("Bash"));
        assert_eq!(line.event.as_deref(), Some("PreToolUse"));
    }

    #[test]
    fn run_one_by_name() {
        let mut reg = HookRegistry::new();
        reg.register(fixed("a", ctx("hello")));
        let report = reg.run_one("a", &HookPayload::default()).unwrap();
        assert_eq!(report.event, Some(HookEvent::PreToolUse));
        assert!(matches!(
            reg.run_one("zzz", &HookPayload::default()),
            Err(CcxError::UnknownHook(_))
        ));
    }
}
