//! Claude Code hook handlers and the registry that dispatches to them.
//!
//! A hook receives a JSON payload on stdin. Exit code 0 allows the action,
//! 2 blocks it and shows stderr to the model. Context for the model goes to
//! stdout as `hookSpecificOutput.additionalContext`.

pub mod codebase_map;
pub mod dangerous;
pub mod env_check;
pub mod jit_context;
pub mod log;
pub mod payload;
pub mod registry;
pub mod runner;
pub mod self_review;
pub mod session_context;
pub mod shellcheck;
pub mod validate;

pub use payload::HookPayload;
pub use registry::{HookEvent, HookHandler, HookOutcome, HookOutput, HookRegistry, HookReport};

use crate::config::HooksConfig;
use crate::paths;
use std::path::Path;

/// Registry with every built-in handler, in dispatch order: guards first,
/// then validators, then context providers.
///
/// Never fails: a bad handler setting disables that setting, not the hooks.
pub fn builtin_registry(config: &HooksConfig, claude_dir: &Path) -> HookRegistry {
    let mut registry = HookRegistry::new();
    if config.log_invocations {
        registry = registry.with_log(paths::hook_log_path(claude_dir));
    }
    registry.register(Box::new(dangerous::DangerousCommandGuard::new(
        &config.dangerous_commands,
    )));
    registry.register(Box::new(shellcheck::ShellcheckGuard::new(
        config.shellcheck.clone(),
    )));
    registry.register(Box::new(validate::FileValidator::new(
        config.validators.clone(),
    )));
    registry.register(Box::new(session_context::SessionContext::new(
        config.session_context.clone(),
    )));
    registry.register(Box::new(env_check::EnvCheck::new(
        config.env_check.clone(),
    )));
    registry.register(Box::new(codebase_map::CodebaseMap::new(
        config.codebase_map.clone(),
        claude_dir.to_path_buf(),
    )));
    registry.register(Box::new(self_review::SelfReview::new(
        config.self_review.clone(),
    )));
    registry.register(Box::new(jit_context::JitContext::new(
        config.jit_context.clone(),
    )));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn builtin_handlers_registered_in_order() {
        let dir = TempDir::new().unwrap();
        let reg = builtin_registry(&HooksConfig::default(), dir.path());
        assert_eq!(
            reg.handler_names(),
            vec![
                "dangerous",
                "shellcheck",
                "validate",
                "session_context",
                "env_check",
                "codebase_map",
                "self_review",
                "jit_context",
            ]
        );
    }

    #[test]
    fn dangerous_command_blocks_before_shellcheck_and_is_logged() {
        let dir = TempDir::new().unwrap();
        let reg = builtin_registry(&HooksConfig::default(), dir.path());
        let payload = HookPayload::from_json(
            &json!({
                "hook_event_name": "PreToolUse",
                "session_id": "s1",
                "tool_name": "Bash",
                "tool_input": { "command": "rm -rf /" }
            })
            .to_string(),
        )
        .unwrap();
        let report = reg.dispatch(HookEvent::PreToolUse, &payload);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(report.outcomes.len(), 1);

        let log = std::fs::read_to_string(paths::hook_log_path(dir.path())).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("\"hook\":\"dangerous\""));
    }

    #[test]
    fn bad_dangerous_pattern_keeps_registry_and_other_patterns() {
        let dir = TempDir::new().unwrap();
        let mut config = HooksConfig::default();
        config.dangerous_commands.insert(
            0,
            crate::config::DangerousPattern {
                pattern: "curl (".to_string(),
                reason: None,
            },
        );
        let reg = builtin_registry(&config, dir.path());
        assert_eq!(reg.handler_names().len(), 8);

        let payload = HookPayload {
            tool_name: Some("Bash".to_string()),
            tool_input: json!({ "command": "rm -rf /" }),
            ..Default::default()
        };
        assert_eq!(reg.dispatch(HookEvent::PreToolUse, &payload).exit_code(), 2);
    }

    #[test]
    fn logging_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let config = HooksConfig {
            log_invocations: false,
            ..Default::default()
        };
        let reg = builtin_registry(&config, dir.path());
        reg.dispatch(HookEvent::Notification, &HookPayload::default());
        let payload = HookPayload {
            tool_name: Some("Read".to_string()),
            ..Default::default()
        };
        reg.dispatch(HookEvent::PreToolUse, &payload);
        assert!(!paths::hook_log_path(dir.path()).exists());
    }
}
