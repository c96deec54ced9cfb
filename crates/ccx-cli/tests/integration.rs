#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn ccx(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ccx").unwrap();
    cmd.current_dir(dir.path())
        .env("CCX_CLAUDE_DIR", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn write_lines(path: &Path, lines: &[&str]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

/// Two transcripts: `s1` with a failed shell call, `s2` with only text.
fn seed_transcripts(dir: &TempDir) {
    let t = dir.path().join("transcripts");
    write_lines(
        &t.join("ses_s1.jsonl"),
        &[
            r#"{"type":"user","timestamp":"2025-01-15T10:00:00Z","content":"run the tests"}"#,
            r#"{"type":"tool_use","timestamp":"2025-01-15T10:00:05Z","tool_name":"run_shell_command","tool_input":{"command":"cargo test"}}"#,
            r#"{"type":"tool_result","timestamp":"2025-01-15T10:00:20Z","tool_name":"run_shell_command","is_error":true,"tool_output":{"error":"exit 101"}}"#,
            r#"{"type":"assistant","timestamp":"2025-01-15T10:01:00Z","content":"tests fail in parser"}"#,
        ],
    );
    write_lines(
        &t.join("ses_s2.jsonl"),
        &[
            r#"{"type":"user","timestamp":"2025-01-16T09:00:00Z","content":"explain lifetimes"}"#,
            r#"{"type":"assistant","timestamp":"2025-01-16T09:00:30Z","content":"a lifetime names a region"}"#,
        ],
    );
}

fn json_stdout(cmd: &mut Command) -> Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// ccx conv
// ---------------------------------------------------------------------------

#[test]
fn conv_list_shows_sessions() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    ccx(&dir)
        .args(["conv", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1").and(predicate::str::contains("s2")));
}

#[test]
fn conv_list_json_newest_first() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let v = json_stdout(ccx(&dir).args(["conv", "list", "--json"]));
    let list = v.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["session_id"], "s2");
    assert_eq!(list[1]["tool_call_count"], 1);
}

#[test]
fn conv_missing_transcripts_dir_fails() {
    let dir = TempDir::new().unwrap();
    ccx(&dir)
        .args(["conv", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("transcripts directory not found"));
}

#[test]
fn conv_show_by_prefix() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let v = json_stdout(ccx(&dir).args(["conv", "show", "s1", "--json"]));
    assert_eq!(v["metadata"]["session_id"], "s1");
    assert_eq!(v["tool_calls"][0]["status"], "error");

    ccx(&dir)
        .args(["conv", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("conversation not found"));
}

#[test]
fn conv_filter_by_errors_and_text() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let v = json_stdout(ccx(&dir).args(["conv", "filter", "--errors", "--json"]));
    assert_eq!(v.as_array().unwrap().len(), 1);
    assert_eq!(v[0]["session_id"], "s1");

    let v = json_stdout(ccx(&dir).args(["conv", "filter", "--text", "LIFETIMES", "--json"]));
    assert_eq!(v[0]["session_id"], "s2");

    let v = json_stdout(ccx(&dir).args(["conv", "filter", "--since", "2025-01-16", "--json"]));
    assert_eq!(v.as_array().unwrap().len(), 1);
}

#[test]
fn conv_grep_and_invalid_regex() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    ccx(&dir)
        .args(["conv", "grep", "cargo test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1"));
    ccx(&dir)
        .args(["conv", "grep", "("])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid pattern"));
}

#[test]
fn conv_search_ranks_matches() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let v = json_stdout(ccx(&dir).args(["conv", "search", "lifetimes", "--json"]));
    assert_eq!(v[0]["session_id"], "s2");
}

#[test]
fn conv_stats_and_analyze() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let v = json_stdout(ccx(&dir).args(["conv", "stats", "--json"]));
    assert_eq!(v["total_conversations"], 2);
    assert_eq!(v["tool_usage_counts"]["run_shell_command"], 1);

    let v = json_stdout(ccx(&dir).args(["conv", "analyze", "--json"]));
    assert_eq!(v["complexity"]["conversations_with_errors"], 1);
    assert!(v["temporal_patterns"]["duration_buckets"].is_array());
}

#[test]
fn conv_export_text() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let out = dir.path().join("out/s1.txt");
    ccx(&dir)
        .args(["conv", "export", "s1", "--format", "txt", "-o"])
        .arg(&out)
        .assert()
        .success();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("run the tests"));
}

// ---------------------------------------------------------------------------
// ccx hook
// ---------------------------------------------------------------------------

#[test]
fn hook_blocks_dangerous_command() {
    let dir = TempDir::new().unwrap();
    let payload = r#"{"hook_event_name":"PreToolUse","session_id":"s1","tool_name":"Bash","tool_input":{"command":"rm -rf /"}}"#;
    ccx(&dir)
        .args(["hook", "dispatch"])
        .write_stdin(payload)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("[Error] Dangerous command blocked: rm -rf /"));
    assert!(dir.path().join("logs/ccx-hooks.jsonl").exists());
}

#[test]
fn hook_allows_malformed_or_empty_input() {
    let dir = TempDir::new().unwrap();
    ccx(&dir)
        .args(["hook", "dispatch"])
        .write_stdin("{not json")
        .assert()
        .success();
    ccx(&dir).args(["hook", "dispatch"]).write_stdin("").assert().success();
    ccx(&dir)
        .args(["hook", "run", "dangerous"])
        .write_stdin(r#"{"tool_name":"Bash","tool_input":{"command":"ls"}}"#)
        .assert()
        .success();
}

#[test]
fn hook_session_start_emits_context() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::write(project.path().join("main.rs"), "fn main() {}").unwrap();
    let payload = serde_json::json!({
        "hook_event_name": "SessionStart",
        "session_id": "abc",
        "source": "resume",
        "cwd": project.path(),
    });

    let out = ccx(&dir)
        .args(["hook", "dispatch"])
        .write_stdin(payload.to_string())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&out).unwrap();
    let ctx = v["hookSpecificOutput"]["additionalContext"].as_str().unwrap();
    assert_eq!(v["hookSpecificOutput"]["hookEventName"], "SessionStart");
    assert!(ctx.contains("Session resumed via: resume"));
    assert!(ctx.contains("CODEBASE STRUCTURE"));
    assert!(ctx.contains("main.rs"));
}

#[test]
fn hook_bad_dangerous_pattern_keeps_other_guards() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ccx.yaml"),
        "hooks:\n  dangerous_commands:\n    - pattern: \"curl (\"\n    \
         - pattern: \"wipe-disk\"\n      reason: never\n",
    )
    .unwrap();
    let payload = serde_json::json!({
        "hook_event_name": "PreToolUse",
        "tool_name": "Bash",
        "tool_input": { "command": "wipe-disk now" },
    })
    .to_string();
    ccx(&dir)
        .args(["hook", "dispatch"])
        .write_stdin(payload)
        .assert()
        .code(2)
        .stderr(
            predicate::str::contains("Dangerous command blocked: wipe-disk now")
                .and(predicate::str::contains("skipping invalid dangerous-command pattern")),
        );
}

#[test]
fn hook_prompt_submit_adds_referenced_file() {
    let dir = TempDir::new().unwrap();
    let project = TempDir::new().unwrap();
    std::fs::create_dir_all(project.path().join("src")).unwrap();
    std::fs::write(project.path().join("src/parser.rs"), "pub fn parse() {}\n").unwrap();
    let payload = serde_json::json!({
        "hook_event_name": "UserPromptSubmit",
        "session_id": "abc",
        "prompt": "why does src/parser.rs panic?",
        "cwd": project.path(),
    });

    let out = ccx(&dir)
        .args(["hook", "run", "jit_context"])
        .write_stdin(payload.to_string())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["hookSpecificOutput"]["hookEventName"], "UserPromptSubmit");
    let ctx = v["hookSpecificOutput"]["additionalContext"].as_str().unwrap();
    assert!(ctx.contains("## src/parser.rs\npub fn parse() {}"));
    assert!(ctx.contains("*JIT Context: 1 files"));
}

#[test]
fn hook_list_and_unknown_name() {
    let dir = TempDir::new().unwrap();
    ccx(&dir)
        .args(["hook", "list"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("shellcheck").and(predicate::str::contains("self_review")),
        );
    ccx(&dir)
        .args(["hook", "run", "nope"])
        .write_stdin("{}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown hook: nope"));
}

// ---------------------------------------------------------------------------
// ccx projects / dataset
// ---------------------------------------------------------------------------

fn seed_projects(dir: &TempDir) {
    write_lines(
        &dir.path().join("projects/-work-app/s-1.jsonl"),
        &[
            r#"{"type":"user","sessionId":"s-1","uuid":"u1","parentUuid":null,"timestamp":"2025-01-15T10:00:00.000Z","message":{"role":"user","content":"list files"}}"#,
            r#"{"type":"assistant","sessionId":"s-1","uuid":"u2","parentUuid":"u1","timestamp":"2025-01-15T10:00:01.000Z","message":{"role":"assistant","content":[{"type":"tool_use","id":"tu_1","name":"Bash","input":{"command":"ls"}}]}}"#,
            r#"{"type":"user","sessionId":"s-1","uuid":"u3","parentUuid":"u2","timestamp":"2025-01-15T10:00:02.000Z","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu_1","content":"a.txt","is_error":false}]}}"#,
            r#"{"type":"summary","summary":"Listing files"}"#,
        ],
    );
}

#[test]
fn projects_index_and_schema() {
    let dir = TempDir::new().unwrap();
    seed_projects(&dir);
    let v = json_stdout(ccx(&dir).args(["projects", "index", "--json"]));
    assert_eq!(v["summary"]["total_files"], 1);

    let v = json_stdout(ccx(&dir).args(["projects", "schema", "--json"]));
    assert_eq!(v["total_records"], 4);
    assert_eq!(v["types"]["user"]["count"], 2);
    assert_eq!(v["types"]["summary"]["count"], 1);
}

#[test]
fn projects_events_to_stdout() {
    let dir = TempDir::new().unwrap();
    seed_projects(&dir);
    let out = ccx(&dir)
        .args(["projects", "events"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1]["event_type"], "tool_use");
    assert_eq!(rows[2]["tool_result_text"], "a.txt");
}

#[test]
fn dataset_build_writes_rows_and_stats() {
    let dir = TempDir::new().unwrap();
    seed_projects(&dir);
    let out = dir.path().join("data/rows.jsonl");
    ccx(&dir)
        .args(["dataset", "build", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 rows"));

    let row: Value = serde_json::from_str(std::fs::read_to_string(&out).unwrap().trim()).unwrap();
    assert_eq!(row["tool_name"], "Bash");
    assert_eq!(row["reward"], 1.0);
    assert!(dir.path().join("data/rows.jsonl.stats.json").exists());
}

#[test]
fn dataset_tool_calls_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    seed_transcripts(&dir);
    let out = dir.path().join("tool_calls.jsonl");
    ccx(&dir)
        .args(["dataset", "tool-calls", "-o"])
        .arg(&out)
        .assert()
        .success();
    ccx(&dir)
        .args(["dataset", "tool-calls", "-o"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    ccx(&dir)
        .args(["dataset", "tool-calls", "--overwrite", "-o"])
        .arg(&out)
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// ccx cleanup / snapshot / config
// ---------------------------------------------------------------------------

#[test]
fn cleanup_defaults_to_dry_run() {
    let dir = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    write_lines(&dir.path().join("paste-cache/p.txt"), &["x"]);
    ccx(&dir)
        .args(["cleanup", "--archive-dir"])
        .arg(archive.path())
        .assert()
        .success()
        .stdout(
            predicate::str::contains("DRY RUN MODE")
                .and(predicate::str::contains("Run with --execute")),
        );
    assert!(dir.path().join("paste-cache/p.txt").exists());

    ccx(&dir)
        .args(["cleanup", "--execute", "--archive-dir"])
        .arg(archive.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("DELETED: 1 items"));
    assert!(!dir.path().join("paste-cache/p.txt").exists());
}

#[test]
fn snapshot_summary() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("snapshot.sh");
    std::fs::write(&file, "foo () {\n  :\n}\nalias ll='ls -la'\nexport EDITOR=vim\n").unwrap();
    let v = json_stdout(ccx(&dir).args(["snapshot", "--json"]).arg(&file));
    assert_eq!(v["kind"], "shell_snapshot_v1");
    assert_eq!(v["function_names"][0], "foo");
    assert_eq!(v["alias_count"], 1);
    assert_eq!(v["export_names"][0], "EDITOR");
}

#[test]
fn config_init_validate_show() {
    let dir = TempDir::new().unwrap();
    ccx(&dir).args(["config", "init"]).assert().success();
    assert!(dir.path().join("ccx.yaml").exists());
    ccx(&dir)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    ccx(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));

    let v = json_stdout(ccx(&dir).args(["config", "show", "--json"]));
    assert_eq!(v["cleanup"]["retention_days"], 7);
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ccx.yaml"),
        "hooks:\n  shellcheck:\n    severity: loud\n",
    )
    .unwrap();
    ccx(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

// ---------------------------------------------------------------------------
// ccx env
// ---------------------------------------------------------------------------

#[test]
fn env_reports_missing_tool_and_fails() {
    let dir = TempDir::new().unwrap();
    ccx(&dir)
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to check"));

    std::fs::write(
        dir.path().join("ccx.yaml"),
        "hooks:\n  env_check:\n    required_tools: [ccx-definitely-not-a-tool]\n    \
         required_env_vars: [PATH]\n",
    )
    .unwrap();
    let out = ccx(&dir)
        .args(["env", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment check failed"))
        .get_output()
        .stdout
        .clone();
    let v: Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["success"], false);
    assert_eq!(v["checks"][0]["passed"], false);
    assert_eq!(v["checks"][1]["name"], "PATH");
    assert_eq!(v["checks"][1]["passed"], true);
}
