//! Summaries of the shell snapshots Claude Code saves under
//! `~/.claude/shell-snapshots`. Names are reported alongside short hashes so
//! snapshots can be compared without sharing their contents.

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::OnceLock;

pub const SNAPSHOT_KIND: &str = "shell_snapshot_v1";
pub const DEFAULT_MAX_NAMES: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellSnapshotState {
    pub kind: &'static str,
    pub bytes: usize,
    pub line_count: usize,
    pub function_count: usize,
    pub alias_count: usize,
    pub export_count: usize,
    pub setopt_line_count: usize,
    pub function_names: Vec<String>,
    pub alias_names: Vec<String>,
    pub export_names: Vec<String>,
    pub function_name_hashes: Vec<String>,
    pub alias_name_hashes: Vec<String>,
    pub export_name_hashes: Vec<String>,
}

struct Patterns {
    function: Regex,
    keyword_function: Regex,
    alias: Regex,
    export: Regex,
    setopt: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        function: Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_:.\-]*)\s*\(\)\s*\{").unwrap(),
        keyword_function: Regex::new(r"^\s*function\s+([A-Za-z_][A-Za-z0-9_:.\-]*)\s*(?:\(\))?\s*\{").unwrap(),
        alias: Regex::new(r"^\s*alias\s+(?:--\s+)?([^=\s]+)=").unwrap(),
        export: Regex::new(r"^\s*(?:export|typeset\s+-x|declare\s+-x)\s+([A-Za-z_][A-Za-z0-9_]*)(?:=|\s|$)").unwrap(),
        setopt: Regex::new(r"^\s*setopt\b").unwrap(),
    })
}

/// First 16 hex chars of the SHA-256 of `name`.
pub fn name_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn capped(names: &BTreeSet<String>, max: usize) -> (Vec<String>, Vec<String>) {
    let names: Vec<String> = names.iter().take(max).cloned().collect();
    let hashes = names.iter().map(|n| name_hash(n)).collect();
    (names, hashes)
}

/// Count and name the functions, aliases and exports defined in a shell
/// snapshot. Comment lines are ignored. Name lists are sorted, unique and
/// capped at `max_names`; counts are not capped.
pub fn extract_shell_snapshot_state(text: &str, max_names: usize) -> ShellSnapshotState {
    let p = patterns();
    let mut functions = BTreeSet::new();
    let mut aliases = BTreeSet::new();
    let mut exports = BTreeSet::new();
    let mut setopt_lines = 0;

    for line in text.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(c) = p.keyword_function.captures(line).or_else(|| p.function.captures(line)) {
            functions.insert(c[1].to_string());
        } else if let Some(c) = p.alias.captures(line) {
            aliases.insert(c[1].to_string());
        } else if let Some(c) = p.export.captures(line) {
            exports.insert(c[1].to_string());
        } else if p.setopt.is_match(line) {
            setopt_lines += 1;
        }
    }

    let (function_names, function_name_hashes) = capped(&functions, max_names);
    let (alias_names, alias_name_hashes) = capped(&aliases, max_names);
    let (export_names, export_name_hashes) = capped(&exports, max_names);

    ShellSnapshotState {
        kind: SNAPSHOT_KIND,
        bytes: text.len(),
        line_count: text.lines().count(),
        function_count: functions.len(),
        alias_count: aliases.len(),
        export_count: exports.len(),
        setopt_line_count: setopt_lines,
        function_names,
        alias_names,
        export_names,
        function_name_hashes,
        alias_name_hashes,
        export_name_hashes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "# Snapshot file
# comment: foo () { not a function }
unalias -a 2>/dev/null || true
foo () {
  echo hi
}
bar(){ :; }
function baz { :; }
alias ll='ls -la'
typeset -x PATH=/bin:/usr/bin
export HOME=/Users/joe
setopt NO_shwordsplit
";

    #[test]
    fn extracts_functions_aliases_exports() {
        let st = extract_shell_snapshot_state(SNAPSHOT, DEFAULT_MAX_NAMES);
        assert_eq!(st.kind, "shell_snapshot_v1");
        assert_eq!(st.bytes, SNAPSHOT.len());
        assert_eq!(st.line_count, 12);
        assert_eq!(st.function_count, 3);
        assert_eq!(st.alias_count, 1);
        assert_eq!(st.export_count, 2);
        assert_eq!(st.setopt_line_count, 1);
        assert_eq!(st.function_names, vec!["bar", "baz", "foo"]);
        assert_eq!(st.alias_names, vec!["ll"]);
        assert_eq!(st.export_names, vec!["HOME", "PATH"]);
        assert_eq!(st.function_name_hashes.len(), 3);
        assert_eq!(st.export_name_hashes[0], name_hash("HOME"));
    }

    #[test]
    fn names_are_capped_but_counts_are_not() {
        let text: String = (0..10).map(|i| format!("export V{i}=1\n")).collect();
        let st = extract_shell_snapshot_state(&text, 3);
        assert_eq!(st.export_count, 10);
        assert_eq!(st.export_names, vec!["V0", "V1", "V2"]);
        assert_eq!(st.export_name_hashes.len(), 3);
    }

    #[test]
    fn deterministic_and_hashes_are_short_hex() {
        let text = "foo () { :; }\nexport X=1\ndeclare -x Y\n";
        let a = extract_shell_snapshot_state(text, DEFAULT_MAX_NAMES);
        assert_eq!(a, extract_shell_snapshot_state(text, DEFAULT_MAX_NAMES));
        assert_eq!(a.export_names, vec!["X", "Y"]);
        // sha256("foo") = 2c26b46b68ffc68f...
        assert_eq!(a.function_name_hashes, vec!["2c26b46b68ffc68f"]);
    }
}
