//! Prompt-driven context: files and snippets the prompt points at, inside a
//! token budget.
//!
//! The prompt is mined for explicit paths (`src/lib.rs`), globs (`*.rs`,
//! `src/**/*.ts`) and keywords (quoted strings, CamelCase and snake_case
//! identifiers). Explicit files contribute their head; keywords contribute
//! line-numbered snippets from files the globs select.

use crate::config::JitContextConfig;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// Prompts shorter than this carry too little to search for.
const MIN_PROMPT_CHARS: usize = 10;
/// Lines of an explicitly named file shown in full.
const EXPLICIT_HEAD_LINES: usize = 10;
/// Glob-selected files searched for keywords.
const MAX_SEARCH_FILES: usize = 10;
const MAX_KEYWORDS: usize = 2;

/// Roughly four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBudget {
    pub max_tokens: usize,
    pub used_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            used_tokens: 0,
        }
    }

    pub fn can_add(&self, text: &str) -> bool {
        self.used_tokens + estimate_tokens(text) <= self.max_tokens
    }

    /// Charge `text` against the budget if it fits.
    pub fn add(&mut self, text: &str) -> bool {
        if !self.can_add(text) {
            return false;
        }
        self.used_tokens += estimate_tokens(text);
        true
    }

    pub fn remaining(&self) -> usize {
        self.max_tokens.saturating_sub(self.used_tokens)
    }
}

/// Lines `idx - context ..= idx + context`, cut to `max_chars` characters.
pub fn extract_snippet(lines: &[&str], idx: usize, context: usize, max_chars: usize) -> String {
    let start = idx.saturating_sub(context);
    let end = (idx + context + 1).min(lines.len());
    let snippet = lines[start..end].join("\n");
    if snippet.chars().count() > max_chars {
        let cut: String = snippet.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        snippet
    }
}

/// Case-insensitive matches of `term` in `path` as `(line number, snippet)`.
/// Stops at the first snippet the budget can't hold.
pub fn find_in_file(
    path: &Path,
    term: &str,
    config: &JitContextConfig,
    budget: &TokenBudget,
) -> Vec<(usize, String)> {
    let too_big = std::fs::metadata(path)
        .map(|m| m.len() > config.max_file_size_kb * 1024)
        .unwrap_or(true);
    if too_big {
        return Vec::new();
    }
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let needle = term.to_lowercase();

    let mut matches = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(&needle) {
            continue;
        }
        let snippet = extract_snippet(&lines, i, config.context_lines, config.snippet_chars);
        if !budget.can_add(&format!("L{}: {snippet}", i + 1)) {
            break;
        }
        matches.push((i + 1, snippet));
        if matches.len() >= config.max_matches_per_file {
            break;
        }
    }
    matches
}

fn glob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[*?\[\]{}]+[.\w/]*|[\w./]+[*?\[\]{}]+[\w./]*").unwrap()
    })
}

fn ext_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.(?:py|ts|js|tsx|jsx|md|json|yaml|yml|toml|sh|sql|rs|go|java)\b").unwrap()
    })
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\.?/)?(?:[\w.-]+/)+[\w.-]*|[\w.-]+\.(?:py|ts|js|md|json|rs|go|java)")
            .unwrap()
    })
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']([^"']{3,})["']"#).unwrap())
}

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-zA-Z]{2,}\b|\b[a-z]+_[a-z_]+\b").unwrap())
}

/// Glob patterns in the prompt, plus `*.ext` for every extension it
/// mentions. Sorted and deduplicated.
pub fn extract_patterns(prompt: &str) -> Vec<String> {
    let mut patterns: Vec<String> = glob_re()
        .find_iter(prompt)
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    patterns.extend(ext_re().find_iter(prompt).map(|m| format!("*{}", m.as_str())));
    patterns.sort();
    patterns.dedup();
    patterns
}

/// Paths in the prompt that name existing files under `cwd`.
pub fn extract_paths(prompt: &str, cwd: &Path) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    path_re()
        .find_iter(prompt)
        .map(|m| m.as_str().trim())
        .filter(|m| !m.is_empty() && !m.starts_with("http"))
        .map(|m| cwd.join(m))
        .filter(|p| p.is_file() && seen.insert(p.clone()))
        .collect()
}

/// Up to two search terms: quoted strings first, then identifiers, in
/// prompt order.
pub fn extract_keywords(prompt: &str) -> Vec<String> {
    let quoted = quoted_re()
        .captures_iter(prompt)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let idents = ident_re().find_iter(prompt).map(|m| m.as_str().to_string());

    let mut keywords: Vec<String> = Vec::new();
    for kw in quoted.chain(idents) {
        if !keywords.contains(&kw) {
            keywords.push(kw);
        }
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

fn matcher(pattern: &str) -> Option<GlobMatcher> {
    let pattern = pattern.trim_start_matches("./").trim_start_matches('/');
    match GlobBuilder::new(&format!("**/{pattern}"))
        .literal_separator(true)
        .build()
    {
        Ok(glob) => Some(glob.compile_matcher()),
        Err(e) => {
            debug!(pattern, error = %e, "ignoring unparsable glob from prompt");
            None
        }
    }
}

/// Files under `root` matching any pattern at any depth, pattern by
/// pattern, at most `max_files`. Directories named in `exclude` are pruned.
pub fn find_files(
    root: &Path,
    patterns: &[String],
    max_files: usize,
    exclude: &[String],
) -> Vec<PathBuf> {
    let matchers: Vec<GlobMatcher> = patterns.iter().filter_map(|p| matcher(p)).collect();
    if matchers.is_empty() || max_files == 0 {
        return Vec::new();
    }
    let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
    let files: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !exclude.contains(e.file_name().to_string_lossy().as_ref()))
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let mut found: Vec<PathBuf> = Vec::new();
    for m in &matchers {
        for path in &files {
            let rel = path.strip_prefix(root).unwrap_or(path);
            if m.is_match(rel) && !found.contains(path) {
                found.push(path.clone());
                if found.len() >= max_files {
                    return found;
                }
            }
        }
    }
    found
}

fn relative(path: &Path, cwd: &Path) -> String {
    path.strip_prefix(cwd).unwrap_or(path).display().to_string()
}

/// Head of `path` under a header, if the budget holds both.
fn explicit_file(path: &Path, cwd: &Path, budget: &mut TokenBudget) -> Option<[String; 2]> {
    let header = format!("\n## {}", relative(path, cwd));
    if !budget.can_add(&header) {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let mut snippet = lines[..lines.len().min(EXPLICIT_HEAD_LINES)].join("\n");
    if lines.len() > EXPLICIT_HEAD_LINES {
        snippet.push_str(&format!("\n... ({} more lines)", lines.len() - EXPLICIT_HEAD_LINES));
    }
    budget
        .add(&format!("{header}\n{snippet}"))
        .then_some([header, snippet])
}

fn keyword_matches(
    path: &Path,
    cwd: &Path,
    keyword: &str,
    config: &JitContextConfig,
    budget: &mut TokenBudget,
    parts: &mut Vec<String>,
) -> bool {
    let matches = find_in_file(path, keyword, config, budget);
    if matches.is_empty() {
        return false;
    }
    let header = format!("\n## {} (matched: '{keyword}')", relative(path, cwd));
    if !budget.add(&header) {
        return false;
    }
    parts.push(header);
    for (line, snippet) in matches {
        let text = format!("L{line}: {snippet}");
        if budget.add(&text) {
            parts.push(text);
        }
    }
    true
}

/// Explicit files first, then keyword snippets from glob-selected files,
/// then a footer with the file count and tokens spent. Empty when nothing
/// fit.
pub fn build_context(
    cwd: &Path,
    explicit_paths: &[PathBuf],
    pattern_files: &[PathBuf],
    keywords: &[String],
    config: &JitContextConfig,
) -> String {
    let mut budget = TokenBudget::new(config.max_tokens);
    let mut parts: Vec<String> = Vec::new();
    let mut included = 0;

    for path in explicit_paths {
        if included >= config.max_files {
            break;
        }
        if let Some(added) = explicit_file(path, cwd, &mut budget) {
            parts.extend(added);
            included += 1;
        }
    }

    'keywords: for keyword in keywords {
        for path in pattern_files.iter().take(MAX_SEARCH_FILES) {
            if included >= config.max_files {
                break 'keywords;
            }
            if keyword_matches(path, cwd, keyword, config, &mut budget, &mut parts) {
                included += 1;
            }
        }
    }

    if parts.is_empty() {
        return String::new();
    }
    parts.push(format!(
        "\n---\n*JIT Context: {included} files, ~{} tokens*",
        budget.used_tokens
    ));
    parts.join("\n")
}

/// Injects files and snippets the prompt refers to.
pub struct JitContext {
    config: JitContextConfig,
}

impl JitContext {
    pub fn new(config: JitContextConfig) -> Self {
        Self { config }
    }

    pub fn context_for(&self, prompt: &str, cwd: &Path) -> Option<String> {
        if prompt.chars().count() < MIN_PROMPT_CHARS {
            return None;
        }
        let patterns = extract_patterns(prompt);
        let explicit = extract_paths(prompt, cwd);
        let keywords = extract_keywords(prompt);
        if patterns.is_empty() && explicit.is_empty() && keywords.is_empty() {
            return None;
        }
        let files = find_files(cwd, &patterns, self.config.max_files * 3, &self.config.exclude);
        let text = build_context(cwd, &explicit, &files, &keywords, &self.config);
        (!text.is_empty()).then_some(text)
    }
}

impl HookHandler for JitContext {
    fn name(&self) -> &'static str {
        "jit_context"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::UserPromptSubmit]
    }

    fn description(&self) -> &'static str {
        "Add files and keyword snippets the prompt refers to, within a token budget"
    }

    fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !self.config.enabled {
            return Ok(HookOutcome::Allow);
        }
        let Some(prompt) = payload.prompt.as_deref() else {
            return Ok(HookOutcome::Allow);
        };
        let cwd = match payload.cwd.clone() {
            Some(cwd) => cwd,
            None => std::env::current_dir()?,
        };
        if !cwd.is_dir() {
            return Ok(HookOutcome::Allow);
        }
        Ok(match self.context_for(prompt, &cwd) {
            Some(text) => HookOutcome::Context { event, text },
            None => HookOutcome::Allow,
        })
    }
}
