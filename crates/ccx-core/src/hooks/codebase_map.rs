use crate::config::CodebaseMapConfig;
use crate::error::Result;
use crate::hooks::payload::HookPayload;
use crate::hooks::registry::{HookEvent, HookHandler, HookOutcome};
use crate::paths;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Render `root` as an indented tree, directories first then by
/// case-insensitive name. Unreadable directories render as empty.
pub fn generate_tree(root: &Path, max_depth: usize, exclude: &HashSet<String>) -> String {
    let mut lines = Vec::new();
    walk(root, max_depth, exclude, 0, "", &mut lines);
    lines.join("\n")
}

fn walk(
    dir: &Path,
    max_depth: usize,
    exclude: &HashSet<String>,
    depth: usize,
    prefix: &str,
    lines: &mut Vec<String>,
) {
    if depth >= max_depth {
        return;
    }
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<(String, PathBuf, bool)> = read
        .flatten()
        .map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let path = e.path();
            let is_dir = path.is_dir();
            (name, path, is_dir)
        })
        .filter(|(name, _, _)| !exclude.contains(name))
        .collect();
    entries.sort_by_key(|(name, _, is_dir)| (!is_dir, name.to_lowercase()));

    let last = entries.len().saturating_sub(1);
    for (i, (name, path, is_dir)) in entries.iter().enumerate() {
        let connector = if i == last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{connector}{name}"));
        if *is_dir {
            let extension = if i == last { "    " } else { "│   " };
            walk(path, max_depth, exclude, depth + 1, &format!("{prefix}{extension}"), lines);
        }
    }
}

/// Adds a tree of the working directory to the context, once per session.
pub struct CodebaseMap {
    config: CodebaseMapConfig,
    claude_dir: PathBuf,
}

impl CodebaseMap {
    pub fn new(config: CodebaseMapConfig, claude_dir: PathBuf) -> Self {
        Self { config, claude_dir }
    }

    fn render(&self, root: &Path) -> String {
        let exclude: HashSet<String> = self.config.exclude.iter().cloned().collect();
        let tree = generate_tree(root, self.config.max_depth, &exclude);
        let rule = "=".repeat(60);
        format!("{rule}\nCODEBASE STRUCTURE\n{rule}\n{tree}\n{rule}")
    }
}

impl HookHandler for CodebaseMap {
    fn name(&self) -> &'static str {
        "codebase_map"
    }

    fn events(&self) -> &'static [HookEvent] {
        &[HookEvent::SessionStart, HookEvent::UserPromptSubmit]
    }

    fn description(&self) -> &'static str {
        "Add a directory tree of the project to the context once per session"
    }

    fn handle(&self, event: HookEvent, payload: &HookPayload) -> Result<HookOutcome> {
        if !self.config.enabled || payload.stop_hook_active {
            return Ok(HookOutcome::Allow);
        }
        let Some(root) = payload.cwd.as_deref().filter(|p| p.is_dir()) else {
            return Ok(HookOutcome::Allow);
        };

        let marker = match payload.session_id.as_deref() {
            Some(id) => Some(paths::session_marker(&self.claude_dir, id, "map")?),
            None => None,
        };
        if marker.as_ref().is_some_and(|m| m.exists()) {
            debug!("codebase map already emitted for session");
            return Ok(HookOutcome::Allow);
        }

        let text = self.render(root);
        if let Some(marker) = marker {
            crate::io::atomic_write(&marker, chrono::Utc::now().to_rfc3339().as_bytes())?;
        }
        Ok(HookOutcome::Context { event, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/bin")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join("Docs")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "").unwrap();
        std::fs::write(root.join("src/bin/main.rs"), "").unwrap();
        std::fs::write(root.join("README.md"), "").unwrap();
        std::fs::write(root.join("Cargo.toml"), "").unwrap();
        dir
    }

    #[test]
    fn tree_orders_dirs_first_and_skips_excluded() {
        let dir = project();
        let exclude: HashSet<String> = ["node_modules".to_string()].into();
        let tree = generate_tree(dir.path(), 3, &exclude);
        assert_eq!(
            tree,
            "├── Docs\n\
             ├── src\n\
             │   ├── bin\n\
             │   │   └── main.rs\n\
             │   └── lib.rs\n\
             ├── Cargo.toml\n\
             └── README.md"
        );
    }

    #[test]
    fn depth_limits_recursion() {
        let dir = project();
        let tree = generate_tree(dir.path(), 1, &HashSet::new());
        assert!(tree.contains("src"));
        assert!(!tree.contains("lib.rs"));
        assert!(generate_tree(dir.path(), 0, &HashSet::new()).is_empty());
    }

    #[test]
    fn emitted_once_per_session() {
        let dir = project();
        let claude = TempDir::new().unwrap();
        let map = CodebaseMap::new(CodebaseMapConfig::default(), claude.path().to_path_buf());
        let payload = HookPayload {
            session_id: Some("s1".to_string()),
            cwd: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        match map.handle(HookEvent::SessionStart, &payload).unwrap() {
            HookOutcome::Context { event, text } => {
                assert_eq!(event, HookEvent::SessionStart);
                assert!(text.contains("CODEBASE STRUCTURE"));
                assert!(text.contains("lib.rs"));
                assert!(!text.contains("node_modules"));
            }
            other => panic!("expected context, got {other:?}"),
        }
        assert!(claude.path().join("ccx/sessions/s1.map").exists());
        assert_eq!(
            map.handle(HookEvent::UserPromptSubmit, &payload).unwrap(),
            HookOutcome::Allow
        );
    }

    #[test]
    fn bad_session_id_is_an_error() {
        let dir = project();
        let claude = TempDir::new().unwrap();
        let map = CodebaseMap::new(CodebaseMapConfig::default(), claude.path().to_path_buf());
        let payload = HookPayload {
            session_id: Some("../escape".to_string()),
            cwd: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(map.handle(HookEvent::SessionStart, &payload).is_err());
    }
}
