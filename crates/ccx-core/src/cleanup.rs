use crate::config::CleanupSettings;
use crate::error::{CcxError, Result};
use crate::format::format_size;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Items listed per section of the text report.
const REPORT_ITEM_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// CleanupConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CleanupConfig {
    pub claude_dir: PathBuf,
    /// Dated destination for this run, e.g. `.../claude-archives/2025-01-31`.
    pub archive_dir: PathBuf,
    pub retention_days: u32,
    pub archive_dirs: Vec<String>,
    pub delete_only_dirs: Vec<String>,
    pub temp_patterns: Vec<String>,
    pub now: DateTime<Utc>,
}

impl CleanupConfig {
    pub fn from_settings(
        settings: &CleanupSettings,
        claude_dir: &Path,
        archive_root: &Path,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            claude_dir: claude_dir.to_path_buf(),
            archive_dir: archive_root.join(now.format("%Y-%m-%d").to_string()),
            retention_days: settings.retention_days,
            archive_dirs: settings.archive_dirs.clone(),
            delete_only_dirs: settings.delete_only_dirs.clone(),
            temp_patterns: settings.temp_patterns.clone(),
            now,
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.now - Duration::days(i64::from(self.retention_days))
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

fn modified(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Direct children of `dir` last modified before `cutoff`, sorted.
/// A missing or unreadable directory yields nothing.
pub fn find_old_items(dir: &Path, cutoff: DateTime<Utc>) -> Vec<PathBuf> {
    let Ok(read) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut items: Vec<PathBuf> = read
        .flatten()
        .map(|e| e.path())
        .filter(|p| modified(p).is_some_and(|m| m < cutoff))
        .collect();
    items.sort();
    items
}

/// Every file below `dir`, recursively.
fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => walk_files(&path, out),
            Ok(_) => out.push(path),
            Err(_) => {}
        }
    }
}

/// Every entry below `dir` (files and directories), recursively.
fn walk_entries(dir: &Path, out: &mut Vec<(PathBuf, bool)>) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        out.push((path.clone(), is_dir));
        if is_dir {
            walk_entries(&path, out);
        }
    }
}

/// `*` and `?` wildcards against a whole file name.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CcxError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Temporary files below `dir`. Each pattern matches entry names anywhere
/// in the tree; a matching directory contributes every file inside it.
pub fn find_temp_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    walk_entries(dir, &mut entries);

    let mut found = BTreeSet::new();
    for pattern in patterns {
        let re = glob_regex(pattern)?;
        for (path, is_dir) in &entries {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !re.is_match(&name) {
                continue;
            }
            if *is_dir {
                let mut files = Vec::new();
                walk_files(path, &mut files);
                found.extend(files);
            } else {
                found.insert(path.clone());
            }
        }
    }
    Ok(found.into_iter().collect())
}

/// Size of a file, or the total size of all files below a directory.
pub fn get_size(path: &Path) -> u64 {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            let mut files = Vec::new();
            walk_files(path, &mut files);
            files
                .iter()
                .filter_map(|f| std::fs::symlink_metadata(f).ok())
                .map(|m| m.len())
                .sum()
        }
        Ok(meta) => meta.len(),
        Err(_) => 0,
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Where `item` lands under `dest_base`, keeping its path relative to
/// `source_base`.
pub fn archive_destination(item: &Path, source_base: &Path, dest_base: &Path) -> PathBuf {
    match item.strip_prefix(source_base) {
        Ok(rel) => dest_base.join(rel),
        Err(_) => dest_base.join(item.file_name().unwrap_or_default()),
    }
}

/// Symlinks are recreated as links, never followed.
fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(src)?;
    if meta.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)
    } else {
        std::fs::copy(src, dest)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    std::fs::copy(src, dest)?;
    Ok(())
}

/// Copy `item` into the archive. Returns the destination path.
pub fn archive_item(
    item: &Path,
    source_base: &Path,
    dest_base: &Path,
    dry_run: bool,
) -> Result<PathBuf> {
    let dest = archive_destination(item, source_base, dest_base);
    if dry_run {
        debug!(item = %item.display(), dest = %dest.display(), "would archive");
        return Ok(dest);
    }
    copy_recursive(item, &dest)?;
    Ok(dest)
}

/// The archive copy exists and holds the same number of bytes. Links
/// count as the length of their target path.
pub fn verify_archive(source: &Path, dest: &Path) -> bool {
    std::fs::symlink_metadata(dest).is_ok() && get_size(source) == get_size(dest)
}

pub fn delete_item(path: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        return Ok(());
    }
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CleanupResults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupItem {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupResults {
    pub dry_run: bool,
    pub archived_items: Vec<CleanupItem>,
    pub deleted_items: Vec<CleanupItem>,
    pub errors: Vec<String>,
    pub total_archived_size: u64,
    pub total_deleted_size: u64,
}

impl CleanupResults {
    pub fn add_archived(&mut self, path: PathBuf, size_bytes: u64) {
        self.total_archived_size += size_bytes;
        self.archived_items.push(CleanupItem { path, size_bytes });
    }

    pub fn add_deleted(&mut self, path: PathBuf, size_bytes: u64) {
        self.total_deleted_size += size_bytes;
        self.deleted_items.push(CleanupItem { path, size_bytes });
    }

    pub fn add_error(&mut self, message: String) {
        warn!("{message}");
        self.errors.push(message);
    }

    pub fn total_size(&self) -> u64 {
        self.total_archived_size + self.total_deleted_size
    }
}

// ---------------------------------------------------------------------------
// run_cleanup
// ---------------------------------------------------------------------------

/// Archive then delete old items in the archive dirs, delete old items in
/// the delete-only dirs, and delete temp files. Failures are collected in
/// the results rather than aborting the run.
pub fn run_cleanup(config: &CleanupConfig, dry_run: bool) -> CleanupResults {
    let mut results = CleanupResults {
        dry_run,
        ..Default::default()
    };
    let cutoff = config.cutoff();

    for name in &config.archive_dirs {
        for item in find_old_items(&config.claude_dir.join(name), cutoff) {
            let size = get_size(&item);
            let dest = match archive_item(&item, &config.claude_dir, &config.archive_dir, dry_run) {
                Ok(dest) => dest,
                Err(e) => {
                    results.add_error(format!("Failed to archive {}: {e}", item.display()));
                    continue;
                }
            };
            if !dry_run && !verify_archive(&item, &dest) {
                results.add_error(format!(
                    "Archive verification failed for {}; source kept",
                    item.display()
                ));
                continue;
            }
            match delete_item(&item, dry_run) {
                Ok(()) => results.add_archived(item, size),
                Err(e) => results.add_error(format!("Failed to delete {}: {e}", item.display())),
            }
        }
    }

    for name in &config.delete_only_dirs {
        for item in find_old_items(&config.claude_dir.join(name), cutoff) {
            let size = get_size(&item);
            match delete_item(&item, dry_run) {
                Ok(()) => results.add_deleted(item, size),
                Err(e) => results.add_error(format!("Failed to delete {}: {e}", item.display())),
            }
        }
    }

    match find_temp_files(&config.claude_dir, &config.temp_patterns) {
        Ok(files) => {
            for file in files {
                // Already removed along with an old item above.
                if !dry_run && !file.exists() {
                    continue;
                }
                let size = get_size(&file);
                match delete_item(&file, dry_run) {
                    Ok(()) => results.add_deleted(file, size),
                    Err(e) => {
                        results.add_error(format!("Failed to delete {}: {e}", file.display()))
                    }
                }
            }
        }
        Err(e) => results.add_error(e.to_string()),
    }

    results
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

fn push_items(out: &mut Vec<String>, items: &[CleanupItem], base: &Path) {
    for item in items.iter().take(REPORT_ITEM_LIMIT) {
        let shown = item.path.strip_prefix(base).unwrap_or(&item.path);
        out.push(format!("  {} ({})", shown.display(), format_size(item.size_bytes)));
    }
    if items.len() > REPORT_ITEM_LIMIT {
        out.push(format!("  ... and {} more", items.len() - REPORT_ITEM_LIMIT));
    }
}

pub fn format_results(results: &CleanupResults, config: &CleanupConfig, dry_run: bool) -> String {
    let rule = "=".repeat(60);
    let mut out = vec![rule.clone(), "Claude Workspace Cleanup".to_string(), rule.clone()];
    if dry_run {
        out.push("DRY RUN MODE: no files were changed".to_string());
    }
    out.push(format!(
        "Retention: {} days (cutoff {})",
        config.retention_days,
        config.cutoff().format("%Y-%m-%d %H:%M")
    ));
    out.push(format!("Archive:   {}", config.archive_dir.display()));
    out.push(String::new());

    let (archive_label, delete_label) = if dry_run {
        ("WILL ARCHIVE", "WILL DELETE")
    } else {
        ("ARCHIVED", "DELETED")
    };
    out.push(format!(
        "{archive_label}: {} items ({})",
        results.archived_items.len(),
        format_size(results.total_archived_size)
    ));
    push_items(&mut out, &results.archived_items, &config.claude_dir);
    out.push(String::new());
    out.push(format!(
        "{delete_label}: {} items ({})",
        results.deleted_items.len(),
        format_size(results.total_deleted_size)
    ));
    push_items(&mut out, &results.deleted_items, &config.claude_dir);

    if !results.errors.is_empty() {
        out.push(String::new());
        out.push(format!("ERRORS: {}", results.errors.len()));
        out.extend(results.errors.iter().map(|e| format!("  - {e}")));
    }

    out.push(String::new());
    let total = format_size(results.total_size());
    if dry_run {
        out.push(format!("Space to reclaim: {total}"));
        out.push("Run with --execute to perform the cleanup.".to_string());
    } else {
        out.push(format!("Space reclaimed: {total}"));
    }
    out.push(rule);
    out.join("\n")
}
