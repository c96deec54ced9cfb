use crate::cmd::load_config;
use crate::output::print_json;
use ccx_core::cleanup::{format_results, run_cleanup, CleanupConfig};
use ccx_core::paths;
use std::path::{Path, PathBuf};

pub fn run(
    claude_dir: &Path,
    execute: bool,
    days: Option<u32>,
    archive_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(claude_dir)?;
    let mut settings = config.cleanup;
    if let Some(days) = days {
        settings.retention_days = days;
    }
    let archive_root = match archive_dir.or(settings.archive_root.clone()) {
        Some(p) => p,
        None => paths::default_archive_root()?,
    };
    if !claude_dir.is_dir() {
        anyhow::bail!("Claude directory not found: {}", claude_dir.display());
    }

    let cfg =
        CleanupConfig::from_settings(&settings, claude_dir, &archive_root, chrono::Utc::now());
    let dry_run = !execute;
    let results = run_cleanup(&cfg, dry_run);

    if json {
        print_json(&results)?;
    } else {
        println!("{}", format_results(&results, &cfg, dry_run));
    }
    if !results.errors.is_empty() {
        anyhow::bail!("cleanup finished with {} error(s)", results.errors.len());
    }
    Ok(())
}
