use crate::output::print_json;
use anyhow::Context;
use ccx_core::config::{Config, WarnLevel};
use ccx_core::paths;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (defaults filled in)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a ccx.yaml with every default spelled out
    Init {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(claude_dir: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(claude_dir, json),
        ConfigSubcommand::Validate => validate(claude_dir, json),
        ConfigSubcommand::Init { force } => init(claude_dir, force, json),
    }
}

fn show(claude_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(claude_dir).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn validate(claude_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(claude_dir).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(claude_dir: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    let path = paths::config_path(claude_dir);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (pass --force to replace it)", path.display());
    }
    Config::default()
        .save(claude_dir)
        .with_context(|| format!("failed to write {}", path.display()))?;
    if json {
        print_json(&serde_json::json!({ "path": path }))
    } else {
        println!("Wrote {}", path.display());
        Ok(())
    }
}
