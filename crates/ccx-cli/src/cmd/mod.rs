pub mod cleanup;
pub mod config;
pub mod conv;
pub mod dataset;
pub mod env;
pub mod hook;
pub mod projects;
pub mod snapshot;

use anyhow::Context;
use ccx_core::config::Config;
use std::path::Path;

pub(crate) fn load_config(claude_dir: &Path) -> anyhow::Result<Config> {
    Config::load(claude_dir).context("failed to load config")
}
