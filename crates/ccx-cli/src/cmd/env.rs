use crate::cmd::load_config;
use crate::output::{print_json, print_table};
use ccx_core::config::WarnLevel;
use ccx_core::hooks::env_check::validate_environment;
use std::path::Path;

pub fn run(claude_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(claude_dir)?;
    let env = &config.hooks.env_check;
    let report = validate_environment(env);

    if json {
        print_json(&serde_json::json!({
            "success": report.success(),
            "checks": report.checks,
        }))?;
    } else if report.checks.is_empty() {
        println!("Nothing to check. Add hooks.env_check.required_tools or required_env_vars.");
    } else {
        let rows = report
            .checks
            .iter()
            .map(|c| {
                let status = match (c.passed, &c.severity) {
                    (true, _) => "ok",
                    (false, WarnLevel::Warning) => "warning",
                    (false, WarnLevel::Error) => "error",
                };
                vec![status.to_string(), c.name.clone(), c.message.clone()]
            })
            .collect();
        print_table(&["STATUS", "NAME", "DETAIL"], rows);
    }

    if !report.success() {
        anyhow::bail!("environment check failed");
    }
    Ok(())
}
