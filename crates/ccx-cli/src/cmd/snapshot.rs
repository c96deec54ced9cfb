use crate::output::print_json;
use anyhow::Context;
use ccx_core::snapshot::extract_shell_snapshot_state;
use std::path::Path;

pub fn run(file: &Path, max_names: usize, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let state = extract_shell_snapshot_state(&text, max_names);

    if json {
        return print_json(&state);
    }
    println!("{} ({} bytes, {} lines)", file.display(), state.bytes, state.line_count);
    println!("Functions: {}", state.function_count);
    println!("Aliases:   {}", state.alias_count);
    println!("Exports:   {}", state.export_count);
    println!("setopt:    {}", state.setopt_line_count);
    for (label, names) in [
        ("functions", &state.function_names),
        ("aliases", &state.alias_names),
        ("exports", &state.export_names),
    ] {
        if !names.is_empty() {
            println!();
            println!("{label}: {}", names.join(" "));
        }
    }
    Ok(())
}
