use crate::output::{print_json, print_table};
use anyhow::Context;
use ccx_core::format::format_size;
use ccx_core::paths;
use ccx_core::projects::{index, normalize, schema};
use clap::Subcommand;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ProjectsSubcommand {
    /// Size profile of the session logs: buckets and largest files
    Index {
        /// Logs directory (default: <claude-dir>/projects)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Number of largest files to list
        #[arg(long, default_value_t = 20)]
        top: usize,
        /// Also write the index as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-record-type counts, example records and inferred JSON shapes
    Schema {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Examples kept per record type
        #[arg(long, default_value_t = 3)]
        samples: usize,
        /// Only scan the N most recently modified files
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Flatten every message, tool call and tool result into JSON lines
    Events {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_files: Option<usize>,
    },
}

pub fn run(claude_dir: &Path, subcmd: ProjectsSubcommand, json: bool) -> anyhow::Result<()> {
    let default_dir = paths::projects_dir(claude_dir);
    match subcmd {
        ProjectsSubcommand::Index { dir, top, output } => {
            let dir = dir.unwrap_or(default_dir);
            let idx = index::build_index(&dir, top, index::DEFAULT_BUCKETS)
                .with_context(|| format!("failed to index {}", dir.display()))?;
            if let Some(out) = &output {
                ccx_core::io::write_json_pretty(out, &idx)?;
            }
            if json {
                return print_json(&idx);
            }
            println!(
                "{} files, {} total, {} average",
                idx.summary.total_files,
                format_size(idx.summary.total_bytes),
                format_size(idx.summary.avg_bytes)
            );
            println!();
            let rows = idx
                .buckets
                .iter()
                .map(|b| vec![b.bucket.clone(), b.count.to_string(), format_size(b.total_bytes)])
                .collect();
            print_table(&["BUCKET", "FILES", "BYTES"], rows);
            println!();
            let rows = idx
                .top_files
                .iter()
                .map(|f| {
                    let shown = f.path.strip_prefix(&dir).unwrap_or(&f.path);
                    vec![format_size(f.size_bytes), shown.display().to_string()]
                })
                .collect();
            print_table(&["SIZE", "FILE"], rows);
            Ok(())
        }
        ProjectsSubcommand::Schema {
            dir,
            samples,
            max_files,
            output,
        } => {
            let files = log_files(&dir.unwrap_or(default_dir), max_files)?;
            let report = schema::extract_schema_samples(&files, samples)
                .context("failed to sample record schemas")?;
            if let Some(out) = &output {
                ccx_core::io::write_json_pretty(out, &report)?;
                if !json {
                    println!(
                        "Wrote {} record types ({} records) to {}",
                        report.types.len(),
                        report.total_records,
                        out.display()
                    );
                    return Ok(());
                }
            }
            if json {
                return print_json(&report);
            }
            let rows = report
                .types
                .iter()
                .map(|(kind, s)| vec![kind.clone(), s.count.to_string(), s.required_keys.join(",")])
                .collect();
            print_table(&["TYPE", "COUNT", "REQUIRED KEYS"], rows);
            Ok(())
        }
        ProjectsSubcommand::Events {
            dir,
            output,
            max_files,
        } => {
            let files = log_files(&dir.unwrap_or(default_dir), max_files)?;
            let written = match &output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        ccx_core::io::ensure_dir(parent)?;
                    }
                    let file = std::fs::File::create(path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    let mut w = BufWriter::new(file);
                    let n = normalize::write_normalized(files, &mut w)?;
                    w.flush()?;
                    n
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut w = BufWriter::new(stdout.lock());
                    let n = normalize::write_normalized(files, &mut w)?;
                    w.flush()?;
                    n
                }
            };
            if let Some(path) = output {
                if json {
                    print_json(&serde_json::json!({ "rows": written, "path": path }))?;
                } else {
                    println!("Wrote {written} events to {}", path.display());
                }
            }
            Ok(())
        }
    }
}

/// `*.jsonl` below `dir`, optionally only the `max` most recent.
pub(crate) fn log_files(dir: &Path, max: Option<usize>) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("directory not found: {}", dir.display());
    }
    let files = claude_log::find_jsonl_files(dir, true)
        .with_context(|| format!("failed to scan {}", dir.display()))?;
    let mut files = ccx_core::projects::dataset::newest_first(files);
    if let Some(n) = max.filter(|&n| n > 0) {
        files.truncate(n);
    }
    Ok(files)
}
