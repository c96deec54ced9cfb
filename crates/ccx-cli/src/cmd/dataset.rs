use crate::cmd::load_config;
use crate::output::{print_json, print_table};
use anyhow::Context;
use ccx_core::paths;
use ccx_core::projects::{chunk, dataset, tool_calls, trajectory};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum DatasetSubcommand {
    /// One JSONL row per tool call, with the conversation that led to it
    Build {
        /// Logs directory (default: <claude-dir>/projects)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Output JSONL file; stats go to <output>.stats.json
        #[arg(short, long)]
        output: PathBuf,
        /// Only the N most recently modified log files
        #[arg(long)]
        max_files: Option<usize>,
        /// Stop after N rows
        #[arg(long)]
        max_rows: Option<usize>,
        /// Context messages kept per row (default from config)
        #[arg(long)]
        max_context: Option<usize>,
    },

    /// Group dataset rows into per-session trajectories with rewards
    Trajectories {
        /// Dataset JSONL produced by `dataset build`
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Skip sessions with fewer tool calls
        #[arg(long, default_value_t = trajectory::DEFAULT_MIN_LENGTH)]
        min_length: usize,
        /// Keep at most this many tool calls per trajectory
        #[arg(long, default_value_t = trajectory::DEFAULT_MAX_LENGTH)]
        max_length: usize,
    },

    /// Split a large JSONL file into size-bounded chunks
    Chunk {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        /// Target chunk size in MB
        #[arg(long, default_value_t = 100)]
        chunk_mb: u64,
        /// Don't split a session across chunks
        #[arg(long)]
        by_session: bool,
    },

    /// Flatten transcript tool_use/tool_result lines into one JSONL file
    ToolCalls {
        /// Transcripts directory (default from config)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// First character of the tool output snippet
        #[arg(long, default_value_t = tool_calls::DEFAULT_SNIPPET_START)]
        snippet_start: usize,
        /// Snippet length in characters (default or 0: to the end)
        #[arg(long)]
        snippet_len: Option<usize>,
        /// Replace an existing output file
        #[arg(long)]
        overwrite: bool,
    },
}

pub fn run(claude_dir: &Path, subcmd: DatasetSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(claude_dir)?;
    match subcmd {
        DatasetSubcommand::Build {
            dir,
            output,
            max_files,
            max_rows,
            max_context,
        } => {
            let dir = dir.unwrap_or_else(|| paths::projects_dir(claude_dir));
            let files = super::projects::log_files(&dir, None)?;
            let opts = dataset::DatasetOptions {
                max_files,
                max_rows,
                max_context_messages: max_context.unwrap_or(config.dataset.max_context_messages),
            };
            let stats = dataset::build_dataset(files, &output, &opts)
                .with_context(|| format!("failed to build dataset at {}", output.display()))?;
            if json {
                return print_json(&stats);
            }
            println!(
                "Wrote {} rows from {} files to {}",
                stats.rows,
                stats.files,
                output.display()
            );
            let mut counts: Vec<_> = stats.tool_name_counts.iter().collect();
            counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            let rows = counts
                .into_iter()
                .take(10)
                .map(|(name, n)| vec![name.clone(), n.to_string()])
                .collect();
            print_table(&["TOOL", "ROWS"], rows);
            Ok(())
        }
        DatasetSubcommand::Trajectories {
            input,
            output,
            min_length,
            max_length,
        } => {
            let stats = trajectory::convert_dataset(
                &input,
                &output,
                min_length,
                max_length,
                &config.dataset.reward_weights,
            )
            .with_context(|| format!("failed to convert {}", input.display()))?;
            if json {
                return print_json(&stats);
            }
            println!(
                "{} trajectories from {} sessions ({} skipped), {} rows read",
                stats.trajectories, stats.sessions, stats.skipped, stats.input_rows
            );
            println!(
                "Average tool calls {:.1}, average reward {:.3}",
                stats.avg_tool_calls, stats.avg_reward
            );
            Ok(())
        }
        DatasetSubcommand::Chunk {
            input,
            out_dir,
            chunk_mb,
            by_session,
        } => {
            if chunk_mb == 0 {
                anyhow::bail!("--chunk-mb must be at least 1");
            }
            let report = chunk::chunk_jsonl(&input, &out_dir, chunk_mb, by_session)
                .with_context(|| format!("failed to chunk {}", input.display()))?;
            if json {
                return print_json(&report);
            }
            let rows = report
                .chunks
                .iter()
                .map(|c| {
                    vec![
                        c.chunk.to_string(),
                        c.rows.to_string(),
                        format!("{:.2}", c.size_mb),
                        c.path.display().to_string(),
                    ]
                })
                .collect();
            print_table(&["CHUNK", "ROWS", "MB", "PATH"], rows);
            println!("{} rows in {} chunks", report.total_rows, report.total_chunks);
            Ok(())
        }
        DatasetSubcommand::ToolCalls {
            dir,
            output,
            snippet_start,
            snippet_len,
            overwrite,
        } => {
            let dir = dir.unwrap_or_else(|| config.transcripts_dir(claude_dir));
            let snippet = tool_calls::SnippetRange {
                start: snippet_start,
                len: snippet_len,
            };
            let n = tool_calls::extract_tool_calls(&dir, &output, snippet, overwrite)?;
            if json {
                print_json(&serde_json::json!({ "records": n, "path": output }))
            } else {
                println!("Wrote {n} tool records to {}", output.display());
                Ok(())
            }
        }
    }
}
