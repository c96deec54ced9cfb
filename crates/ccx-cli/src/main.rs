mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, conv::ConvSubcommand, dataset::DatasetSubcommand,
    hook::HookSubcommand, projects::ProjectsSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ccx",
    about = "Claude Code workspace toolkit: transcripts, session-log datasets, hooks and cleanup",
    version,
    propagate_version = true
)]
struct Cli {
    /// Claude data directory (default: ~/.claude)
    #[arg(long, global = true, env = "CCX_CLAUDE_DIR")]
    claude_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse, search and analyze conversation transcripts
    Conv {
        #[command(subcommand)]
        subcommand: ConvSubcommand,
    },

    /// Inspect the raw session logs under projects/
    Projects {
        #[command(subcommand)]
        subcommand: ProjectsSubcommand,
    },

    /// Build tool-use datasets and trajectories from session logs
    Dataset {
        #[command(subcommand)]
        subcommand: DatasetSubcommand,
    },

    /// Run hook handlers (reads the hook payload from stdin)
    Hook {
        #[command(subcommand)]
        subcommand: HookSubcommand,
    },

    /// Archive and delete old workspace data (dry run unless --execute)
    Cleanup {
        /// Actually archive and delete
        #[arg(long)]
        execute: bool,
        /// Retention period in days (default from config)
        #[arg(long)]
        days: Option<u32>,
        /// Archive root; a dated subdirectory is created per run
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Summarize a shell snapshot file
    Snapshot {
        /// Snapshot file (e.g. ~/.claude/shell-snapshots/snapshot-zsh-*.sh)
        file: PathBuf,
        /// Maximum names listed per kind
        #[arg(long, default_value_t = ccx_core::snapshot::DEFAULT_MAX_NAMES)]
        max_names: usize,
    },

    /// Check required tools and environment variables (hooks.env_check)
    Env,

    /// Show, validate or create ccx.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = root::resolve_claude_dir(cli.claude_dir.as_deref()).and_then(|claude_dir| {
        match cli.command {
            Commands::Conv { subcommand } => cmd::conv::run(&claude_dir, subcommand, cli.json),
            Commands::Projects { subcommand } => {
                cmd::projects::run(&claude_dir, subcommand, cli.json)
            }
            Commands::Dataset { subcommand } => {
                cmd::dataset::run(&claude_dir, subcommand, cli.json)
            }
            Commands::Hook { subcommand } => cmd::hook::run(&claude_dir, subcommand, cli.json),
            Commands::Cleanup {
                execute,
                days,
                archive_dir,
            } => cmd::cleanup::run(&claude_dir, execute, days, archive_dir, cli.json),
            Commands::Snapshot { file, max_names } => {
                cmd::snapshot::run(&file, max_names, cli.json)
            }
            Commands::Env => cmd::env::run(&claude_dir, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&claude_dir, subcommand, cli.json),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
