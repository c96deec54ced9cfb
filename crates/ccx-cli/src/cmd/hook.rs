use crate::output::{print_json, print_table};
use ccx_core::config::Config;
use ccx_core::hooks::{builtin_registry, HookEvent, HookPayload, HookRegistry, HookReport};
use clap::Subcommand;
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;

#[derive(Subcommand)]
pub enum HookSubcommand {
    /// Run one handler by name against the payload on stdin
    Run {
        /// Handler name (see `ccx hook list`)
        name: String,
    },

    /// Run every handler subscribed to the payload's event
    Dispatch {
        /// Event name; overrides `hook_event_name` from the payload
        #[arg(long)]
        event: Option<HookEvent>,
    },

    /// List built-in handlers and the events they handle
    List,
}

pub fn run(claude_dir: &Path, subcmd: HookSubcommand, json: bool) -> anyhow::Result<()> {
    // A broken config must not break the assistant: fall back to defaults.
    let config = Config::load(claude_dir).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });
    let registry = builtin_registry(&config.hooks, claude_dir);

    match subcmd {
        HookSubcommand::List => list(&registry, json),
        HookSubcommand::Run { name } => {
            let Some(payload) = read_payload()? else {
                return Ok(());
            };
            let report = registry.run_one(&name, &payload)?;
            emit(&report)
        }
        HookSubcommand::Dispatch { event } => {
            let Some(payload) = read_payload()? else {
                return Ok(());
            };
            let Some(event) = event.or_else(|| payload.event()) else {
                warn!(
                    event = payload.hook_event_name.as_deref().unwrap_or(""),
                    "payload has no known hook event, allowing"
                );
                return Ok(());
            };
            emit(&registry.dispatch(event, &payload))
        }
    }
}

/// Payload from stdin. Empty or malformed input means "allow".
fn read_payload() -> anyhow::Result<Option<HookPayload>> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    if input.trim().is_empty() {
        return Ok(None);
    }
    match HookPayload::from_json(&input) {
        Ok(p) => Ok(Some(p)),
        Err(e) => {
            warn!(error = %e, "malformed hook payload, allowing");
            Ok(None)
        }
    }
}

/// Write the report in the hook protocol: context JSON on stdout, block
/// reason and warnings on stderr, exit 2 when blocked.
fn emit(report: &HookReport) -> anyhow::Result<()> {
    if let Some(out) = report.output() {
        println!("{}", serde_json::to_string(&out)?);
    }
    let stderr = report.stderr_text();
    if !stderr.is_empty() {
        eprintln!("{stderr}");
    }
    let code = report.exit_code();
    if code != 0 {
        std::io::stdout().flush()?;
        std::process::exit(code);
    }
    Ok(())
}

fn list(registry: &HookRegistry, json: bool) -> anyhow::Result<()> {
    if json {
        let out: Vec<_> = registry
            .handlers()
            .map(|h| {
                serde_json::json!({
                    "name": h.name(),
                    "events": h.events().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
                    "description": h.description(),
                })
            })
            .collect();
        return print_json(&out);
    }
    let rows = registry
        .handlers()
        .map(|h| {
            let events: Vec<String> = h.events().iter().map(|e| e.to_string()).collect();
            vec![h.name().to_string(), events.join(","), h.description().to_string()]
        })
        .collect();
    print_table(&["NAME", "EVENTS", "DESCRIPTION"], rows);
    Ok(())
}
