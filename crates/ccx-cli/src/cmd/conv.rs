use crate::cmd::load_config;
use crate::output::{print_json, print_table, short_time};
use anyhow::Context;
use ccx_core::format::{ellipsize, format_duration, format_size};
use ccx_core::transcript::{
    analytics, export_conversation, ConversationMetadata, ExportFormat, Explorer, SearchFilter,
    SortKey,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::Subcommand;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConvSubcommand {
    /// List conversations
    List {
        /// Maximum number of conversations (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Sort key: timestamp, duration, messages or size
        #[arg(long, default_value = "timestamp")]
        sort: SortKey,
        /// Smallest / oldest first
        #[arg(long)]
        asc: bool,
    },

    /// Show one conversation
    Show {
        /// Session id or id prefix
        session_id: String,
        /// Messages to print (0 = all)
        #[arg(long, default_value_t = 20)]
        messages: usize,
    },

    /// Filter conversations by date, duration, size, text, tools or errors
    Filter {
        /// Started on or after (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Started on or before (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        until: Option<String>,
        /// Minimum duration in seconds
        #[arg(long)]
        min_duration: Option<f64>,
        /// Maximum duration in seconds
        #[arg(long)]
        max_duration: Option<f64>,
        #[arg(long)]
        min_messages: Option<usize>,
        #[arg(long)]
        max_messages: Option<usize>,
        /// Case-insensitive text that must appear in a message
        #[arg(long)]
        text: Option<String>,
        /// Keep conversations using any of these tools (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,
        /// Only conversations with a failed tool call
        #[arg(long, conflicts_with = "no_errors")]
        errors: bool,
        /// Only conversations without failed tool calls
        #[arg(long)]
        no_errors: bool,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Regex search over raw transcript text
    Grep {
        pattern: String,
        #[arg(long)]
        case_sensitive: bool,
    },

    /// Ranked full-text search over message text and tool names
    ///
    /// Supports AND/OR/NOT, phrase queries ("exact phrase") and field
    /// scoping (tools:Bash).
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Totals, tool usage and activity by date
    Stats,

    /// Conversations started in the last N days
    Recent {
        #[arg(long, default_value_t = 7)]
        days: i64,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Conversations that used any of the given tools
    Tools {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Tool patterns, temporal patterns, clusters and complexity
    Analyze {
        /// Maximum gap between starts within a cluster
        #[arg(long, default_value_t = 2)]
        gap_hours: i64,
    },

    /// Export one conversation as JSON or text
    Export {
        session_id: String,
        /// json or txt
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Output file (default: conversation_<id>_<timestamp>.<ext> in --dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(claude_dir: &Path, subcmd: ConvSubcommand, json: bool) -> anyhow::Result<()> {
    let config = load_config(claude_dir)?;
    let mut explorer = Explorer::open(&config.transcripts_dir(claude_dir))?;

    match subcmd {
        ConvSubcommand::List { limit, sort, asc } => {
            let limit = limit.unwrap_or(config.explorer.default_limit);
            let metas = explorer
                .list(Some(limit), sort, !asc)
                .context("failed to list conversations")?;
            print_metas(&metas, json)
        }
        ConvSubcommand::Show {
            session_id,
            messages,
        } => show(&explorer, &session_id, messages, json),
        ConvSubcommand::Filter {
            since,
            until,
            min_duration,
            max_duration,
            min_messages,
            max_messages,
            text,
            tools,
            errors,
            no_errors,
            limit,
        } => {
            let filter = SearchFilter {
                text_query: text,
                start_date: since.as_deref().map(|s| parse_date(s, false)).transpose()?,
                end_date: until.as_deref().map(|s| parse_date(s, true)).transpose()?,
                min_duration,
                max_duration,
                tools_used: tools,
                min_messages,
                max_messages,
                has_errors: match (errors, no_errors) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            let metas = explorer.search(&filter, limit)?;
            print_metas(&metas, json)
        }
        ConvSubcommand::Grep {
            pattern,
            case_sensitive,
        } => grep(&mut explorer, &pattern, case_sensitive, json),
        ConvSubcommand::Search { query, limit } => {
            let hits = explorer.ranked_search(&query, limit)?;
            if json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No matches.");
                return Ok(());
            }
            let rows = hits
                .iter()
                .map(|h| vec![h.session_id.clone(), h.started.clone(), format!("{:.2}", h.score)])
                .collect();
            print_table(&["SESSION", "STARTED", "SCORE"], rows);
            Ok(())
        }
        ConvSubcommand::Stats => stats(&mut explorer, json),
        ConvSubcommand::Recent { days, limit } => {
            let metas = explorer.recent(days, limit)?;
            print_metas(&metas, json)
        }
        ConvSubcommand::Tools { names } => {
            let metas = explorer.with_tools(&names)?;
            print_metas(&metas, json)
        }
        ConvSubcommand::Analyze { gap_hours } => analyze(&mut explorer, gap_hours, json),
        ConvSubcommand::Export {
            session_id,
            format,
            output,
            dir,
        } => {
            let conv = explorer
                .get(&session_id)?
                .ok_or_else(|| anyhow::anyhow!("conversation not found: {session_id}"))?;
            let path = export_conversation(&conv, format, output.as_deref(), &dir)
                .context("failed to write export")?;
            if json {
                print_json(&serde_json::json!({ "path": path }))
            } else {
                println!("Exported {} to {}", conv.metadata.session_id, path.display());
                Ok(())
            }
        }
    }
}

/// `YYYY-MM-DD` (start or end of that day, UTC) or a full RFC 3339 time.
fn parse_date(s: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}': expected YYYY-MM-DD or RFC 3339"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .context("invalid time of day")?;
    Ok(day.and_time(time).and_utc())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_metas(metas: &[ConversationMetadata], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&metas);
    }
    if metas.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }
    let rows = metas
        .iter()
        .map(|m| {
            vec![
                m.session_id.clone(),
                short_time(m.start_time),
                format_duration(m.duration_seconds),
                m.message_count.to_string(),
                m.tool_call_count.to_string(),
                format_size(m.file_size_bytes),
            ]
        })
        .collect();
    print_table(&["SESSION", "STARTED", "DURATION", "MESSAGES", "TOOLS", "SIZE"], rows);
    Ok(())
}

fn show(explorer: &Explorer, session_id: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let conv = explorer
        .get(session_id)?
        .ok_or_else(|| anyhow::anyhow!("conversation not found: {session_id}"))?;
    if json {
        return print_json(&conv);
    }

    let m = &conv.metadata;
    println!("Session:   {}", m.session_id);
    println!("File:      {}", m.file_path.display());
    println!("Started:   {}", short_time(m.start_time));
    println!("Duration:  {}", format_duration(m.duration_seconds));
    println!(
        "Messages:  {} ({} user, {} assistant)",
        conv.messages.len(),
        conv.user_message_count(),
        conv.assistant_message_count()
    );
    println!("Tools:     {}", conv.unique_tools().into_iter().collect::<Vec<_>>().join(", "));
    println!();

    let shown = if limit == 0 { conv.messages.len() } else { limit };
    for msg in conv.messages.iter().take(shown) {
        println!(
            "[{}] {}: {}",
            msg.timestamp.format("%H:%M:%S"),
            msg.message_type.as_str(),
            ellipsize(&msg.text().replace('\n', " "), 160)
        );
    }
    if conv.messages.len() > shown {
        println!("... {} more messages", conv.messages.len() - shown);
    }
    Ok(())
}

fn grep(
    explorer: &mut Explorer,
    pattern: &str,
    case_sensitive: bool,
    json: bool,
) -> anyhow::Result<()> {
    let matches = explorer.search_content(pattern, case_sensitive)?;
    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    let rows = matches
        .iter()
        .map(|m| {
            vec![
                m.metadata.session_id.clone(),
                m.match_count.to_string(),
                ellipsize(&m.first_match, 80),
            ]
        })
        .collect();
    print_table(&["SESSION", "MATCHES", "FIRST MATCH"], rows);
    Ok(())
}

fn stats(explorer: &mut Explorer, json: bool) -> anyhow::Result<()> {
    let stats = explorer.stats().context("failed to compute stats")?;
    if json {
        return print_json(&stats);
    }
    println!("Conversations:  {}", stats.total_conversations);
    println!("Messages:       {}", stats.total_messages);
    println!("Tool calls:     {}", stats.total_tool_calls);
    println!("Unique tools:   {}", stats.unique_tools_used.len());
    println!("Avg duration:   {}", format_duration(stats.average_duration));
    if let Some(range) = &stats.date_range {
        println!(
            "Date range:     {} .. {}",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        );
    }
    if !stats.tool_usage_counts.is_empty() {
        println!();
        let mut usage: Vec<_> = stats.tool_usage_counts.iter().collect();
        usage.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let rows = usage
            .into_iter()
            .take(15)
            .map(|(tool, n)| vec![tool.clone(), n.to_string()])
            .collect();
        print_table(&["TOOL", "CALLS"], rows);
    }
    Ok(())
}

fn analyze(explorer: &mut Explorer, gap_hours: i64, json: bool) -> anyhow::Result<()> {
    let conversations = explorer.load_all()?;
    let metas: Vec<ConversationMetadata> =
        conversations.iter().map(|c| c.metadata.clone()).collect();

    let tools = analytics::tool_patterns(&conversations);
    let temporal = analytics::temporal_patterns(&metas);
    let clusters = analytics::conversation_clusters(&metas, gap_hours);
    let complexity = analytics::complexity(&conversations);

    if json {
        return print_json(&serde_json::json!({
            "tool_patterns": tools,
            "temporal_patterns": temporal,
            "clusters": clusters,
            "complexity": complexity,
        }));
    }

    println!("Tool sequences:");
    for s in &tools.common_sequences {
        println!("  {} -> {}  ({})", s.first, s.second, s.count);
    }
    println!("Tool success rates:");
    for (tool, r) in &tools.success_rates {
        println!("  {tool}: {:.1}% ({}/{})", r.rate, r.successful, r.total);
    }
    println!();
    println!(
        "Peak hour: {}   Peak day: {}",
        temporal.peak_hour.map(|h| format!("{h:02}:00")).unwrap_or_else(|| "-".to_string()),
        temporal.peak_day.as_deref().unwrap_or("-")
    );
    for b in &temporal.duration_buckets {
        println!("  {:<10} {}", b.label, b.count);
    }
    println!();
    println!("Clusters ({} within {gap_hours}h):", clusters.len());
    for c in &clusters {
        println!(
            "  {} .. {}  {} conversations",
            c.start.format("%Y-%m-%d %H:%M"),
            c.end.format("%H:%M"),
            c.size
        );
    }
    println!();
    println!(
        "Complexity: {:.1} tools/conv, {:.1} messages/conv, {} with errors ({:.1}%)",
        complexity.avg_tools_per_conversation,
        complexity.avg_messages_per_conversation,
        complexity.conversations_with_errors,
        complexity.error_rate
    );
    for s in &complexity.most_complex {
        println!("  {}  score {:.1}", s.session_id, s.score);
    }
    Ok(())
}
