use crate::error::Result;
use crate::format::format_duration;
use crate::transcript::models::Conversation;
use chrono::{DateTime, Utc};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            other => Err(format!("unknown export format '{other}'; valid: json, txt")),
        }
    }
}

/// `{metadata, messages, tool_calls}` as pretty JSON.
pub fn render_json(conv: &Conversation) -> Result<String> {
    Ok(serde_json::to_string_pretty(conv)?)
}

/// Plain-text transcript: a header block, then one numbered section per
/// message.
pub fn render_text(conv: &Conversation) -> String {
    let meta = &conv.metadata;
    let mut out = String::new();
    let _ = writeln!(out, "Conversation: {}", meta.session_id);
    let _ = writeln!(out, "File: {}", meta.file_path.display());
    let _ = writeln!(
        out,
        "Started: {}",
        meta.start_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    );
    let _ = writeln!(out, "Duration: {}", format_duration(meta.duration_seconds));
    let _ = writeln!(
        out,
        "Messages: {}  Tool calls: {}",
        conv.messages.len(),
        conv.tool_calls.len()
    );
    let _ = writeln!(out, "{}", "=".repeat(60));

    for (i, msg) in conv.messages.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "[{}] {} @ {}",
            i + 1,
            msg.message_type.as_str().to_uppercase(),
            msg.timestamp.format("%H:%M:%S")
        );
        let _ = writeln!(out, "{}", "-".repeat(40));
        let _ = writeln!(out, "{}", msg.text());
    }
    out
}

/// `conversation_<first 8 of id>_<YYYYmmdd_HHMMSS>.<ext>`
pub fn default_filename(conv: &Conversation, format: ExportFormat, now: DateTime<Utc>) -> String {
    let short: String = conv.metadata.session_id.chars().take(8).collect();
    format!(
        "conversation_{short}_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write the export to `output`, or to the default filename inside `dir`.
pub fn export_conversation(
    conv: &Conversation,
    format: ExportFormat,
    output: Option<&Path>,
    dir: &Path,
) -> Result<PathBuf> {
    let path = match output {
        Some(p) => p.to_path_buf(),
        None => dir.join(default_filename(conv, format, Utc::now())),
    };
    let body = match format {
        ExportFormat::Json => render_json(conv)?,
        ExportFormat::Text => render_text(conv),
    };
    crate::io::atomic_write(&path, body.as_bytes())?;
    Ok(path)
}
