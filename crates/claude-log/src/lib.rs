//! Typed access to the JSONL logs Claude Code writes under
//! `~/.claude`.
//!
//! Two log families are covered:
//!
//! - **Project logs** (`~/.claude/projects/<project>/<session>.jsonl`): one
//!   record per line, tagged by `type` (`user`, `assistant`, `system`,
//!   `summary`, ...). User and assistant records carry a `message` whose
//!   `content` is either a plain string or a list of content blocks.
//! - **Transcripts** (`~/.claude/transcripts/ses_<id>.jsonl`): flat records
//!   with `type`, `timestamp` and tool fields inline.
//!
//! ```text
//! *.jsonl ──► JsonlReader ──► serde_json::Value ──► LogRecord ──► Event
//!              (skips bad lines)                    (typed)       (message / tool_use / tool_result)
//! ```

pub mod error;
pub mod events;
pub mod reader;
pub mod types;


pub use error::ClaudeLogError;
pub use events::{
    extract_events, extract_events_from_value, iter_project_events, Event, EventKind, EventMeta,
};
pub use reader::{find_jsonl_files, iter_jsonl, parse_line, JsonlReader};
pub use types::{
    parse_timestamp, ContentBlock, ConversationEntry, LogRecord, MessageBody, MessageContent,
    ToolResultContent, TranscriptLine,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeLogError>;
