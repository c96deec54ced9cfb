//! Flat `ses_<id>.jsonl` transcripts: parsing, browsing, ranked search,
//! export and cross-conversation analytics.

pub mod analytics;
pub mod explorer;
pub mod export;
pub mod models;
pub mod parser;
pub mod search;

pub use explorer::{ContentMatch, Explorer, SortKey};
pub use export::{export_conversation, ExportFormat};
pub use models::{
    Conversation, ConversationMetadata, ConversationStats, Message, MessageType, SearchFilter,
    ToolCall, ToolStatus,
};
pub use parser::{parse_transcript, transcript_metadata};
pub use search::{SearchHit, TranscriptIndex};
