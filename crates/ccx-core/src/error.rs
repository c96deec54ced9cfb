use thiserror::Error;

#[derive(Debug, Error)]
pub enum CcxError {
    #[error("transcripts directory not found: {0}")]
    TranscriptsDirNotFound(String),

    #[error("transcript not found: {0}")]
    TranscriptNotFound(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("directory not found: {0}")]
    DirNotFound(String),

    #[error("output already exists: {0} (pass --overwrite to replace it)")]
    OutputExists(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid session id '{0}': must be alphanumeric with '-' or '_'")]
    InvalidSessionId(String),

    #[error("unknown hook: {0}")]
    UnknownHook(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Log(#[from] claude_log::ClaudeLogError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CcxError>;
