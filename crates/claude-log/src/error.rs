use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse record at {path}:{line}: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("log directory not found: {0}")]
    DirNotFound(String),
}
