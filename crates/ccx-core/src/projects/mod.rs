//! Pipeline over the raw session logs under `~/.claude/projects`: size
//! index, schema discovery, normalized events, tool-use datasets,
//! trajectories and chunking. Also flattens tool lines out of transcripts.

pub mod chunk;
pub mod dataset;
pub mod index;
pub mod normalize;
pub mod schema;
pub mod tool_calls;
pub mod trajectory;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `path` with `suffix` appended to its full file name
/// (`rows.jsonl` → `rows.jsonl.stats.json`).
pub fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
