use crate::error::Result;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize)]
pub struct ChunkStats {
    pub chunk: usize,
    pub path: PathBuf,
    pub rows: usize,
    pub size_mb: f64,
    /// Distinct sessions; 0 unless chunking by session.
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub input_file: PathBuf,
    pub input_size_bytes: u64,
    pub chunk_size_mb: u64,
    pub by_session: bool,
    pub total_rows: usize,
    pub total_chunks: usize,
    pub chunks: Vec<ChunkStats>,
    pub started_at: String,
    pub completed_at: String,
}

struct OpenChunk {
    number: usize,
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
    rows: usize,
    sessions: HashSet<String>,
}

impl OpenChunk {
    fn create(out_dir: &Path, stem: &str, number: usize) -> Result<Self> {
        let path = out_dir.join(format!("{stem}_chunk_{number:04}.jsonl"));
        debug!(path = %path.display(), "opening chunk");
        Ok(Self {
            number,
            writer: BufWriter::new(File::create(&path)?),
            path,
            size: 0,
            rows: 0,
            sessions: HashSet::new(),
        })
    }

    fn finish(mut self, by_session: bool) -> Result<ChunkStats> {
        self.writer.flush()?;
        Ok(ChunkStats {
            chunk: self.number,
            path: self.path,
            rows: self.rows,
            size_mb: self.size as f64 / MB,
            sessions: if by_session { self.sessions.len() } else { 0 },
        })
    }
}

fn session_of(line: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(v) => match v.get("session_id") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Err(_) => String::new(),
    }
}

/// Split a JSONL file into `<stem>_chunk_NNNN.jsonl` files of roughly
/// `chunk_mb` each, and write `<stem>_chunks_stats.json`.
///
/// Lines are copied byte for byte. With `by_session`, a line whose session
/// already appears in the current chunk stays there even past the size
/// limit.
pub fn chunk_jsonl(
    input: &Path,
    out_dir: &Path,
    chunk_mb: u64,
    by_session: bool,
) -> Result<ChunkReport> {
    crate::io::ensure_dir(out_dir)?;
    let limit = chunk_mb.saturating_mul(1024 * 1024);
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let input_size_bytes = std::fs::metadata(input)?.len();
    let started_at = Utc::now().to_rfc3339();

    let mut reader = BufReader::new(File::open(input)?);
    let mut chunks = Vec::new();
    let mut current = OpenChunk::create(out_dir, &stem, 1)?;
    let mut total_rows = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        let size = line.len() as u64;
        let session = if by_session {
            session_of(&String::from_utf8_lossy(&line))
        } else {
            String::new()
        };

        let stays = by_session && current.sessions.contains(&session);
        if current.rows > 0 && current.size + size > limit && !stays {
            let next = OpenChunk::create(out_dir, &stem, current.number + 1)?;
            chunks.push(std::mem::replace(&mut current, next).finish(by_session)?);
        }

        current.writer.write_all(&line)?;
        current.size += size;
        current.rows += 1;
        if by_session && !session.is_empty() {
            current.sessions.insert(session);
        }
        total_rows += 1;
    }
    chunks.push(current.finish(by_session)?);

    let report = ChunkReport {
        input_file: input.to_path_buf(),
        input_size_bytes,
        chunk_size_mb: chunk_mb,
        by_session,
        total_rows,
        total_chunks: chunks.len(),
        chunks,
        started_at,
        completed_at: Utc::now().to_rfc3339(),
    };
    crate::io::write_json_pretty(&out_dir.join(format!("{stem}_chunks_stats.json")), &report)?;
    info!(chunks = report.total_chunks, rows = total_rows, "chunking complete");
    Ok(report)
}
