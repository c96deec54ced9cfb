use crate::error::ClaudeLogError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Line-oriented JSONL reader that never fails mid-file.
///
/// Blank lines are skipped silently. Lines that are not valid JSON, or that
/// hold a JSON value other than an object, are skipped with a `warn!`. A read
/// error ends iteration.
pub struct JsonlReader<R> {
    lines: Lines<BufReader<R>>,
    path: String,
    line_number: usize,
}

impl<R: Read> JsonlReader<R> {
    pub fn new(inner: R, path: impl Into<String>) -> Self {
        Self {
            lines: BufReader::new(inner).lines(),
            path: path.into(),
            line_number: 0,
        }
    }

    /// Deserialize every object into `T`, skipping records that don't fit.
    pub fn typed<T: DeserializeOwned>(self) -> impl Iterator<Item = (usize, T)> {
        let path = self.path.clone();
        self.filter_map(move |(line, value)| match serde_json::from_value::<T>(value) {
            Ok(t) => Some((line, t)),
            Err(e) => {
                debug!(path = %path, line, error = %e, "record does not match expected shape");
                None
            }
        })
    }
}

impl<R: Read> Iterator for JsonlReader<R> {
    /// `(1-based line number, parsed object)`
    type Item = (usize, Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => {
                    warn!(
                        path = %self.path,
                        line = self.line_number + 1,
                        error = %e,
                        "read failed; stopping"
                    );
                    return None;
                }
            };
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse_line::<Value>(&self.path, self.line_number, trimmed) {
                Ok(v) if v.is_object() => return Some((self.line_number, v)),
                Ok(_) => {
                    debug!(path = %self.path, line = self.line_number, "skipping non-object line");
                }
                Err(e) => warn!("{e}"),
            }
        }
    }
}

/// Open `path` for line-by-line JSONL iteration.
pub fn iter_jsonl(path: &Path) -> Result<JsonlReader<File>> {
    let file = File::open(path)?;
    Ok(JsonlReader::new(file, path.display().to_string()))
}

/// Parse one JSONL line, attaching its location to the error.
pub fn parse_line<T: DeserializeOwned>(path: &str, line: usize, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|source| ClaudeLogError::Parse {
        path: path.to_string(),
        line,
        source,
    })
}

/// All `*.jsonl` files under `dir`, sorted by path.
///
/// With `recursive` the whole tree is walked (project logs nest one level per
/// project); otherwise only direct children are returned.
pub fn find_jsonl_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ClaudeLogError::DirNotFound(dir.display().to_string()));
    }
    let mut out = Vec::new();
    collect_jsonl(dir, recursive, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_jsonl(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if recursive {
                collect_jsonl(&path, recursive, out)?;
            }
        } else if path.extension().is_some_and(|e| e == "jsonl") {
            out.push(path);
        }
    }
    Ok(())
}
