use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `data` through a tempfile in the target directory, then rename
/// over `path`. Readers never see a half-written config or marker.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    atomic_write(path, &data)
}

/// Append one JSON line to `path`, creating the file and its parents.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(&line)?;
    Ok(())
}

/// Write `value` as a single JSONL line to an open writer.
pub fn write_jsonl_line<W: Write, T: Serialize>(w: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *w, value)?;
    w.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ccx/sessions/s1.map");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn json_pretty_ends_with_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.jsonl.stats.json");
        write_json_pretty(&path, &serde_json::json!({"rows": 3})).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\n  \"rows\": 3\n}\n");
    }

    #[test]
    fn append_jsonl_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/hooks.jsonl");
        append_jsonl(&path, &serde_json::json!({"n": 1})).unwrap();
        append_jsonl(&path, &serde_json::json!({"n": 2})).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[test]
    fn write_jsonl_line_terminates_with_newline() {
        let mut buf = Vec::new();
        write_jsonl_line(&mut buf, &serde_json::json!({"a": "b"})).unwrap();
        assert_eq!(buf, b"{\"a\":\"b\"}\n");
    }
}
