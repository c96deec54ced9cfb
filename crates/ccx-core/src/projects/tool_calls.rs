use crate::error::{CcxError, Result};
use claude_log::TranscriptLine;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_SNIPPET_START: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    /// File stem of the transcript.
    pub session_id: String,
    pub source_file: PathBuf,
    pub line_number: usize,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tool_name: Option<String>,
    pub tool_input: Value,
    pub tool_output: Value,
    /// `tool_output` as JSON text (`", "` and `": "` separators, non-ASCII
    /// escaped), sliced by character offset.
    pub tool_output_snippet: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SnippetRange {
    pub start: usize,
    /// `None` or `Some(0)` keeps everything after `start`.
    pub len: Option<usize>,
}

impl Default for SnippetRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_SNIPPET_START,
            len: None,
        }
    }
}

impl SnippetRange {
    pub fn apply(&self, output: &Value) -> String {
        if output.is_null() {
            return String::new();
        }
        let text = spaced_json(output);
        let rest = text.chars().skip(self.start);
        match self.len.filter(|&n| n > 0) {
            Some(n) => rest.take(n).collect(),
            None => rest.collect(),
        }
    }
}

/// Single-line JSON with a space after `,` and `:` and every character
/// outside printable ASCII written as `\uXXXX`, the text most JSON tooling
/// in Python produces by default.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, w: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            w.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, w: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            w.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, w: &mut W, s: &str) -> io::Result<()> {
        for c in s.chars() {
            if c.is_ascii() && c != '\x7f' {
                w.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut [0; 2]) {
                    write!(w, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

pub fn spaced_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let written = {
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        value.serialize(&mut ser).is_ok()
    };
    match String::from_utf8(buf) {
        Ok(text) if written => text,
        _ => value.to_string(),
    }
}

fn transcript_files(input_dir: &Path, exclude: &Path) -> Result<Vec<PathBuf>> {
    let files = claude_log::find_jsonl_files(input_dir, false)?;
    Ok(files.into_iter().filter(|p| p != exclude).collect())
}

/// Flatten every `tool_use`/`tool_result` line of the transcripts in
/// `input_dir` into `out`. Returns the number of records written.
pub fn extract_tool_calls(
    input_dir: &Path,
    out: &Path,
    snippet: SnippetRange,
    overwrite: bool,
) -> Result<usize> {
    if out.exists() && !overwrite {
        return Err(CcxError::OutputExists(out.display().to_string()));
    }
    let files = transcript_files(input_dir, out)?;
    if files.is_empty() {
        warn!(dir = %input_dir.display(), "no transcript files found");
    }

    if let Some(parent) = out.parent() {
        crate::io::ensure_dir(parent)?;
    }
    let mut writer = BufWriter::new(std::fs::File::create(out)?);
    let mut total = 0;
    for path in &files {
        let session_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        for (line_number, line) in claude_log::iter_jsonl(path)?.typed::<TranscriptLine>() {
            if line.kind != "tool_use" && line.kind != "tool_result" {
                continue;
            }
            let record = ToolCallRecord {
                session_id: session_id.clone(),
                source_file: path.clone(),
                line_number,
                timestamp: line.timestamp,
                tool_output_snippet: snippet.apply(&line.tool_output),
                kind: line.kind,
                tool_name: line.tool_name,
                tool_input: line.tool_input,
                tool_output: line.tool_output,
            };
            crate::io::write_jsonl_line(&mut writer, &record)?;
            total += 1;
        }
    }
    writer.flush()?;
    info!(count = total, out = %out.display(), "wrote tool calls");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("ses_a.jsonl"),
            [
                r#"{"type":"user","timestamp":"2025-01-01T00:00:00Z","content":"hi"}"#,
                r#"{"type":"tool_use","timestamp":"2025-01-01T00:00:01Z","tool_name":"grep","tool_input":{"queries":["x"]}}"#,
                "garbage",
                r#"{"type":"tool_result","timestamp":"2025-01-01T00:00:02Z","tool_name":"grep","tool_output":{"matches":"0123456789"}}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn extracts_tool_lines_with_line_numbers() {
        let dir = fixture();
        let out = dir.path().join("tool_calls.jsonl");
        let range = SnippetRange { start: 0, len: None };
        let n = extract_tool_calls(dir.path(), &out, range, false).unwrap();
        assert_eq!(n, 2);

        let rows: Vec<Value> = std::fs::read_to_string(&out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows[0]["session_id"], "ses_a");
        assert_eq!(rows[0]["line_number"], 2);
        assert_eq!(rows[0]["type"], "tool_use");
        assert_eq!(rows[0]["tool_output_snippet"], "");
        assert_eq!(rows[1]["line_number"], 4);
        assert_eq!(rows[1]["tool_output_snippet"], r#"{"matches": "0123456789"}"#);
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = fixture();
        let out = dir.path().join("out.jsonl");
        std::fs::write(&out, "").unwrap();
        let err = extract_tool_calls(dir.path(), &out, SnippetRange::default(), false).unwrap_err();
        assert!(matches!(err, CcxError::OutputExists(_)));
        assert_eq!(
            extract_tool_calls(dir.path(), &out, SnippetRange::default(), true).unwrap(),
            2
        );
    }

    #[test]
    fn snippet_slicing() {
        let output = json!("abcdefghij");
        // JSON text is "\"abcdefghij\"".
        assert_eq!(SnippetRange { start: 1, len: Some(3) }.apply(&output), "abc");
        assert_eq!(SnippetRange { start: 50, len: None }.apply(&output), "");
        assert_eq!(SnippetRange::default().apply(&Value::Null), "");
    }

    #[test]
    fn zero_snippet_len_keeps_the_rest() {
        let output = json!("abcdefghij");
        let zero = SnippetRange { start: 1, len: Some(0) };
        assert_eq!(zero.apply(&output), "abcdefghij\"");
        assert_eq!(zero.apply(&output), SnippetRange { start: 1, len: None }.apply(&output));
    }

    #[test]
    fn snippet_text_uses_spaced_separators_and_ascii_escapes() {
        let output = json!({ "a": [1, 2, { "b": null }], "c": "caf\u{e9} \u{1f600}" });
        assert_eq!(
            spaced_json(&output),
            r#"{"a": [1, 2, {"b": null}], "c": "caf\u00e9 \ud83d\ude00"}"#
        );
        assert_eq!(spaced_json(&json!([])), "[]");
        assert_eq!(spaced_json(&json!({})), "{}");
        assert_eq!(spaced_json(&json!("tab\there")), r#""tab\there""#);
    }
}
