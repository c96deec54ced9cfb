use crate::error::{CcxError, Result};
use crate::transcript::models::{
    Conversation, ConversationMetadata, ConversationStats, DateRange, SearchFilter,
};
use crate::transcript::parser::{parse_transcript, transcript_metadata};
use crate::transcript::search::{SearchHit, TranscriptIndex};
use chrono::{DateTime, Duration, Utc};
use regex::RegexBuilder;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

// ---------------------------------------------------------------------------
// SortKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Timestamp,
    Duration,
    Messages,
    Size,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timestamp" | "time" | "date" => Ok(SortKey::Timestamp),
            "duration" => Ok(SortKey::Duration),
            "messages" => Ok(SortKey::Messages),
            "size" => Ok(SortKey::Size),
            other => Err(format!(
                "unknown sort key '{other}'; valid: timestamp, duration, messages, size"
            )),
        }
    }
}

fn compare(a: &ConversationMetadata, b: &ConversationMetadata, key: SortKey) -> Ordering {
    match key {
        SortKey::Timestamp => a.start_time.cmp(&b.start_time),
        SortKey::Duration => a
            .duration_seconds
            .unwrap_or(-1.0)
            .total_cmp(&b.duration_seconds.unwrap_or(-1.0)),
        SortKey::Messages => a.message_count.cmp(&b.message_count),
        SortKey::Size => a.file_size_bytes.cmp(&b.file_size_bytes),
    }
}

// ---------------------------------------------------------------------------
// ContentMatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ContentMatch {
    pub metadata: ConversationMetadata,
    pub match_count: usize,
    /// First matching line, trimmed to 200 characters.
    pub first_match: String,
}

// ---------------------------------------------------------------------------
// Explorer
// ---------------------------------------------------------------------------

/// Browses the `ses_*.jsonl` transcripts of one directory.
///
/// Metadata scans are cached per path for the lifetime of the explorer.
pub struct Explorer {
    dir: PathBuf,
    cache: HashMap<PathBuf, ConversationMetadata>,
}

impl Explorer {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CcxError::TranscriptsDirNotFound(dir.display().to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            cache: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Transcript files (`ses_*.jsonl`), sorted by name.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_transcript = path.is_file()
                && path.file_name().is_some_and(|n| {
                    let n = n.to_string_lossy();
                    n.starts_with("ses_") && n.ends_with(".jsonl")
                });
            if is_transcript {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn metadata(&mut self, path: &Path) -> Result<ConversationMetadata> {
        if let Some(meta) = self.cache.get(path) {
            return Ok(meta.clone());
        }
        let meta = transcript_metadata(path)?;
        self.cache.insert(path.to_path_buf(), meta.clone());
        Ok(meta)
    }

    /// Metadata for every transcript; unreadable files are skipped.
    pub fn all_metadata(&mut self) -> Result<Vec<ConversationMetadata>> {
        let mut out = Vec::new();
        for path in self.files()? {
            match self.metadata(&path) {
                Ok(meta) => out.push(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping transcript"),
            }
        }
        Ok(out)
    }

    /// Sorted listing. `descending` puts the largest (or newest) first.
    pub fn list(
        &mut self,
        limit: Option<usize>,
        sort_by: SortKey,
        descending: bool,
    ) -> Result<Vec<ConversationMetadata>> {
        let mut metas = self.all_metadata()?;
        metas.sort_by(|a, b| {
            let ord = compare(a, b, sort_by);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        if let Some(n) = limit {
            metas.truncate(n);
        }
        Ok(metas)
    }

    /// Newest-first conversations matching `filter`.
    ///
    /// Metadata-only criteria are checked first; text, tool and error
    /// criteria parse the transcript.
    pub fn search(
        &mut self,
        filter: &SearchFilter,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationMetadata>> {
        let mut out = Vec::new();
        for meta in self.list(None, SortKey::Timestamp, true)? {
            if !matches_metadata(&meta, filter) {
                continue;
            }
            if !filter.metadata_only() {
                let conv = match parse_transcript(&meta.file_path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(path = %meta.file_path.display(), error = %e, "skipping transcript");
                        continue;
                    }
                };
                if !matches_conversation(&conv, filter) {
                    continue;
                }
            }
            out.push(meta);
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }
        Ok(out)
    }

    /// Load a conversation by session id or id prefix.
    pub fn get(&self, session_id: &str) -> Result<Option<Conversation>> {
        let prefix = format!("ses_{session_id}");
        let found = self.files()?.into_iter().find(|p| {
            p.file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
        });
        match found {
            Some(path) => Ok(Some(parse_transcript(&path)?)),
            None => Ok(None),
        }
    }

    /// Regex search over raw transcript text. An empty query matches nothing.
    pub fn search_content(
        &mut self,
        query: &str,
        case_sensitive: bool,
    ) -> Result<Vec<ContentMatch>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let re = RegexBuilder::new(query)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| CcxError::InvalidPattern {
                pattern: query.to_string(),
                reason: e.to_string(),
            })?;

        let mut out = Vec::new();
        for path in self.files()? {
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read transcript");
                    continue;
                }
            };
            let mut match_count = 0;
            let mut first_match = None;
            for line in text.lines().filter(|l| re.is_match(l)) {
                match_count += 1;
                if first_match.is_none() {
                    first_match = Some(crate::format::ellipsize(line.trim(), 200));
                }
            }
            if let Some(first_match) = first_match {
                out.push(ContentMatch {
                    metadata: self.metadata(&path)?,
                    match_count,
                    first_match,
                });
            }
        }
        Ok(out)
    }

    /// Parse every transcript, skipping unreadable ones.
    pub fn load_all(&mut self) -> Result<Vec<Conversation>> {
        let mut out = Vec::new();
        for path in self.files()? {
            match parse_transcript(&path) {
                Ok(conv) => {
                    self.cache.insert(path, conv.metadata.clone());
                    out.push(conv);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping transcript"),
            }
        }
        Ok(out)
    }

    /// BM25-ranked search over every transcript.
    pub fn ranked_search(&mut self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conversations = self.load_all()?;
        TranscriptIndex::build(&conversations)?.search(query, limit)
    }

    pub fn stats(&mut self) -> Result<ConversationStats> {
        let metas = self.all_metadata()?;
        let conversations = self.load_all()?;
        Ok(compute_stats(&metas, &conversations))
    }

    /// Conversations started within the last `days` days, newest first.
    pub fn recent(&mut self, days: i64, limit: usize) -> Result<Vec<ConversationMetadata>> {
        self.started_since(Utc::now() - Duration::days(days), limit)
    }

    pub fn started_since(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConversationMetadata>> {
        let mut metas: Vec<_> = self
            .list(None, SortKey::Timestamp, true)?
            .into_iter()
            .filter(|m| m.start_time.is_some_and(|t| t >= cutoff))
            .collect();
        metas.truncate(limit);
        Ok(metas)
    }

    /// Conversations that used any of `tools`, newest first.
    pub fn with_tools(&mut self, tools: &[String]) -> Result<Vec<ConversationMetadata>> {
        let filter = SearchFilter {
            tools_used: tools.to_vec(),
            ..Default::default()
        };
        self.search(&filter, None)
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Date, duration and message-count criteria. Unknown values fail any bound
/// placed on them.
pub fn matches_metadata(meta: &ConversationMetadata, filter: &SearchFilter) -> bool {
    if let Some(start) = filter.start_date {
        if !meta.start_time.is_some_and(|t| t >= start) {
            return false;
        }
    }
    if let Some(end) = filter.end_date {
        if !meta.start_time.is_some_and(|t| t <= end) {
            return false;
        }
    }
    if let Some(min) = filter.min_duration {
        if !meta.duration_seconds.is_some_and(|d| d >= min) {
            return false;
        }
    }
    if let Some(max) = filter.max_duration {
        if !meta.duration_seconds.is_some_and(|d| d <= max) {
            return false;
        }
    }
    if filter.min_messages.is_some_and(|min| meta.message_count < min) {
        return false;
    }
    if filter.max_messages.is_some_and(|max| meta.message_count > max) {
        return false;
    }
    true
}

/// Text, tool and error criteria against a parsed conversation.
pub fn matches_conversation(conv: &Conversation, filter: &SearchFilter) -> bool {
    if let Some(query) = &filter.text_query {
        let needle = query.to_lowercase();
        if !conv
            .messages
            .iter()
            .any(|m| m.text().to_lowercase().contains(&needle))
        {
            return false;
        }
    }
    if !filter.tools_used.is_empty() {
        let used = conv.unique_tools();
        if !filter.tools_used.iter().any(|t| used.contains(t.as_str())) {
            return false;
        }
    }
    if let Some(want_errors) = filter.has_errors {
        if conv.has_errors() != want_errors {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

pub fn compute_stats(
    metas: &[ConversationMetadata],
    conversations: &[Conversation],
) -> ConversationStats {
    let mut stats = ConversationStats {
        total_conversations: metas.len(),
        total_messages: metas.iter().map(|m| m.message_count).sum(),
        total_tool_calls: metas.iter().map(|m| m.tool_call_count).sum(),
        ..Default::default()
    };

    let durations: Vec<f64> = metas.iter().filter_map(|m| m.duration_seconds).collect();
    if !durations.is_empty() {
        stats.average_duration = Some(durations.iter().sum::<f64>() / durations.len() as f64);
    }

    let starts = metas.iter().filter_map(|m| m.start_time);
    let ends = metas.iter().filter_map(|m| m.end_time.or(m.start_time));
    if let (Some(start), Some(end)) = (starts.clone().min(), ends.max()) {
        stats.date_range = Some(DateRange { start, end });
    }
    for start in starts {
        *stats
            .conversations_by_date
            .entry(start.format("%Y-%m-%d").to_string())
            .or_insert(0) += 1;
    }

    for conv in conversations {
        for call in &conv.tool_calls {
            *stats.tool_usage_counts.entry(call.name.clone()).or_insert(0) += 1;
            stats.unique_tools_used.insert(call.name.clone());
        }
    }

    stats
}
