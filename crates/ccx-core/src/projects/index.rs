use crate::error::{CcxError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

const MB: u64 = 1024 * 1024;

/// A half-open size range `[low, high)`.
#[derive(Debug, Clone, Copy)]
pub struct SizeBucket {
    pub label: &'static str,
    pub low: u64,
    pub high: u64,
}

pub const DEFAULT_BUCKETS: &[SizeBucket] = &[
    SizeBucket { label: "<1MB", low: 0, high: MB },
    SizeBucket { label: "1-5MB", low: MB, high: 5 * MB },
    SizeBucket { label: "5-20MB", low: 5 * MB, high: 20 * MB },
    SizeBucket { label: "20-50MB", low: 20 * MB, high: 50 * MB },
    SizeBucket { label: ">=50MB", low: 50 * MB, high: u64::MAX },
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexSummary {
    pub total_files: usize,
    pub total_bytes: u64,
    pub avg_bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BucketStats {
    pub bucket: String,
    pub count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileSize {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectsIndex {
    pub summary: IndexSummary,
    pub buckets: Vec<BucketStats>,
    pub top_files: Vec<FileSize>,
}

fn bucket_for(size: u64, buckets: &[SizeBucket]) -> usize {
    buckets
        .iter()
        .position(|b| b.low <= size && size < b.high)
        .unwrap_or(buckets.len().saturating_sub(1))
}

/// Size profile of every `*.jsonl` below `dir`.
pub fn build_index(dir: &Path, top_n: usize, buckets: &[SizeBucket]) -> Result<ProjectsIndex> {
    if !dir.is_dir() {
        return Err(CcxError::DirNotFound(dir.display().to_string()));
    }

    let mut stats: Vec<BucketStats> = buckets
        .iter()
        .map(|b| BucketStats {
            bucket: b.label.to_string(),
            count: 0,
            total_bytes: 0,
        })
        .collect();

    let mut files = Vec::new();
    let mut total_bytes = 0u64;
    for path in claude_log::find_jsonl_files(dir, true)? {
        let size_bytes = std::fs::metadata(&path)?.len();
        total_bytes += size_bytes;
        if !stats.is_empty() {
            let slot = &mut stats[bucket_for(size_bytes, buckets)];
            slot.count += 1;
            slot.total_bytes += size_bytes;
        }
        files.push(FileSize { path, size_bytes });
    }

    files.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.path.cmp(&b.path)));
    let total_files = files.len();
    files.truncate(top_n);

    Ok(ProjectsIndex {
        summary: IndexSummary {
            total_files,
            total_bytes,
            avg_bytes: if total_files == 0 {
                0
            } else {
                total_bytes / total_files as u64
            },
        },
        buckets: stats,
        top_files: files,
    })
}
