//! Core data types shared across the indexing and search crates.
//!
//! These types intentionally avoid heavy dependencies so that every other
//! crate in the workspace can depend on them without pulling in tantivy,
//! sqlite, or tokio.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;

/// Unix timestamp in seconds (UTC).
pub type Timestamp = i64;

/// Current time as a Unix timestamp.
pub fn now_ts() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One indexed file's metadata snapshot.
///
/// `path` is the unique key: absolute and canonicalized. `file_type` is the
/// extension without its leading dot, or `"unknown"` when there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub modified_time: Timestamp,
    pub created_time: Timestamp,
    pub file_type: String,
    pub mime_type: String,
    pub content_hash: String,
    pub indexed_time: Timestamp,
}

impl FileMetadata {
    /// Derive filename/extension/file_type from `path`, leaving the caller
    /// to fill in size, timestamps, hash, and mime type.
    pub fn skeleton(path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();
        let file_type = if extension.is_empty() {
            "unknown".to_string()
        } else {
            extension.trim_start_matches('.').to_string()
        };
        Self {
            path,
            filename,
            extension,
            size: 0,
            modified_time: 0,
            created_time: 0,
            file_type,
            mime_type: String::new(),
            content_hash: String::new(),
            indexed_time: 0,
        }
    }
}

/// The operation a [`Job`] asks the indexing manager to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Job priority. Ordered ascending: `Immediate` runs before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Immediate = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

/// A unit of indexing work for a single path.
///
/// Jobs are value objects: never mutated after enqueue. `sequence` is a
/// monotonically increasing enqueue counter used to break ties between jobs
/// of equal priority (FIFO within a priority band) without depending on
/// wall-clock resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub path: PathBuf,
    pub operation: Operation,
    pub priority: Priority,
    pub sequence: u64,
}

impl Job {
    pub fn new(path: impl Into<PathBuf>, operation: Operation, priority: Priority, sequence: u64) -> Self {
        Self {
            path: path.into(),
            operation,
            priority,
            sequence,
        }
    }
}

// `BinaryHeap` is a max-heap; we want the *lowest* priority value and the
// *lowest* sequence number to pop first, so ordering is reversed relative to
// the natural field order.
impl Ord for Job {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A bounded, overlapping text segment of one source file — the unit of
/// embedding for the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_path: PathBuf,
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
    pub metadata: FileMetadata,
}

impl Chunk {
    pub fn make_id(source_path: &Path, index: usize) -> String {
        format!("{}:chunk:{}", source_path.display(), index)
    }
}

/// A single scored hit returned by the keyword index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub path: PathBuf,
    pub filename: String,
    pub extension: String,
    pub file_type: String,
    pub mime_type: String,
    pub size: u64,
    pub modified_time: Timestamp,
    pub created_time: Timestamp,
    pub content_hash: String,
    pub indexed_time: Timestamp,
    pub score: f32,
}

/// A single scored hit returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub chunk_id: String,
    pub source_path: PathBuf,
    pub chunk_index: usize,
    pub text_preview: String,
    pub score: f32,
}

/// Search mode requested by a caller of the hybrid ranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

/// One row of a merged, ranked search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub filename: String,
    pub file_type: String,
    pub extension: String,
    pub size: u64,
    pub modified_time: Timestamp,
    pub keyword_score: f32,
    pub keyword_rank: Option<u32>,
    pub semantic_score: f32,
    pub semantic_rank: Option<u32>,
    pub chunk_text: Option<String>,
    pub chunk_id: Option<String>,
    pub combined_score: f32,
    pub search_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn file_metadata_skeleton_derives_type() {
        let fm = FileMetadata::skeleton(PathBuf::from("/tmp/Report.PDF"));
        assert_eq!(fm.extension, ".pdf");
        assert_eq!(fm.file_type, "pdf");
        assert_eq!(fm.filename, "Report.PDF");
    }

    #[test]
    fn file_metadata_skeleton_handles_no_extension() {
        let fm = FileMetadata::skeleton(PathBuf::from("/tmp/README"));
        assert_eq!(fm.extension, "");
        assert_eq!(fm.file_type, "unknown");
    }

    #[test]
    fn job_ordering_is_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        heap.push(Job::new("/a", Operation::Create, Priority::Low, 0));
        heap.push(Job::new("/b", Operation::Create, Priority::Immediate, 1));
        heap.push(Job::new("/c", Operation::Create, Priority::High, 2));
        heap.push(Job::new("/d", Operation::Create, Priority::Immediate, 3));

        // Immediate(1) before Immediate(3) (FIFO), then High, then Low.
        assert_eq!(heap.pop().unwrap().path, PathBuf::from("/b"));
        assert_eq!(heap.pop().unwrap().path, PathBuf::from("/d"));
        assert_eq!(heap.pop().unwrap().path, PathBuf::from("/c"));
        assert_eq!(heap.pop().unwrap().path, PathBuf::from("/a"));
    }

    #[test]
    fn chunk_id_is_deterministic() {
        let id = Chunk::make_id(Path::new("/tmp/a.txt"), 3);
        assert_eq!(id, "/tmp/a.txt:chunk:3");
    }
}
