//! Composite source units: a main file plus everything spliced into it,
//! concatenated into one offset space with per-segment file attribution.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// A contiguous span of the composite text that came from one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSegment {
    /// Offset of the segment's first byte in the composite text.
    pub offset: usize,
    pub length: usize,
    pub file: PathBuf,
}

/// A composite offset mapped back to its origin file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub file: PathBuf,
    pub offset: usize,
}

/// The preprocessor's output: the spliced text and the segment table that
/// maps composite offsets back to the files they came from.
///
/// Invariant: segments are contiguous, non-overlapping, ascending by
/// `offset`, and cover exactly `[0, code.len())`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    pub main_file: PathBuf,
    pub code: String,
    pub segments: Vec<FileSegment>,
    #[serde(serialize_with = "serialize_millis")]
    pub indexed_at: SystemTime,
}

impl SourceUnit {
    pub fn new(main_file: PathBuf) -> Self {
        SourceUnit {
            main_file,
            code: String::new(),
            segments: Vec::new(),
            indexed_at: SystemTime::now(),
        }
    }

    /// Append `text` as a segment attributed to `file`.
    pub fn push_segment(&mut self, file: PathBuf, text: &str) {
        self.segments.push(FileSegment {
            offset: self.code.len(),
            length: text.len(),
            file,
        });
        self.code.push_str(text);
    }

    /// Map a composite offset to the file it came from and the offset inside
    /// that file. A file's segments appear here in the same order and without
    /// gaps relative to the file itself, so the origin offset is the offset
    /// within the hit segment plus the file's earlier segment lengths.
    pub fn resolve(&self, offset: usize) -> Option<ResolvedLocation> {
        let mut consumed: HashMap<&Path, usize> = HashMap::new();
        for seg in &self.segments {
            if offset < seg.offset + seg.length {
                let before = consumed.get(seg.file.as_path()).copied().unwrap_or(0);
                return Some(ResolvedLocation {
                    file: seg.file.clone(),
                    offset: offset - seg.offset + before,
                });
            }
            *consumed.entry(seg.file.as_path()).or_insert(0) += seg.length;
        }
        None
    }

    /// Every origin file, deduplicated, in first-appearance order.
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = Vec::new();
        for seg in &self.segments {
            if !files.contains(&seg.file) {
                files.push(seg.file.clone());
            }
        }
        files
    }

    pub fn contains(&self, file: &Path) -> bool {
        self.segments.iter().any(|seg| seg.file == file)
    }
}

fn serialize_millis<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    serializer.serialize_u64(millis as u64)
}
