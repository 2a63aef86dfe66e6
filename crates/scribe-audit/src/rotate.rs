//! Size-rotated JSON Lines file sink.
//!
//! The active file lives at the configured path until its first rotation.
//! Rotation renames nothing: each segment is created under a sequence name
//! derived from the base path (`audit.jsonl`, `audit.1.jsonl`,
//! `audit.2.jsonl`, ...) and the sink simply moves on to the next sequence
//! number once appending the next entry would push the current segment past
//! the size threshold. The successor file is opened before the current one
//! is retired, so there is never a moment without a writable destination,
//! and a segment only ever exists with at least one complete line in it.
//!
//! Reopening an existing path resumes on the highest-numbered segment
//! already present rather than overwriting it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use scribe_core::config::RetentionPolicy;
use scribe_core::entry::AuditEntry;

use crate::error::SinkWriteError;
use crate::sink::AuditSink;

/// Append-only JSON Lines sink that starts a new file once the current one
/// reaches a size threshold.
pub struct RotatingFileSink {
    base_path: PathBuf,
    max_bytes: u64,
    retention: RetentionPolicy,
    max_files: Option<usize>,
    state: Mutex<WriterState>,
}

struct WriterState {
    file: File,
    written: u64,
    sequence: u64,
}

impl RotatingFileSink {
    /// Open a sink at `path`, creating parent directories as needed. If the
    /// path (or a higher-numbered segment from an earlier run) already
    /// exists, writing resumes there with the existing size counted toward
    /// the threshold.
    pub fn new(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, SinkWriteError> {
        let base_path = path.as_ref().to_path_buf();

        if let Some(parent) = base_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SinkWriteError::Open {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let sequence = list_segments(&base_path)
            .into_iter()
            .map(|(sequence, _)| sequence)
            .max()
            .unwrap_or(0);
        let active = segment_path(&base_path, sequence);

        let file = open_append(&active)?;
        let written = file
            .metadata()
            .map(|meta| meta.len())
            .map_err(|source| SinkWriteError::Open {
                path: active,
                source,
            })?;

        Ok(Self {
            base_path,
            max_bytes,
            retention: RetentionPolicy::default(),
            max_files: None,
            state: Mutex::new(WriterState {
                file,
                written,
                sequence,
            }),
        })
    }

    /// What to do with segments once rotation retires them.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// How many retired segments [`RetentionPolicy::Delete`] keeps around
    /// besides the active file. `None` keeps none.
    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }

    /// Path of the segment currently being appended to.
    pub fn active_path(&self) -> PathBuf {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        segment_path(&self.base_path, state.sequence)
    }

    /// Switch to the next segment. If the successor cannot be opened the
    /// active file stays in place and entries keep landing there, past the
    /// threshold, until a later rotation attempt succeeds.
    fn rotate(&self, state: &mut WriterState) {
        let next_sequence = state.sequence + 1;
        let next_path = segment_path(&self.base_path, next_sequence);

        let next_file = match open_append(&next_path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    target: "scribe_audit",
                    path = %next_path.display(),
                    error = %e,
                    "audit rotation failed; continuing on the current file"
                );
                return;
            }
        };

        // Only now that the successor is open does the old file get retired.
        state.file = next_file;
        state.written = 0;
        state.sequence = next_sequence;

        if self.retention == RetentionPolicy::Delete {
            self.prune_retired(state.sequence);
        }
    }

    /// Remove retired segments beyond the configured count, oldest first.
    fn prune_retired(&self, active_sequence: u64) {
        let keep = self.max_files.unwrap_or(0);

        let mut retired: Vec<(u64, PathBuf)> = list_segments(&self.base_path)
            .into_iter()
            .filter(|(sequence, _)| *sequence != active_sequence)
            .collect();
        retired.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, path) in retired.into_iter().skip(keep) {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(
                    target: "scribe_audit",
                    path = %path.display(),
                    error = %e,
                    "failed to remove retired audit file"
                );
            }
        }
    }
}

impl AuditSink for RotatingFileSink {
    fn write(&self, entry: &AuditEntry) -> Result<(), SinkWriteError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Serialization, the threshold check, and the append happen under
        // one lock so concurrent writers cannot interleave half-decisions.
        let mut line = entry.to_json_line()?;
        line.push('\n');
        let line_len = line.len() as u64;

        // Never rotate an empty file: an entry larger than the threshold
        // still gets written, as the only line of its segment.
        if state.written > 0 && state.written + line_len > self.max_bytes {
            self.rotate(&mut state);
        }

        state.file.write_all(line.as_bytes())?;
        state.written += line_len;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkWriteError> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.file.flush()?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, SinkWriteError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SinkWriteError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Segment path for a sequence number: `0` is the base path itself,
/// `n > 0` inserts the number before the extension (`audit.3.jsonl`).
fn segment_path(base: &Path, sequence: u64) -> PathBuf {
    if sequence == 0 {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("audit");
    let name = match base.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{stem}.{sequence}.{ext}"),
        None => format!("{stem}.{sequence}"),
    };
    base.with_file_name(name)
}

/// Every segment belonging to `base` in its directory, unsorted.
fn list_segments(base: &Path) -> Vec<(u64, PathBuf)> {
    let mut segments = Vec::new();

    let Some(base_name) = base.file_name().and_then(|name| name.to_str()) else {
        return segments;
    };
    let Some(stem) = base.file_stem().and_then(|stem| stem.to_str()) else {
        return segments;
    };
    let extension = base.extension().and_then(|ext| ext.to_str());

    let parent = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let Ok(dir) = fs::read_dir(parent) else {
        return segments;
    };

    for dir_entry in dir.flatten() {
        let name_os = dir_entry.file_name();
        let Some(name) = name_os.to_str() else {
            continue;
        };
        let sequence = if name == base_name {
            Some(0)
        } else {
            parse_sequence(stem, extension, name)
        };
        if let Some(sequence) = sequence {
            segments.push((sequence, dir_entry.path()));
        }
    }

    segments
}

/// Extract `n` from `{stem}.{n}.{ext}` (or `{stem}.{n}` for extensionless
/// bases). Anything that does not fit the shape exactly is not a segment.
fn parse_sequence(stem: &str, extension: Option<&str>, name: &str) -> Option<u64> {
    let rest = name.strip_prefix(stem)?.strip_prefix('.')?;
    let digits = match extension {
        Some(ext) => rest.strip_suffix(ext)?.strip_suffix('.')?,
        None => rest,
    };
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn sample_entry(i: usize) -> AuditEntry {
        let value = json!({
            "trace_id": format!("trace-{i:04}"),
            "request_id": format!("req-{i:04}"),
            "workflow_id": "rotation-test",
            "operation": "api_request",
            "endpoint": "/v1/chat",
            "status_code": 200,
            "latency_ms": 1.5,
            "success": true,
        });
        match value {
            Value::Object(map) => AuditEntry::from_fields(map),
            _ => unreachable!(),
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        let content = fs::read_to_string(path).unwrap();
        content.lines().map(str::to_string).collect()
    }

    /// All segments for a base path, sorted oldest first.
    fn sorted_segments(base: &Path) -> Vec<(u64, PathBuf)> {
        let mut segments = list_segments(base);
        segments.sort_by_key(|(sequence, _)| *sequence);
        segments
    }

    #[test]
    fn test_segment_path_naming() {
        let base = Path::new("/var/log/audit.jsonl");
        assert_eq!(segment_path(base, 0), PathBuf::from("/var/log/audit.jsonl"));
        assert_eq!(
            segment_path(base, 1),
            PathBuf::from("/var/log/audit.1.jsonl")
        );
        assert_eq!(
            segment_path(base, 12),
            PathBuf::from("/var/log/audit.12.jsonl")
        );

        let bare = Path::new("audit");
        assert_eq!(segment_path(bare, 3), PathBuf::from("audit.3"));
    }

    #[test]
    fn test_parse_sequence_rejects_lookalikes() {
        assert_eq!(parse_sequence("audit", Some("jsonl"), "audit.1.jsonl"), Some(1));
        assert_eq!(
            parse_sequence("audit", Some("jsonl"), "audit.42.jsonl"),
            Some(42)
        );
        assert_eq!(parse_sequence("audit", Some("jsonl"), "audit.jsonl"), None);
        assert_eq!(parse_sequence("audit", Some("jsonl"), "audit.old.jsonl"), None);
        assert_eq!(parse_sequence("audit", Some("jsonl"), "other.1.jsonl"), None);
        assert_eq!(parse_sequence("audit", None, "audit.7"), Some(7));
    }

    #[test]
    fn test_append_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = RotatingFileSink::new(&path, 1024 * 1024).unwrap();

        for i in 0..5 {
            sink.write(&sample_entry(i)).unwrap();
        }

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            let entry: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(entry.trace_id(), Some(format!("trace-{i:04}").as_str()));
        }
        assert!(!segment_path(&path, 1).exists());
    }

    #[test]
    fn test_rotation_preserves_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };
        // Room for three lines per segment.
        let sink = RotatingFileSink::new(&path, line_len * 3).unwrap();

        let total = 20;
        for i in 0..total {
            sink.write(&sample_entry(i)).unwrap();
        }

        let segments = sorted_segments(&path);
        assert!(segments.len() >= 4, "expected several segments, got {segments:?}");

        let mut recovered = Vec::new();
        for (_, segment) in &segments {
            let size = fs::metadata(segment).unwrap().len();
            assert!(size > 0, "zero-byte segment {segment:?}");
            assert!(
                size <= line_len * 3,
                "segment {segment:?} exceeds the threshold"
            );
            recovered.extend(read_lines(segment));
        }

        assert_eq!(recovered.len(), total);
        for (i, line) in recovered.iter().enumerate() {
            let entry: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(entry.trace_id(), Some(format!("trace-{i:04}").as_str()));
        }
    }

    #[test]
    fn test_oversized_entry_still_lands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        // Threshold far below a single line.
        let sink = RotatingFileSink::new(&path, 16).unwrap();

        sink.write(&sample_entry(0)).unwrap();
        sink.write(&sample_entry(1)).unwrap();

        let segments = sorted_segments(&path);
        assert_eq!(segments.len(), 2);
        for (_, segment) in &segments {
            assert_eq!(read_lines(segment).len(), 1);
        }
    }

    #[test]
    fn test_reopen_resumes_highest_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };

        {
            let sink = RotatingFileSink::new(&path, line_len * 2).unwrap();
            for i in 0..5 {
                sink.write(&sample_entry(i)).unwrap();
            }
        }

        let before = sorted_segments(&path);
        let highest_before = before.last().unwrap().0;

        {
            let sink = RotatingFileSink::new(&path, line_len * 2).unwrap();
            assert_eq!(sink.active_path(), segment_path(&path, highest_before));
            for i in 5..8 {
                sink.write(&sample_entry(i)).unwrap();
            }
        }

        let mut recovered = Vec::new();
        for (_, segment) in sorted_segments(&path) {
            // A resumed byte counter keeps post-reopen segments bounded too.
            let size = fs::metadata(&segment).unwrap().len();
            assert!(
                size <= line_len * 2,
                "segment {segment:?} exceeds the threshold after reopen"
            );
            recovered.extend(read_lines(&segment));
        }
        assert_eq!(recovered.len(), 8);
        for (i, line) in recovered.iter().enumerate() {
            let entry: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(entry.trace_id(), Some(format!("trace-{i:04}").as_str()));
        }
    }

    #[test]
    fn test_delete_retention_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };
        let sink = RotatingFileSink::new(&path, line_len)
            .unwrap()
            .with_retention(RetentionPolicy::Delete)
            .with_max_files(Some(1));

        // One entry per segment; five writes leave the active segment plus
        // one retired one.
        for i in 0..5 {
            sink.write(&sample_entry(i)).unwrap();
        }

        let segments = sorted_segments(&path);
        assert_eq!(segments.len(), 2, "unexpected segments: {segments:?}");
        let sequences: Vec<u64> = segments.iter().map(|(sequence, _)| *sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[test]
    fn test_delete_retention_without_cap_keeps_only_active() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };
        let sink = RotatingFileSink::new(&path, line_len)
            .unwrap()
            .with_retention(RetentionPolicy::Delete)
            .with_max_files(None);

        for i in 0..4 {
            sink.write(&sample_entry(i)).unwrap();
        }

        let segments = sorted_segments(&path);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, 3);
        // The base path was retired and deleted along the way.
        assert!(!path.exists());
    }

    #[test]
    fn test_keep_retention_leaves_segments_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };
        let sink = RotatingFileSink::new(&path, line_len).unwrap();

        for i in 0..4 {
            sink.write(&sample_entry(i)).unwrap();
        }

        assert_eq!(sorted_segments(&path).len(), 4);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").unwrap();

        let result = RotatingFileSink::new(blocker.join("audit.jsonl"), 1024);
        assert!(matches!(result, Err(SinkWriteError::Open { .. })));
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/audit.jsonl");
        let sink = RotatingFileSink::new(&path, 1024).unwrap();
        sink.write(&sample_entry(0)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_writers_never_tear_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let line_len = {
            let mut line = sample_entry(0).to_json_line().unwrap();
            line.push('\n');
            line.len() as u64
        };
        let sink = Arc::new(RotatingFileSink::new(&path, line_len * 7).unwrap());

        let threads = 8;
        let per_thread = 50;
        let mut handles = Vec::new();
        for t in 0..threads {
            let sink = Arc::clone(&sink);
            handles.push(std::thread::spawn(move || {
                for i in 0..per_thread {
                    sink.write(&sample_entry(t * per_thread + i)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut total = 0;
        for (_, segment) in sorted_segments(&path) {
            let size = fs::metadata(segment.as_path()).unwrap().len();
            assert!(size > 0);
            for line in read_lines(&segment) {
                let entry: AuditEntry = serde_json::from_str(&line).unwrap();
                assert_eq!(entry.workflow_id(), Some("rotation-test"));
                total += 1;
            }
        }
        assert_eq!(total, threads * per_thread);
    }
}
