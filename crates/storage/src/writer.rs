// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot Writer (§4.A): append-only JSONL writes with one serial writer
//! per file, plus the watermark file.
//!
//! Every write is line-delimited JSON with a trailing newline. A `Mutex`
//! per file plays the role of "serialize through a single writer per
//! file" — the mutex is held only for the duration of the write, matching
//! the concurrency model's rule that state-machine-critical sections never
//! span an I/O call (the snapshot append happens after the ticket-map
//! mutex is released).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex as PlMutex;
use serde::Serialize;
use thiserror::Error;

use crate::watermark::Watermark;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which audit stream a record belongs to (§6.2: `triage_audit.jsonl`,
/// `reply_audit.jsonl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Triage,
    Reply,
}

struct AppendFile {
    file: File,
}

impl AppendFile {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    fn append_value<T: Serialize>(&mut self, value: &T) -> Result<(), SnapshotError> {
        let mut bytes = serde_json::to_vec(value)?;
        bytes.push(b'\n');
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Owns the four append-only files and the watermark file under `LOGS_DIR`.
pub struct SnapshotWriter {
    triage_decisions: PlMutex<AppendFile>,
    reply_results: PlMutex<AppendFile>,
    triage_audit: PlMutex<AppendFile>,
    reply_audit: PlMutex<AppendFile>,
    watermark_path: PathBuf,
}

impl SnapshotWriter {
    pub fn open(logs_dir: &Path) -> Result<Self, SnapshotError> {
        Ok(Self {
            triage_decisions: PlMutex::new(AppendFile::open(&logs_dir.join("triage_decisions.jsonl"))?),
            reply_results: PlMutex::new(AppendFile::open(&logs_dir.join("reply_results.jsonl"))?),
            triage_audit: PlMutex::new(AppendFile::open(&logs_dir.join("triage_audit.jsonl"))?),
            reply_audit: PlMutex::new(AppendFile::open(&logs_dir.join("reply_audit.jsonl"))?),
            watermark_path: logs_dir.join("reply_watermark.json"),
        })
    }

    pub fn append_triage_decision<T: Serialize>(&self, value: &T) -> Result<(), SnapshotError> {
        self.triage_decisions.lock().append_value(value)
    }

    pub fn append_reply_result<T: Serialize>(&self, value: &T) -> Result<(), SnapshotError> {
        self.reply_results.lock().append_value(value)
    }

    pub fn append_audit<T: Serialize>(
        &self,
        kind: AuditKind,
        value: &T,
    ) -> Result<(), SnapshotError> {
        match kind {
            AuditKind::Triage => self.triage_audit.lock().append_value(value),
            AuditKind::Reply => self.reply_audit.lock().append_value(value),
        }
    }

    pub fn update_watermark(&self, watermark: Watermark) -> Result<(), SnapshotError> {
        watermark.save(&self.watermark_path)
    }

    pub fn load_watermark(&self) -> Result<Watermark, SnapshotError> {
        Watermark::load(&self.watermark_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader};
    use tempfile::tempdir;

    fn read_lines(path: &Path) -> Vec<String> {
        BufReader::new(File::open(path).unwrap())
            .lines()
            .map(|l| l.unwrap())
            .collect()
    }

    #[test]
    fn append_triage_decision_writes_one_line_per_call() {
        let dir = tempdir().unwrap();
        let writer = SnapshotWriter::open(dir.path()).unwrap();
        writer
            .append_triage_decision(&json!({"ver": 1, "state": "DONE"}))
            .unwrap();
        writer
            .append_triage_decision(&json!({"ver": 1, "state": "SKIPPED"}))
            .unwrap();

        let lines = read_lines(&dir.path().join("triage_decisions.jsonl"));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("DONE"));
        assert!(lines[1].contains("SKIPPED"));
    }

    #[test]
    fn audit_streams_are_independent() {
        let dir = tempdir().unwrap();
        let writer = SnapshotWriter::open(dir.path()).unwrap();
        writer
            .append_audit(AuditKind::Triage, &json!({"action": "t"}))
            .unwrap();
        writer
            .append_audit(AuditKind::Reply, &json!({"action": "r"}))
            .unwrap();

        assert_eq!(read_lines(&dir.path().join("triage_audit.jsonl")).len(), 1);
        assert_eq!(read_lines(&dir.path().join("reply_audit.jsonl")).len(), 1);
    }

    #[test]
    fn watermark_round_trips_through_the_writer() {
        let dir = tempdir().unwrap();
        let writer = SnapshotWriter::open(dir.path()).unwrap();
        writer
            .update_watermark(Watermark {
                triage_bytes: 10,
                triage_inode: 2,
            })
            .unwrap();
        assert_eq!(
            writer.load_watermark().unwrap(),
            Watermark {
                triage_bytes: 10,
                triage_inode: 2
            }
        );
    }
}
