// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tail-follower's watermark file: `{triageBytes, triageInode}` (§6.2).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::atomic::{rotate_bak_path, write_atomic};
use crate::writer::SnapshotError;

/// Byte offset and inode of `triage_decisions.jsonl` as last observed by
/// the tail follower (§4.I). An inode change or a size shrink versus this
/// record means the file was rotated or truncated and the watermark must
/// reset to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    #[serde(rename = "triageBytes")]
    pub triage_bytes: u64,
    #[serde(rename = "triageInode")]
    pub triage_inode: u64,
}

impl Watermark {
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Load the watermark, returning the zero value if absent. A corrupt
    /// file is rotated to `.bak` and treated as absent, forcing a full
    /// re-read of the triage file on the next tail cycle.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = fs::read(path)?;
        match serde_json::from_slice(&bytes) {
            Ok(watermark) => Ok(watermark),
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(error = %e, path = %path.display(), bak = %bak_path.display(), "corrupt watermark, resetting");
                fs::rename(path, &bak_path)?;
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reply_watermark.json");
        let w = Watermark {
            triage_bytes: 4096,
            triage_inode: 77,
        };
        w.save(&path).unwrap();
        assert_eq!(Watermark::load(&path).unwrap(), w);
    }

    #[test]
    fn missing_file_loads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert_eq!(Watermark::load(&path).unwrap(), Watermark::default());
    }

    #[test]
    fn corrupt_file_is_rotated_and_loads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reply_watermark.json");
        fs::write(&path, b"not json").unwrap();
        assert_eq!(Watermark::load(&path).unwrap(), Watermark::default());
        assert!(path.with_extension("bak").exists());
    }
}
