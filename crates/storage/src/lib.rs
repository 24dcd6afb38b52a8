// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tk-storage: append-only snapshot files, canonical JSON hashing, and the
//! self-hashed evidence-run writer.

mod atomic;
pub mod canonical;
pub mod evidence;
pub mod watermark;
pub mod writer;

pub use canonical::{canonical_json_bytes, hash_bytes, hash_canonical_json, HashAlgorithm, HashDigest};
pub use evidence::{EvidenceError, EvidenceWriter};
pub use watermark::Watermark;
pub use writer::{AuditKind, SnapshotError, SnapshotWriter};
