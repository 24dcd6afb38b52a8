// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Evidence Writer (§4.H): one self-hashed evidence run per system-caused
//! rejection.
//!
//! An evidence run is a directory `<LOGS_DIR>/<evidence_run_id>/`
//! containing `run_report_v1.json`, `<details_kind>.json`,
//! `evidence_manifest_v1.json`, and `manifest_self_hash_v1.json`. This
//! module is the single emitter for that directory: once `emit` returns,
//! nothing writes into it again (§3.4 "single-shot, no further writes
//! after closure").

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use std::sync::OnceLock;

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::atomic::{remove_tmp_if_present, write_atomic};
use crate::canonical::{canonical_json_bytes, hash_bytes, HashAlgorithm};

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("canonicalization error: {0}")]
    Canonical(#[from] crate::canonical::CanonicalError),
    #[error("details payload failed schema validation for kind '{kind}': {reason}")]
    SchemaInvalid { kind: String, reason: String },
    #[error("unknown details kind '{0}', not in the fixed registry")]
    UnknownDetailsKind(String),
    #[error("manifest cross-field invariant violated: {0}")]
    ManifestInvariant(String),
}

/// One entry in the manifest's artifact list.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub kind: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    pub sha256: Option<String>,
}

/// One entry in the manifest's `checks[]`.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub reason_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_ref: Option<String>,
}

/// Everything the caller needs to supply for one evidence emission.
pub struct EvidenceRequest<'a> {
    pub ticket_id: &'a str,
    pub details_kind: &'a str,
    pub details: Value,
    pub reject_code: &'a str,
    pub checks: Vec<Check>,
    pub now_ms: u64,
}

/// Filesystem location of a completed evidence run.
#[derive(Debug, Clone)]
pub struct EvidenceRun {
    pub evidence_run_id: String,
    pub dir: PathBuf,
}

/// The fixed registry of known `details_kind` schemas (Design Notes:
/// "compile schemas at startup, hold compiled validators by name").
struct SchemaRegistry {
    lease_debug_v1: jsonschema::JSONSchema,
    readiness_debug_v1: jsonschema::JSONSchema,
    tool_debug_v1: jsonschema::JSONSchema,
}

fn compile(schema: Value) -> jsonschema::JSONSchema {
    // These schemas are fixed literals compiled once; a compile failure
    // here would be a programmer error, not a runtime condition, so the
    // registry construction panics rather than threading an error through
    // every `emit` call.
    #[allow(clippy::panic)]
    jsonschema::JSONSchema::compile(&schema).unwrap_or_else(|e| panic!("invalid embedded schema: {e}"))
}

impl SchemaRegistry {
    fn new() -> Self {
        Self {
            lease_debug_v1: compile(json!({
                "type": "object",
                "required": ["lease_owner", "lease_token_hash"],
                "properties": {
                    "lease_owner": {"type": "string"},
                    "lease_token_hash": {"type": "string"},
                    "attempted_by": {"type": "string"}
                },
                "additionalProperties": true
            })),
            readiness_debug_v1: compile(json!({
                "type": "object",
                "required": ["missing_required"],
                "properties": {
                    "missing_required": {"type": "array", "items": {"type": "string"}},
                    "degraded": {"type": "boolean"}
                },
                "additionalProperties": true
            })),
            tool_debug_v1: compile(json!({
                "type": "object",
                "required": ["raw"],
                "properties": {
                    "raw": {},
                    "invalid_status": {"type": "boolean"}
                },
                "additionalProperties": true
            })),
        }
    }

    fn validate(&self, kind: &str, value: &Value) -> Result<(), EvidenceError> {
        let schema = match kind {
            "lease_debug_v1" => &self.lease_debug_v1,
            "readiness_debug_v1" => &self.readiness_debug_v1,
            "tool_debug_v1" => &self.tool_debug_v1,
            other => return Err(EvidenceError::UnknownDetailsKind(other.to_string())),
        };
        schema.validate(value).map_err(|errors| {
            let reason = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            EvidenceError::SchemaInvalid {
                kind: kind.to_string(),
                reason,
            }
        })
    }
}

static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();

fn registry() -> &'static SchemaRegistry {
    REGISTRY.get_or_init(SchemaRegistry::new)
}

/// Base-36 encode a non-negative integer (used in the evidence run id).
fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub struct EvidenceWriter {
    logs_dir: PathBuf,
}

impl EvidenceWriter {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    pub fn emit(&self, request: EvidenceRequest<'_>) -> Result<EvidenceRun, EvidenceError> {
        registry().validate(request.details_kind, &request.details)?;

        let run_id = format!(
            "gr_{}_{}",
            request.ticket_id.chars().take(7).collect::<String>(),
            base36(request.now_ms)
        );
        let dir = self.logs_dir.join(&run_id);
        fs::create_dir_all(&dir)?;

        let details_path = dir.join(format!("{}.json", request.details_kind));
        write_json_file(&details_path, &request.details)?;

        let run_report = json!({
            "ver": 1,
            "steps": [{
                "step_index": 1,
                "tool_name": "SYSTEM_REJECT",
                "status": "failed",
                "code": request.reject_code,
                "result_summary": format!("system_reject:{}", request.reject_code),
            }]
        });
        let run_report_path = dir.join("run_report_v1.json");
        if let Err(e) = write_json_file(&run_report_path, &run_report) {
            let _ = fs::remove_file(&run_report_path);
            return Err(e.into());
        }

        match self.finish_manifest(&dir, &run_id, &details_path, &run_report_path, request.checks) {
            Ok(run) => Ok(run),
            Err(e) => {
                let _ = fs::remove_file(&run_report_path);
                let manifest_path = dir.join("evidence_manifest_v1.json");
                let _ = remove_tmp_if_present(&manifest_path);
                Err(e)
            }
        }
    }

    fn finish_manifest(
        &self,
        dir: &Path,
        run_id: &str,
        details_path: &Path,
        run_report_path: &Path,
        checks: Vec<Check>,
    ) -> Result<EvidenceRun, EvidenceError> {
        let details_rel = relative_name(details_path);
        let run_report_rel = relative_name(run_report_path);

        let mut reason_codes: Vec<String> = checks
            .iter()
            .flat_map(|c| c.reason_codes.clone())
            .collect();
        reason_codes.sort();
        reason_codes.dedup();

        let mut sorted_checks = checks;
        sorted_checks.sort_by(|a, b| a.name.cmp(&b.name));

        let mut artifacts = vec![
            Artifact {
                kind: "run_report_v1".to_string(),
                path: run_report_rel.clone(),
                bytes: None,
                sha256: None,
            },
            artifact_for_details(details_path, &details_rel),
            Artifact {
                kind: "evidence_manifest_v1".to_string(),
                path: "evidence_manifest_v1.json".to_string(),
                bytes: None,
                sha256: None,
            },
            Artifact {
                kind: "manifest_self_hash_v1".to_string(),
                path: "manifest_self_hash_v1.json".to_string(),
                bytes: None,
                sha256: None,
            },
        ];

        for artifact in artifacts.iter_mut() {
            if artifact.kind == "evidence_manifest_v1" || artifact.kind == "manifest_self_hash_v1" {
                continue;
            }
            let path = dir.join(&artifact.path);
            let bytes = fs::read(&path)?;
            artifact.bytes = Some(bytes.len() as u64);
            artifact.sha256 = Some(hash_bytes(HashAlgorithm::Sha256, &bytes).value);
        }
        artifacts.sort_by(|a, b| (a.kind.as_str(), a.path.as_str()).cmp(&(b.kind.as_str(), b.path.as_str())));

        validate_manifest_invariants(&artifacts, &sorted_checks, &run_report_rel)?;

        let manifest = json!({
            "ver": 1,
            "evidence_run_id": run_id,
            "mode_snapshot_ref": run_report_rel,
            "artifacts": artifacts,
            "checks": sorted_checks,
            "reason_codes": reason_codes,
        });

        let self_hash = compute_self_hash(&manifest)?;

        let manifest_path = dir.join("evidence_manifest_v1.json");
        let self_hash_path = dir.join("manifest_self_hash_v1.json");

        let self_hash_doc = json!({
            "algo": "sha256",
            "canonicalizer": "canonicalJsonStringify/v1",
            "value": self_hash,
        });
        let self_hash_bytes = serde_json::to_vec_pretty(&self_hash_doc)?;
        write_atomic(&self_hash_path, &self_hash_bytes)?;

        let mut final_manifest = manifest;
        refresh_self_hash_artifact(&mut final_manifest, &self_hash_bytes);
        let manifest_bytes = serde_json::to_vec_pretty(&final_manifest)?;
        write_atomic(&manifest_path, &manifest_bytes)?;

        Ok(EvidenceRun {
            evidence_run_id: run_id.to_string(),
            dir: dir.to_path_buf(),
        })
    }
}

fn artifact_for_details(details_path: &Path, details_rel: &str) -> Artifact {
    let kind = details_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Artifact {
        kind,
        path: details_rel.to_string(),
        bytes: None,
        sha256: None,
    }
}

fn relative_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

fn write_json_file(path: &Path, value: &Value) -> Result<(), EvidenceError> {
    use std::io::Write;
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut file = fs::File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// §4.H step 8: cross-field invariants.
fn validate_manifest_invariants(
    artifacts: &[Artifact],
    checks: &[Check],
    run_report_rel: &str,
) -> Result<(), EvidenceError> {
    let has_run_report = artifacts
        .iter()
        .any(|a| a.kind == "run_report_v1" && a.path == run_report_rel);
    if !has_run_report {
        return Err(EvidenceError::ManifestInvariant(
            "mode_snapshot_ref must reference a listed run_report_v1 artifact".to_string(),
        ));
    }

    let mut seen_paths = std::collections::HashSet::new();
    for artifact in artifacts {
        if !seen_paths.insert(artifact.path.as_str()) {
            return Err(EvidenceError::ManifestInvariant(format!(
                "duplicate artifact path '{}'",
                artifact.path
            )));
        }
    }

    let mut seen_names = std::collections::HashSet::new();
    for check in checks {
        if !seen_names.insert(check.name.as_str()) {
            return Err(EvidenceError::ManifestInvariant(format!(
                "duplicate check name '{}'",
                check.name
            )));
        }
        if let Some(details_ref) = &check.details_ref {
            if !artifacts.iter().any(|a| &a.path == details_ref) {
                return Err(EvidenceError::ManifestInvariant(format!(
                    "check '{}' references unlisted details_ref '{}'",
                    check.name, details_ref
                )));
            }
        }
    }

    Ok(())
}

/// §4.H step 9: SHA-256 of the manifest with the `manifest_self_hash_v1`
/// artifact entry excluded and the manifest's own `sha256` forced to null.
fn compute_self_hash(manifest: &Value) -> Result<String, EvidenceError> {
    let mut scratch = manifest.clone();
    if let Some(artifacts) = scratch.get_mut("artifacts").and_then(Value::as_array_mut) {
        artifacts.retain(|a| a.get("kind").and_then(Value::as_str) != Some("manifest_self_hash_v1"));
        for artifact in artifacts.iter_mut() {
            if artifact.get("kind").and_then(Value::as_str) == Some("evidence_manifest_v1") {
                if let Some(obj) = artifact.as_object_mut() {
                    obj.insert("sha256".to_string(), Value::Null);
                }
            }
        }
    }
    let bytes = canonical_json_bytes(&scratch)?;
    Ok(hash_bytes(HashAlgorithm::Sha256, &bytes).value)
}

fn refresh_self_hash_artifact(manifest: &mut Value, self_hash_bytes: &[u8]) {
    let digest = hash_bytes(HashAlgorithm::Sha256, self_hash_bytes);
    if let Some(artifacts) = manifest.get_mut("artifacts").and_then(Value::as_array_mut) {
        for artifact in artifacts.iter_mut() {
            if artifact.get("kind").and_then(Value::as_str) == Some("manifest_self_hash_v1") {
                if let Some(obj) = artifact.as_object_mut() {
                    obj.insert("bytes".to_string(), json!(self_hash_bytes.len() as u64));
                    obj.insert("sha256".to_string(), json!(digest.value));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
