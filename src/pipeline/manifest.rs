//! Completed-stage record.
//!
//! After each stage finishes, the orchestrator records when it finished, how
//! many items it produced, and fingerprints of its input and output. Resume
//! modes check the fingerprint of the stage they consume, so output left
//! behind by an interrupted or hand-edited stage is never mistaken for a
//! completed one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reelforge_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::mode::StageId;
use super::workspace::{list_dir, WorkspaceStore};

const MANIFEST_VERSION: u32 = 1;

/// One completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub completed_at: DateTime<Utc>,
    /// Items that succeeded.
    pub items: usize,
    /// Items that failed and were left out.
    #[serde(default)]
    pub failed: usize,
    pub input_fingerprint: Option<String>,
    pub output_fingerprint: String,
    /// The stage ended the run pending human input.
    #[serde(default)]
    pub deferred: bool,
}

/// `manifest.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    /// Keyed by [`StageId::name`].
    #[serde(default)]
    stages: BTreeMap<String, StageRecord>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            stages: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Read the manifest at `path`; `None` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_str(&content)?;
        if manifest.version != MANIFEST_VERSION {
            tracing::warn!(
                "{} has version {}, expected {}",
                path.display(),
                manifest.version,
                MANIFEST_VERSION
            );
        }
        Ok(Some(manifest))
    }

    /// Write the manifest atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn get(&self, stage: StageId) -> Option<&StageRecord> {
        self.stages.get(stage.name())
    }

    pub fn record(&mut self, stage: StageId, record: StageRecord) {
        self.stages.insert(stage.name().to_string(), record);
    }

    /// Drop the records of every stage after `marker` (all for `None`).
    pub fn drop_after(&mut self, marker: Option<StageId>) {
        for stage in StageId::after(marker) {
            self.stages.remove(stage.name());
        }
    }

    /// Completed stages, in order.
    pub fn completed(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|s| self.stages.contains_key(s.name()))
            .collect()
    }

    /// Check that `stage` completed and its directory still matches.
    pub fn verify(&self, stage: StageId, store: &WorkspaceStore) -> Result<()> {
        let record = self.get(stage).ok_or_else(|| {
            Error::precondition(format!(
                "{stage} has not completed in {}; run without resume flags first",
                store.root().display()
            ))
        })?;

        let dir = store.stage_dir(stage);
        let current = fingerprint_dir(&dir)?;
        if current != record.output_fingerprint {
            return Err(Error::precondition(format!(
                "partial or modified stage output in {} (recorded by {stage} at {}); \
                 re-run from an earlier stage",
                dir.display(),
                record.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
            )));
        }
        Ok(())
    }
}

/// SHA-256 over the sorted `(file name, byte size)` pairs of `files`.
pub fn fingerprint_files(files: &[PathBuf]) -> Result<String> {
    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(path)?.len();
        entries.push((name, size));
    }
    entries.sort();

    let mut hasher = Sha256::new();
    for (name, size) in &entries {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(size.to_le_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of the regular, non-hidden files in `dir`.
pub fn fingerprint_dir(dir: &Path) -> Result<String> {
    fingerprint_files(&list_dir(dir, None)?)
}
