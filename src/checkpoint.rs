//! Per-stage checkpoint files for resumable runs.
//!
//! Each completed stage is stored as `<dir>/<stage>.json`:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "stage": "plan_composition",
//!   "saved_at": "2025-01-01T12:00:00Z",
//!   "params_hash": "3fa2c81b9e04",
//!   "payload": { ... }
//! }
//! ```
//!
//! Writes go to `<stage>.json.tmp`, are synced, then renamed into place, so a
//! reader never sees a half-written checkpoint.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::PersistenceError;
use crate::pipeline::Stage;

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    stage: Stage,
    saved_at: DateTime<Utc>,
    params_hash: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    saved_at: DateTime<Utc>,
    params_hash: String,
    payload: T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    stage: Stage,
    saved_at: DateTime<Utc>,
    params_hash: String,
}

/// A loaded stage output with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint<T> {
    pub saved_at: DateTime<Utc>,
    pub params_hash: String,
    pub payload: T,
}

/// Metadata of one stored checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub stage: Stage,
    pub saved_at: DateTime<Utc>,
    pub params_hash: String,
    pub path: PathBuf,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{}.json", stage.name()))
    }

    pub fn exists(&self, stage: Stage) -> bool {
        self.path_for(stage).is_file()
    }

    /// Persist `payload` as the output of `stage`, replacing any earlier one.
    pub fn save<T: Serialize>(
        &self,
        stage: Stage,
        params_hash: &str,
        payload: &T,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(stage);
        let envelope = EnvelopeRef {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            stage,
            saved_at: Utc::now(),
            params_hash,
            payload,
        };
        let content = serde_json::to_string_pretty(&envelope)
            .map_err(|source| PersistenceError::Serialize { stage, source })?;

        let write_err = |source| PersistenceError::Write {
            stage,
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(write_err)?;

        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(write_err)?;
            file.write_all(content.as_bytes()).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        fs::rename(&tmp, &path).map_err(write_err)?;

        info!(stage = %stage, path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Read the output of `stage`; `None` if it was never saved.
    pub fn load<T: DeserializeOwned>(
        &self,
        stage: Stage,
    ) -> Result<Option<Checkpoint<T>>, PersistenceError> {
        let path = self.path_for(stage);
        let Some(content) = read_if_present(stage, &path)? else {
            debug!(stage = %stage, "no checkpoint");
            return Ok(None);
        };

        let header = parse_header(stage, &path, &content)?;
        if header.stage != stage {
            return Err(PersistenceError::Corrupt {
                stage,
                path,
                detail: format!("file records stage '{}'", header.stage),
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupt {
                stage,
                path: path.clone(),
                detail: e.to_string(),
            })?;

        info!(stage = %stage, path = %path.display(), "checkpoint loaded");
        Ok(Some(Checkpoint {
            saved_at: envelope.saved_at,
            params_hash: envelope.params_hash,
            payload: envelope.payload,
        }))
    }

    /// Every readable checkpoint, in stage order.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>, PersistenceError> {
        let mut summaries = Vec::new();
        for stage in Stage::ALL.into_iter().filter(|s| s.is_checkpointed()) {
            let path = self.path_for(stage);
            let Some(content) = read_if_present(stage, &path)? else {
                continue;
            };
            let header = parse_header(stage, &path, &content)?;
            summaries.push(CheckpointSummary {
                stage,
                saved_at: header.saved_at,
                params_hash: header.params_hash,
                path,
            });
        }
        Ok(summaries)
    }

    /// Delete the checkpoint for `stage`. Returns whether one existed.
    pub fn clear(&self, stage: Stage) -> Result<bool, PersistenceError> {
        let path = self.path_for(stage);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(stage = %stage, "checkpoint cleared");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Write {
                stage,
                path,
                source,
            }),
        }
    }

    /// Delete every checkpoint. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize, PersistenceError> {
        let mut removed = 0;
        for stage in Stage::ALL {
            if self.clear(stage)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Contents of `path`, or `None` when it or its directory does not exist.
fn read_if_present(stage: Stage, path: &Path) -> Result<Option<String>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
        Err(source) => Err(PersistenceError::Read {
            stage,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_header(stage: Stage, path: &Path, content: &str) -> Result<EnvelopeHeader, PersistenceError> {
    // Version first: older layouts must report a mismatch, not a shape error.
    let raw: serde_json::Value =
        serde_json::from_str(content).map_err(|e| PersistenceError::Corrupt {
            stage,
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    let found = raw
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| PersistenceError::Corrupt {
            stage,
            path: path.to_path_buf(),
            detail: "missing schema_version".to_string(),
        })?;
    if found != u64::from(CHECKPOINT_SCHEMA_VERSION) {
        return Err(PersistenceError::SchemaMismatch {
            stage,
            found: u32::try_from(found).unwrap_or(u32::MAX),
            expected: CHECKPOINT_SCHEMA_VERSION,
        });
    }
    serde_json::from_value(raw).map_err(|e| PersistenceError::Corrupt {
        stage,
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}
