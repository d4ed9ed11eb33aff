//! Durable checkpoint persistence.
//!
//! `FsCheckpointStore` never writes the canonical path in place. A save
//! serializes into a temp file next to the target, fsyncs it, and renames it
//! over the target. Readers therefore observe either the previous complete
//! checkpoint or the new one.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::pipeline::checkpoint::Checkpoint;

/// Errors emitted while writing a checkpoint. Reads never fail; see
/// [`CheckpointStore::load`].
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to stage checkpoint next to {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to replace checkpoint {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Load/save contract used by the pipeline driver. Saves are issued from a
/// single sequential caller.
pub trait CheckpointStore: Send + Sync {
    /// Previously persisted state, or `None` when it is missing or unusable.
    fn load(&self) -> Option<Checkpoint>;

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    path: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `checkpoint` into a sibling temp file without touching the
    /// canonical path. Dropping the result discards the temp file.
    pub fn stage(&self, checkpoint: &Checkpoint) -> Result<StagedCheckpoint, CheckpointError> {
        let parent = parent_dir(&self.path);
        fs::create_dir_all(&parent).map_err(|source| CheckpointError::CreateDir {
            path: parent.clone(),
            source,
        })?;

        let temp = NamedTempFile::new_in(&parent).map_err(|source| CheckpointError::Stage {
            path: self.path.clone(),
            source,
        })?;

        let mut writer = BufWriter::new(temp);
        serde_json::to_writer_pretty(&mut writer, checkpoint)?;
        writer.write_all(b"\n").map_err(|source| CheckpointError::Stage {
            path: self.path.clone(),
            source,
        })?;
        let temp = writer
            .into_inner()
            .map_err(|err| CheckpointError::Stage {
                path: self.path.clone(),
                source: err.into_error(),
            })?;
        temp.as_file()
            .sync_all()
            .map_err(|source| CheckpointError::Stage {
                path: self.path.clone(),
                source,
            })?;

        Ok(StagedCheckpoint {
            temp,
            target: self.path.clone(),
        })
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn load(&self) -> Option<Checkpoint> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no checkpoint found");
                return None;
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "checkpoint unreadable; starting fresh"
                );
                return None;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_slice(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "checkpoint is corrupt; starting fresh"
                );
                return None;
            }
        };

        if !checkpoint.is_consistent() {
            tracing::warn!(
                path = %self.path.display(),
                count = checkpoint.meta.count,
                items = checkpoint.items.len(),
                "checkpoint count does not match its items; starting fresh"
            );
            return None;
        }

        tracing::debug!(
            path = %self.path.display(),
            count = checkpoint.meta.count,
            "loaded checkpoint"
        );
        Some(checkpoint)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.stage(checkpoint)?.commit()?;
        tracing::debug!(
            path = %self.path.display(),
            count = checkpoint.meta.count,
            "checkpoint saved"
        );
        Ok(())
    }
}

/// A fully written temp file waiting to replace the canonical checkpoint.
#[derive(Debug)]
pub struct StagedCheckpoint {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedCheckpoint {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically rename the staged file over the canonical path.
    pub fn commit(self) -> Result<PathBuf, CheckpointError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|err| CheckpointError::Commit {
                path: target.clone(),
                source: err.error,
            })?;
        Ok(target)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
