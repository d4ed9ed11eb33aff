//! Application-level error type shared by the binary and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config;
use crate::services::{
    CheckpointError, DatasetError, ExportError, GenerationError, PipelineError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("no usable checkpoint at {path}")]
    MissingCheckpoint { path: PathBuf },
}
