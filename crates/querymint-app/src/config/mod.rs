//! Configuration loading and XDG path helpers.
//!
//! Sources, lowest precedence first: built-in defaults, `config/settings.*` in
//! the working directory, the file named by `QUERYMINT_CONFIG_FILE`, then
//! `QUERYMINT__SECTION__KEY` environment variables.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_FILE, DEFAULT_CONCURRENCY, DEFAULT_GENERATION_MODEL,
    DEFAULT_SAVE_EVERY,
};

const CONFIG_FILE: &str = "config/settings";
const CONFIG_FILE_ENV: &str = "QUERYMINT_CONFIG_FILE";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error("pipeline.{key} must be greater than zero")]
    ZeroValue { key: &'static str },
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub save_every: usize,
}

impl PipelineConfig {
    pub fn batch_size(&self) -> Result<NonZeroUsize, AppConfigError> {
        non_zero("batch_size", self.batch_size)
    }

    pub fn concurrency(&self) -> Result<NonZeroUsize, AppConfigError> {
        non_zero("concurrency", self.concurrency)
    }

    pub fn save_every(&self) -> Result<NonZeroUsize, AppConfigError> {
        non_zero("save_every", self.save_every)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub checkpoint_path: PathBuf,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_checkpoint = default_checkpoint_path()?;
    let mut builder = Config::builder()
        .set_default("generation.model", DEFAULT_GENERATION_MODEL)?
        .set_default("pipeline.batch_size", DEFAULT_BATCH_SIZE.get() as u64)?
        .set_default("pipeline.concurrency", DEFAULT_CONCURRENCY.get() as u64)?
        .set_default("pipeline.save_every", DEFAULT_SAVE_EVERY.get() as u64)?
        .set_default(
            "storage.checkpoint_path",
            default_checkpoint.to_string_lossy().to_string(),
        )?
        .add_source(File::with_name(CONFIG_FILE).required(false));

    if let Some(path) = std::env::var_os(CONFIG_FILE_ENV) {
        builder = builder.add_source(File::from(PathBuf::from(path)).required(true));
    }

    let cfg = builder
        .add_source(Environment::with_prefix("QUERYMINT").separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("dev", "querymint", "querymint").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_checkpoint_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join(DEFAULT_CHECKPOINT_FILE))
}

fn non_zero(key: &'static str, value: usize) -> Result<NonZeroUsize, AppConfigError> {
    NonZeroUsize::new(value).ok_or(AppConfigError::ZeroValue { key })
}
