//! Input dataset loading.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::hit::Hit;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse dataset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("hit at index {index} has an empty id")]
    EmptyId { index: usize },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Bare(Vec<Hit>),
    Wrapped { hits: Vec<Hit> },
}

/// Read hits from a JSON file holding either an array or `{ "hits": [...] }`.
pub async fn load_hits(path: impl AsRef<Path>) -> Result<Vec<Hit>, DatasetError> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let hits = parse_hits(&raw).map_err(|err| match err {
        ParseFailure::Json(source) => DatasetError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::EmptyId(index) => DatasetError::EmptyId { index },
    })?;
    tracing::debug!(path = %path.display(), hits = hits.len(), "loaded dataset");
    Ok(hits)
}

enum ParseFailure {
    Json(serde_json::Error),
    EmptyId(usize),
}

fn parse_hits(raw: &[u8]) -> Result<Vec<Hit>, ParseFailure> {
    let hits = match serde_json::from_slice::<DatasetFile>(raw).map_err(ParseFailure::Json)? {
        DatasetFile::Bare(hits) | DatasetFile::Wrapped { hits } => hits,
    };
    if let Some(index) = hits.iter().position(|hit| hit.id.trim().is_empty()) {
        return Err(ParseFailure::EmptyId(index));
    }
    Ok(hits)
}
