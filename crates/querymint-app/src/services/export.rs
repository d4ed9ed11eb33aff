//! Flatten a checkpoint into a CSV table, one row per generated phrase.
//!
//! Rows are written into a temp file next to the destination and persisted on
//! success, so an interrupted export never leaves a half-written table behind.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::pipeline::checkpoint::Checkpoint;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export file next to {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to flush export {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist export to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct QueryRow<'a> {
    id: &'a str,
    display_name: &'a str,
    category: &'static str,
    rank: usize,
    query: &'a str,
}

/// Write `checkpoint` to `path` as CSV and return the number of data rows.
pub fn export_csv(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<usize, ExportError> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(parent).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(temp));
    let rows = write_rows(checkpoint, &mut writer)?;

    let buffered = writer.into_inner().map_err(|err| ExportError::Flush {
        path: path.to_path_buf(),
        source: std::io::Error::other(err.error().to_string()),
    })?;
    let mut temp = buffered.into_inner().map_err(|err| ExportError::Flush {
        path: path.to_path_buf(),
        source: err.into_error(),
    })?;
    temp.flush().map_err(|source| ExportError::Flush {
        path: path.to_path_buf(),
        source,
    })?;
    temp.persist(path).map_err(|err| ExportError::Persist {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    tracing::info!(path = %path.display(), rows, items = checkpoint.len(), "exported queries");
    Ok(rows)
}

fn write_rows<W: Write>(
    checkpoint: &Checkpoint,
    writer: &mut csv::Writer<W>,
) -> Result<usize, ExportError> {
    writer.write_record(["id", "display_name", "category", "rank", "query"])?;
    let mut rows = 0usize;
    for item in &checkpoint.items {
        let Some(query_set) = item.query_set.as_ref() else {
            continue;
        };
        for (category, phrases) in query_set.categories() {
            for (rank, query) in phrases.iter().enumerate() {
                writer.serialize(QueryRow {
                    id: &item.id,
                    display_name: &item.display_name,
                    category: category.as_str(),
                    rank: rank + 1,
                    query,
                })?;
                rows += 1;
            }
        }
    }
    Ok(rows)
}
