use std::path::PathBuf;
use thiserror::Error;

use crate::record::{RecordError, TableId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Record(#[from] RecordError),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table id {0} not found")]
    TableIdNotFound(TableId),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error(
        "Table id {id} of {} collides with already registered {}",
        .incoming.display(),
        .existing.display()
    )]
    IdConflict {
        id: TableId,
        existing: PathBuf,
        incoming: PathBuf,
    },
}

pub type CatalogResult<T> = Result<T, CatalogError>;
