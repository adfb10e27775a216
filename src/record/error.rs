use crate::file::FileError;
use thiserror::Error;

use super::record::TableId;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Table not found: id={0}")]
    TableNotFound(TableId),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Page full: page_no={0}")]
    PageFull(usize),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Corrupt page: {0}")]
    CorruptPage(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl RecordError {
    /// Whether this error means the backing storage can no longer be trusted
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RecordError::CorruptPage(_)
                | RecordError::File(FileError::CorruptStorage(_))
                | RecordError::File(FileError::PageOutOfRange { .. })
        )
    }
}

pub type RecordResult<T> = Result<T, RecordError>;
