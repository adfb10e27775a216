use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corrupt storage: {0}")]
    CorruptStorage(String),

    #[error("Page out of range: page_no={page_no}, num_pages={num_pages}")]
    PageOutOfRange { page_no: usize, num_pages: usize },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
