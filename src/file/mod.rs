mod error;
mod paged_file;

pub use error::{FileError, FileResult};
pub use paged_file::PagedFile;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page number within a single file
pub type PageNo = usize;
