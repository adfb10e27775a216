pub mod buffer;
pub mod catalog;
pub mod file;
pub mod record;

pub use buffer::{BUFFER_POOL_SIZE, BufferPool, PageCache, PageRef, Permissions, TransactionId};
pub use catalog::{Catalog, CatalogError, CatalogResult};
pub use file::{FileError, FileResult, PAGE_SIZE, PagedFile};
pub use record::{
    CursorState, DbFile, DbFileIterator, Field, HeapFile, HeapFileIterator, HeapPage, PageId,
    RecordError, RecordId, RecordResult, TableId, TdItem, Tuple, TupleDesc, Type,
};
