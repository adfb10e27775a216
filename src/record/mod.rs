mod db_file;
mod error;
mod heap_file;
mod page;
mod record;
mod schema;
mod value;

pub use db_file::{CursorState, DbFile, DbFileIterator};
pub use error::{RecordError, RecordResult};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::HeapPage;
pub use record::{PageId, RecordId, SlotId, TableId, Tuple};
pub use schema::{TdItem, TupleDesc};
pub use value::{DEFAULT_STRING_LEN, Field, Type};
