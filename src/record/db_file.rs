use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::error::RecordResult;
use super::page::HeapPage;
use super::record::{PageId, TableId, Tuple};
use super::schema::TupleDesc;
use crate::buffer::{PageCache, PageRef, TransactionId};

/// On-disk storage of one table, as seen by the catalog and the page cache
pub trait DbFile: fmt::Debug + Send + Sync {
    /// Stable id of the table stored in this file
    fn id(&self) -> TableId;

    fn tuple_desc(&self) -> &Arc<TupleDesc>;

    /// Canonical path of the backing file
    fn path(&self) -> &Path;

    fn num_pages(&self) -> RecordResult<usize>;

    /// Read a page straight from disk, bypassing any cache
    fn read_page(&self, pid: PageId) -> RecordResult<HeapPage>;

    /// Write a page straight to disk
    fn write_page(&self, page: &HeapPage) -> RecordResult<()>;

    /// Store `tuple`, binding its record id; returns the pages it modified
    fn add_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        cache: &dyn PageCache,
    ) -> RecordResult<Vec<PageRef>>;

    /// Remove a stored tuple; returns the page it modified
    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        cache: &dyn PageCache,
    ) -> RecordResult<PageRef>;

    /// Cursor over every stored tuple
    fn iterator<'a>(
        &'a self,
        tid: TransactionId,
        cache: &'a dyn PageCache,
    ) -> Box<dyn DbFileIterator + 'a>;
}

/// Lifecycle of a `DbFileIterator`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unopened,
    Open,
    Exhausted,
    Closed,
}

/// Explicit open / has_next / next / rewind / close cursor protocol
pub trait DbFileIterator {
    fn state(&self) -> CursorState;

    /// Unopened -> Open
    fn open(&mut self) -> RecordResult<()>;

    /// Whether another tuple remains; moves Open -> Exhausted when none does
    fn has_next(&mut self) -> RecordResult<bool>;

    /// Next tuple; fails outside Open or when nothing remains
    fn next_tuple(&mut self) -> RecordResult<Tuple>;

    /// Back to the first tuple, from Open or Exhausted
    fn rewind(&mut self) -> RecordResult<()>;

    /// Any state -> Closed
    fn close(&mut self);
}
