use std::path::Path;
use std::sync::{Arc, PoisonError};

use tracing::debug;

use super::db_file::{CursorState, DbFile, DbFileIterator};
use super::error::{RecordError, RecordResult};
use super::page::HeapPage;
use super::record::{PageId, SlotId, TableId, Tuple};
use super::schema::TupleDesc;
use crate::buffer::{PageCache, PageRef, Permissions, TransactionId};
use crate::file::{PAGE_SIZE, PageNo, PagedFile};

/// A table stored as an unordered sequence of `HeapPage`s in one file.
///
/// The heap file never caches or locks pages itself: every access to a live
/// page goes through the `PageCache` handed to each call.
#[derive(Debug)]
pub struct HeapFile {
    file: PagedFile,
    td: Arc<TupleDesc>,
    id: TableId,
}

impl HeapFile {
    /// Open (or create) the heap file at `path` holding tuples of schema `td`
    pub fn open<P: AsRef<Path>>(path: P, td: TupleDesc) -> RecordResult<Self> {
        if HeapPage::slots_per_page(&td) == 0 {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple size {} does not fit in a page",
                td.byte_size()
            )));
        }

        let file = PagedFile::open(path)?;
        let id = TableId::from_path(file.path());

        Ok(Self {
            file,
            td: Arc::new(td),
            id,
        })
    }

    /// Number of tuples one page of this file holds
    pub fn slots_per_page(&self) -> usize {
        HeapPage::slots_per_page(&self.td)
    }

    /// Flush the backing file to stable storage
    pub fn sync(&self) -> RecordResult<()> {
        self.file.sync()?;
        Ok(())
    }

    /// Cursor over every stored tuple, in page then slot order
    pub fn iter<'a>(&'a self, tid: TransactionId, cache: &'a dyn PageCache) -> HeapFileIterator<'a> {
        HeapFileIterator::new(self, tid, cache)
    }

    fn page_id(&self, page_no: PageNo) -> PageId {
        PageId::new(self.id, page_no)
    }

    fn check_owned(&self, pid: PageId) -> RecordResult<()> {
        if pid.table_id != self.id {
            return Err(RecordError::InvalidRecord(format!(
                "Page {:?} does not belong to table {}",
                pid, self.id
            )));
        }
        Ok(())
    }

    /// Append an empty page to the end of the file
    fn allocate_page(&self) -> RecordResult<PageNo> {
        let page_no = self.file.page_count()?;
        self.file.write_page(page_no, &HeapPage::empty_page_data())?;
        debug!(table_id = %self.id, page_no, "allocated heap page");
        Ok(page_no)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.id
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.td
    }

    fn path(&self) -> &Path {
        self.file.path()
    }

    fn num_pages(&self) -> RecordResult<usize> {
        Ok(self.file.page_count()?)
    }

    fn read_page(&self, pid: PageId) -> RecordResult<HeapPage> {
        self.check_owned(pid)?;

        let mut buffer = vec![0u8; PAGE_SIZE];
        self.file.read_page(pid.page_no, &mut buffer)?;
        HeapPage::from_bytes(pid, Arc::clone(&self.td), &buffer)
    }

    fn write_page(&self, page: &HeapPage) -> RecordResult<()> {
        self.check_owned(page.id())?;
        self.file.write_page(page.id().page_no, &page.to_bytes())?;
        Ok(())
    }

    fn add_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
        cache: &dyn PageCache,
    ) -> RecordResult<Vec<PageRef>> {
        self.td.validate(tuple.fields())?;

        // First page with room wins, so freed slots are reused before the
        // file grows
        for page_no in 0..self.num_pages()? {
            let pid = self.page_id(page_no);
            let has_room = {
                let page_ref = cache.get_page(tid, pid, Permissions::ReadOnly)?;
                let page = page_ref.read().unwrap_or_else(PoisonError::into_inner);
                page.find_free_slot().is_some()
            };

            if has_room {
                let page_ref = cache.get_page(tid, pid, Permissions::ReadWrite)?;
                page_ref.write().unwrap_or_else(PoisonError::into_inner).insert_tuple(tuple)?;
                return Ok(vec![page_ref]);
            }
        }

        let page_no = self.allocate_page()?;
        let page_ref = cache.get_page(tid, self.page_id(page_no), Permissions::ReadWrite)?;
        page_ref.write().unwrap_or_else(PoisonError::into_inner).insert_tuple(tuple)?;
        Ok(vec![page_ref])
    }

    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        cache: &dyn PageCache,
    ) -> RecordResult<PageRef> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| RecordError::InvalidRecord("Tuple is not stored".to_string()))?;
        self.check_owned(rid.page_id)?;

        let num_pages = self.num_pages()?;
        if rid.page_id.page_no >= num_pages {
            return Err(RecordError::InvalidRecord(format!(
                "Page {} is past the end of table {} ({} pages)",
                rid.page_id.page_no, self.id, num_pages
            )));
        }

        let page_ref = cache.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        page_ref.write().unwrap_or_else(PoisonError::into_inner).delete_tuple(tuple)?;
        Ok(page_ref)
    }

    fn iterator<'a>(
        &'a self,
        tid: TransactionId,
        cache: &'a dyn PageCache,
    ) -> Box<dyn DbFileIterator + 'a> {
        Box::new(self.iter(tid, cache))
    }
}

/// Streaming heap file scan (yields tuples one-by-one through the page cache).
///
/// Besides the explicit `DbFileIterator` protocol this is a plain `Iterator`,
/// which opens itself on the first pull.
pub struct HeapFileIterator<'a> {
    file: &'a HeapFile,
    tid: TransactionId,
    cache: &'a dyn PageCache,
    state: CursorState,
    page_no: PageNo,
    slot_id: SlotId,
    lookahead: Option<Tuple>,
}

impl<'a> HeapFileIterator<'a> {
    fn new(file: &'a HeapFile, tid: TransactionId, cache: &'a dyn PageCache) -> Self {
        Self {
            file,
            tid,
            cache,
            state: CursorState::Unopened,
            page_no: 0,
            slot_id: 0,
            lookahead: None,
        }
    }

    fn reset(&mut self) {
        self.page_no = 0;
        self.slot_id = 0;
        self.lookahead = None;
    }

    fn invalid(&self, op: &str) -> RecordError {
        RecordError::InvalidOperation(format!("{} on a {:?} cursor", op, self.state))
    }

    /// Advance to the next occupied slot, fetching pages as needed.
    ///
    /// The page is looked up through the cache on every call rather than
    /// held between calls, so the scan always sees the cache's current copy.
    fn fetch_next(&mut self) -> RecordResult<Option<Tuple>> {
        loop {
            // Re-checked per page so tuples appended mid-scan are seen
            if self.page_no >= self.file.num_pages()? {
                return Ok(None);
            }
            let pid = self.file.page_id(self.page_no);
            let page_ref = self.cache.get_page(self.tid, pid, Permissions::ReadOnly)?;

            let found = {
                let page = page_ref.read().unwrap_or_else(PoisonError::into_inner);
                match page.next_used_slot(self.slot_id) {
                    Some(slot_id) => page.tuple(slot_id)?.map(|tuple| (slot_id, tuple)),
                    None => None,
                }
            };

            match found {
                Some((slot_id, tuple)) => {
                    self.slot_id = slot_id + 1;
                    return Ok(Some(tuple));
                }
                None => {
                    self.page_no += 1;
                    self.slot_id = 0;
                }
            }
        }
    }
}

impl DbFileIterator for HeapFileIterator<'_> {
    fn state(&self) -> CursorState {
        self.state
    }

    fn open(&mut self) -> RecordResult<()> {
        if self.state != CursorState::Unopened {
            return Err(self.invalid("open"));
        }
        self.reset();
        self.state = CursorState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> RecordResult<bool> {
        match self.state {
            CursorState::Open => {}
            CursorState::Exhausted => return Ok(false),
            CursorState::Unopened | CursorState::Closed => return Err(self.invalid("has_next")),
        }

        if self.lookahead.is_some() {
            return Ok(true);
        }

        match self.fetch_next()? {
            Some(tuple) => {
                self.lookahead = Some(tuple);
                Ok(true)
            }
            None => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
        }
    }

    fn next_tuple(&mut self) -> RecordResult<Tuple> {
        if self.state != CursorState::Open || !self.has_next()? {
            return Err(self.invalid("next"));
        }
        self.lookahead.take().ok_or_else(|| self.invalid("next"))
    }

    fn rewind(&mut self) -> RecordResult<()> {
        match self.state {
            CursorState::Open | CursorState::Exhausted => {
                self.reset();
                self.state = CursorState::Open;
                Ok(())
            }
            CursorState::Unopened | CursorState::Closed => Err(self.invalid("rewind")),
        }
    }

    fn close(&mut self) {
        self.reset();
        self.state = CursorState::Closed;
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = RecordResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::Unopened
            && let Err(err) = self.open()
        {
            return Some(Err(err));
        }

        match self.has_next() {
            Ok(true) => Some(self.next_tuple()),
            Ok(false) => None,
            // A closed cursor simply ends
            Err(_) if self.state == CursorState::Closed => None,
            Err(err) => Some(Err(err)),
        }
    }
}
