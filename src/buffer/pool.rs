use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, warn};

use super::{BUFFER_POOL_SIZE, PageCache, PageRef, Permissions, TransactionId};
use crate::catalog::Catalog;
use crate::record::{DbFile, PageId, RecordError, RecordResult, TableId, Tuple};

/// Page cache with LRU eviction policy.
///
/// Pages are resolved to their heap files through the shared catalog. Dirty
/// pages are written back when evicted, flushed, or when the pool is dropped.
/// No locking is done on behalf of transactions.
pub struct BufferPool {
    catalog: Arc<RwLock<Catalog>>,
    /// Cached pages in recency order; the LRU entry is evicted first
    pages: Mutex<LruCache<PageId, PageRef>>,
    capacity: usize,
}

impl BufferPool {
    /// Create a buffer pool holding up to `BUFFER_POOL_SIZE` pages
    pub fn new(catalog: Arc<RwLock<Catalog>>) -> Self {
        Self::with_capacity(catalog, BUFFER_POOL_SIZE)
    }

    /// Create a buffer pool with specified capacity (at least one page)
    pub fn with_capacity(catalog: Arc<RwLock<Catalog>>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            catalog,
            pages: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
        }
    }

    pub fn catalog(&self) -> &Arc<RwLock<Catalog>> {
        &self.catalog
    }

    /// Add `tuple` to the table, marking every page it touched as dirtied by `tid`
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> RecordResult<()> {
        let file = self.db_file(table_id)?;
        let modified = file.add_tuple(tid, tuple, self)?;
        self.mark_modified(tid, modified)
    }

    /// Remove a stored tuple from its table, marking its page as dirtied by `tid`
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> RecordResult<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| RecordError::InvalidRecord("Tuple is not stored".to_string()))?;
        let file = self.db_file(rid.page_id.table_id)?;
        let modified = file.delete_tuple(tid, tuple, self)?;
        self.mark_modified(tid, vec![modified])
    }

    /// Write a cached page to disk if it's dirty
    pub fn flush_page(&self, pid: PageId) -> RecordResult<()> {
        // Peek so flushing doesn't count as a use
        let page_ref = self.cached_pages().peek(&pid).cloned();
        match page_ref {
            Some(page_ref) => self.write_back(pid, &page_ref),
            None => Ok(()),
        }
    }

    /// Write every dirty cached page to disk
    pub fn flush_all_pages(&self) -> RecordResult<()> {
        let cached: Vec<(PageId, PageRef)> = self
            .cached_pages()
            .iter()
            .map(|(pid, page_ref)| (*pid, Arc::clone(page_ref)))
            .collect();

        for (pid, page_ref) in cached {
            self.write_back(pid, &page_ref)?;
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it, losing any unflushed changes
    pub fn discard_page(&self, pid: PageId) {
        if self.cached_pages().pop(&pid).is_some() {
            debug!(table = %pid.table_id, page = pid.page_no, "discarded page");
        }
    }

    pub fn is_page_cached(&self, pid: PageId) -> bool {
        self.cached_pages().contains(&pid)
    }

    /// Get the number of pages currently in the pool
    pub fn cached_page_count(&self) -> usize {
        self.cached_pages().len()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.cached_pages()
            .iter()
            .filter(|(_, page_ref)| page_ref.read().unwrap_or_else(PoisonError::into_inner).is_dirty())
            .count()
    }

    /// Pages are only swapped in and out under this lock, never left half
    /// updated, so a lock poisoned by a panicking caller is still usable
    fn cached_pages(&self) -> MutexGuard<'_, LruCache<PageId, PageRef>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn db_file(&self, table_id: TableId) -> RecordResult<Arc<dyn DbFile>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_db_file(table_id)
            .map_err(|_| RecordError::TableNotFound(table_id))
    }

    /// Flag modified pages dirty and make sure they are cached, since a page
    /// may have been evicted while the file was still working on it
    fn mark_modified(&self, tid: TransactionId, modified: Vec<PageRef>) -> RecordResult<()> {
        for page_ref in modified {
            let pid = {
                let mut page = page_ref.write().unwrap_or_else(PoisonError::into_inner);
                page.mark_dirty(true, tid);
                page.id()
            };

            let mut pages = self.cached_pages();
            if pages.get(&pid).is_none() {
                self.make_room(&mut pages)?;
                pages.put(pid, page_ref);
            }
        }
        Ok(())
    }

    /// Write a page to its file if dirty, then mark it clean
    fn write_back(&self, pid: PageId, page_ref: &PageRef) -> RecordResult<()> {
        let mut page = page_ref.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(tid) = page.dirtied_by() {
            self.db_file(pid.table_id)?.write_page(&page)?;
            page.mark_dirty(false, tid);
            debug!(table = %pid.table_id, page = pid.page_no, %tid, "flushed page");
        }
        Ok(())
    }

    /// Evict least recently used pages until one more fits
    fn make_room(&self, pages: &mut LruCache<PageId, PageRef>) -> RecordResult<()> {
        while pages.len() >= self.capacity {
            let Some((&pid, page_ref)) = pages.peek_lru() else {
                break;
            };
            let page_ref = Arc::clone(page_ref);

            // Only drop the page once it is safely on disk
            self.write_back(pid, &page_ref)?;
            pages.pop(&pid);
            debug!(table = %pid.table_id, page = pid.page_no, "evicted page");
        }
        Ok(())
    }
}

impl PageCache for BufferPool {
    fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> RecordResult<PageRef> {
        if let Some(page_ref) = self.cached_pages().get(&pid) {
            return Ok(Arc::clone(page_ref));
        }

        // Read without holding the pool so catalog and disk access don't
        // block other lookups
        let page = self.db_file(pid.table_id)?.read_page(pid)?;
        debug!(table = %pid.table_id, page = pid.page_no, %tid, ?perm, "loaded page");

        let mut pages = self.cached_pages();
        if let Some(page_ref) = pages.get(&pid) {
            return Ok(Arc::clone(page_ref));
        }
        self.make_room(&mut pages)?;

        let page_ref = Arc::new(RwLock::new(page));
        pages.put(pid, Arc::clone(&page_ref));
        Ok(page_ref)
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(err) = self.flush_all_pages() {
            warn!(error = %err, "failed to flush buffer pool on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, HeapFile, HeapPage, RecordId, TdItem, TupleDesc, Type};
    use tempfile::TempDir;

    struct TestEnv {
        _temp_dir: TempDir,
        file: Arc<HeapFile>,
        catalog: Arc<RwLock<Catalog>>,
    }

    impl TestEnv {
        fn new(num_pages: usize) -> Self {
            let temp_dir = tempfile::tempdir().unwrap();
            let desc = TupleDesc::new(vec![
                TdItem::new("id", Type::Int),
                TdItem::new("name", Type::String(20)),
            ]);
            let file = Arc::new(HeapFile::open(temp_dir.path().join("test.dat"), desc).unwrap());

            for page_no in 0..num_pages {
                let page = HeapPage::new(Self::pid_of(&file, page_no), Arc::clone(file.tuple_desc())).unwrap();
                file.write_page(&page).unwrap();
            }

            let mut catalog = Catalog::with_data_dir(temp_dir.path());
            catalog.add_table(Arc::clone(&file) as Arc<dyn DbFile>, "test").unwrap();

            Self {
                _temp_dir: temp_dir,
                file,
                catalog: Arc::new(RwLock::new(catalog)),
            }
        }

        fn pid_of(file: &HeapFile, page_no: usize) -> PageId {
            PageId::new(file.id(), page_no)
        }

        fn pid(&self, page_no: usize) -> PageId {
            Self::pid_of(&self.file, page_no)
        }

        fn pool(&self, capacity: usize) -> BufferPool {
            BufferPool::with_capacity(Arc::clone(&self.catalog), capacity)
        }

        /// Tuples stored on disk for a page, bypassing any cache
        fn on_disk(&self, page_no: usize) -> Vec<Tuple> {
            self.file
                .read_page(self.pid(page_no))
                .unwrap()
                .tuples()
                .collect::<RecordResult<Vec<_>>>()
                .unwrap()
        }
    }

    fn row(i: i32) -> Tuple {
        Tuple::new(vec![Field::Int(i), Field::String(format!("User{}", i))])
    }

    fn fetch(pool: &BufferPool, pid: PageId) -> PageRef {
        pool.get_page(TransactionId::new(), pid, Permissions::ReadOnly)
            .unwrap()
    }

    #[test]
    fn test_get_page_cached() {
        let env = TestEnv::new(1);
        let pool = env.pool(BUFFER_POOL_SIZE);

        assert!(!pool.is_page_cached(env.pid(0)));
        let first = fetch(&pool, env.pid(0));
        assert!(pool.is_page_cached(env.pid(0)));

        let second = fetch(&pool, env.pid(0));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.cached_page_count(), 1);
    }

    #[test]
    fn test_get_page_unknown_table() {
        let env = TestEnv::new(1);
        let pool = env.pool(BUFFER_POOL_SIZE);

        let pid = PageId::new(TableId::new(env.file.id().as_u32().wrapping_add(1)), 0);
        let result = pool.get_page(TransactionId::new(), pid, Permissions::ReadOnly);
        assert!(matches!(result, Err(RecordError::TableNotFound(_))));
        assert_eq!(pool.cached_page_count(), 0);
    }

    #[test]
    fn test_get_page_past_end() {
        let env = TestEnv::new(1);
        let pool = env.pool(BUFFER_POOL_SIZE);

        let result = pool.get_page(TransactionId::new(), env.pid(5), Permissions::ReadOnly);
        assert!(result.unwrap_err().is_corruption());
    }

    #[test]
    fn test_zero_capacity_holds_one_page() {
        let env = TestEnv::new(2);
        let pool = env.pool(0);

        fetch(&pool, env.pid(0));
        fetch(&pool, env.pid(1));
        assert_eq!(pool.cached_page_count(), 1);
        assert!(pool.is_page_cached(env.pid(1)));
    }

    #[test]
    fn test_insert_marks_dirty() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);
        let tid = TransactionId::new();

        let mut tuple = row(1);
        pool.insert_tuple(tid, env.file.id(), &mut tuple).unwrap();

        let rid = tuple.record_id().unwrap();
        assert_eq!(rid.page_id, env.pid(0));
        assert_eq!(pool.dirty_page_count(), 1);
        assert_eq!(fetch(&pool, env.pid(0)).read().unwrap().dirtied_by(), Some(tid));

        // Nothing reaches the file until a flush
        assert!(env.on_disk(0).is_empty());
    }

    #[test]
    fn test_insert_unknown_table() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);

        let result = pool.insert_tuple(TransactionId::new(), TableId::new(7), &mut row(1));
        assert!(matches!(result, Err(RecordError::TableNotFound(_))));
    }

    #[test]
    fn test_flush_page() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);

        pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(55)).unwrap();
        pool.flush_page(env.pid(0)).unwrap();

        assert_eq!(pool.dirty_page_count(), 0);
        let mut expected = row(55);
        expected.set_record_id(Some(RecordId::new(env.pid(0), 0)));
        assert_eq!(env.on_disk(0), vec![expected]);

        // Flushing an uncached page is a no-op
        pool.flush_page(env.pid(3)).unwrap();
    }

    #[test]
    fn test_flush_all_pages() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);
        let slots = env.file.slots_per_page();

        let count = slots + 3;
        for i in 0..count as i32 {
            pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(i)).unwrap();
        }
        assert_eq!(pool.dirty_page_count(), 2);

        pool.flush_all_pages().unwrap();
        assert_eq!(pool.dirty_page_count(), 0);
        assert_eq!(env.on_disk(0).len(), slots);
        assert_eq!(env.on_disk(1).len(), 3);
    }

    #[test]
    fn test_delete_tuple() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);

        let mut tuple = row(1);
        pool.insert_tuple(TransactionId::new(), env.file.id(), &mut tuple).unwrap();
        pool.flush_all_pages().unwrap();
        assert_eq!(env.on_disk(0).len(), 1);

        pool.delete_tuple(TransactionId::new(), &tuple).unwrap();
        assert_eq!(pool.dirty_page_count(), 1);
        pool.flush_all_pages().unwrap();
        assert!(env.on_disk(0).is_empty());

        // Unstored tuples can't be deleted
        let result = pool.delete_tuple(TransactionId::new(), &row(2));
        assert!(matches!(result, Err(RecordError::InvalidRecord(_))));
    }

    #[test]
    fn test_discard_page() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);

        pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(1)).unwrap();
        pool.discard_page(env.pid(0));

        assert!(!pool.is_page_cached(env.pid(0)));
        assert_eq!(pool.dirty_page_count(), 0);
        assert!(env.on_disk(0).is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let env = TestEnv::new(4);
        let pool = env.pool(3);

        for page_no in 0..3 {
            fetch(&pool, env.pid(page_no));
        }
        assert_eq!(pool.cached_page_count(), 3);

        // Page 0 is least recently used
        fetch(&pool, env.pid(3));
        assert_eq!(pool.cached_page_count(), 3);
        assert!(!pool.is_page_cached(env.pid(0)));
        assert!(pool.is_page_cached(env.pid(1)));
        assert!(pool.is_page_cached(env.pid(2)));
        assert!(pool.is_page_cached(env.pid(3)));
    }

    #[test]
    fn test_lru_update_on_access() {
        let env = TestEnv::new(4);
        let pool = env.pool(3);

        for page_no in 0..3 {
            fetch(&pool, env.pid(page_no));
        }
        fetch(&pool, env.pid(0));

        fetch(&pool, env.pid(3));
        assert!(pool.is_page_cached(env.pid(0)));
        assert!(!pool.is_page_cached(env.pid(1)));
        assert!(pool.is_page_cached(env.pid(2)));
        assert!(pool.is_page_cached(env.pid(3)));
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let env = TestEnv::new(0);
        let pool = env.pool(1);

        pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(77)).unwrap();
        env.file
            .write_page(&HeapPage::new(env.pid(1), Arc::clone(env.file.tuple_desc())).unwrap())
            .unwrap();

        fetch(&pool, env.pid(1));
        assert!(!pool.is_page_cached(env.pid(0)));

        let stored = env.on_disk(0);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get(0), Some(&Field::Int(77)));
    }

    #[test]
    fn test_scan_through_pool() {
        let env = TestEnv::new(0);
        let pool = env.pool(2);
        let count = env.file.slots_per_page() * 3 + 1;

        for i in 0..count as i32 {
            pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(i)).unwrap();
        }
        assert!(pool.cached_page_count() <= 2);

        let ids: Vec<i32> = env
            .file
            .iter(TransactionId::new(), &pool)
            .map(|tuple| match tuple.unwrap().get(0) {
                Some(Field::Int(id)) => *id,
                other => panic!("unexpected field {:?}", other),
            })
            .collect();
        assert_eq!(ids, (0..count as i32).collect::<Vec<_>>());
    }

    #[test]
    fn test_scan_sees_page_reloaded_after_eviction() {
        let env = TestEnv::new(0);
        let pool = env.pool(1);
        let tid = TransactionId::new();

        pool.insert_tuple(tid, env.file.id(), &mut row(0)).unwrap();
        env.file
            .write_page(&HeapPage::new(env.pid(1), Arc::clone(env.file.tuple_desc())).unwrap())
            .unwrap();

        let mut cursor = env.file.iter(tid, &pool);
        assert_eq!(cursor.next().unwrap().unwrap().get(0), Some(&Field::Int(0)));

        // Push page 0 out, then modify a freshly loaded copy of it
        fetch(&pool, env.pid(1));
        assert!(!pool.is_page_cached(env.pid(0)));
        pool.insert_tuple(tid, env.file.id(), &mut row(1)).unwrap();

        let rest: Vec<Tuple> = cursor.collect::<RecordResult<_>>().unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].get(0), Some(&Field::Int(1)));
    }

    #[test]
    fn test_poisoned_locks_still_flush() {
        let env = TestEnv::new(0);
        let pool = env.pool(BUFFER_POOL_SIZE);
        pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(9)).unwrap();

        // Panic while holding the pool and catalog locks
        let poisoned: std::thread::Result<()> = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _pages = pool.pages.lock().unwrap();
            let _catalog = env.catalog.write().unwrap();
            panic!("writer died");
        }));
        assert!(poisoned.is_err());
        assert!(pool.pages.is_poisoned());
        assert!(env.catalog.is_poisoned());

        assert_eq!(pool.cached_page_count(), 1);
        fetch(&pool, env.pid(0));
        pool.flush_all_pages().unwrap();
        assert_eq!(pool.dirty_page_count(), 0);
        assert_eq!(env.on_disk(0).len(), 1);
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let env = TestEnv::new(0);

        {
            let pool = env.pool(BUFFER_POOL_SIZE);
            pool.insert_tuple(TransactionId::new(), env.file.id(), &mut row(88)).unwrap();
        }

        let stored = env.on_disk(0);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get(0), Some(&Field::Int(88)));
    }
}
