mod pool;

pub use pool::BufferPool;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::record::{HeapPage, PageId, RecordResult};

/// Default number of pages held by a `BufferPool`
pub const BUFFER_POOL_SIZE: usize = 50;

/// Shared handle to a cached page
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Identifier of the transaction on whose behalf pages are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

impl TransactionId {
    /// Allocate a fresh, process-unique transaction id
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Access mode requested for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// Cached, permissioned page access.
///
/// Every read or write of a live page by the storage layer goes through this
/// trait. Implementations own locking, pinning and eviction; callers never
/// touch the backing file for a page that may be cached.
pub trait PageCache {
    fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> RecordResult<PageRef>;
}
