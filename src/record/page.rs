use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{PageId, RecordId, SlotId, Tuple};
use super::schema::TupleDesc;
use crate::buffer::TransactionId;
use crate::file::PAGE_SIZE;

/// One fixed-size page of a heap file.
///
/// Layout: a header bitmap of `ceil(num_slots / 8)` bytes (bit `i % 8` of
/// byte `i / 8` set iff slot `i` holds a tuple), followed by `num_slots`
/// fixed-width tuple slots, followed by zero padding up to `PAGE_SIZE`.
/// Bitmap bits past `num_slots` are always zero.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    td: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page holds for a given schema.
    /// Each slot costs its tuple width plus one header bit.
    pub fn slots_per_page(td: &TupleDesc) -> usize {
        let tuple_size = td.byte_size();
        if tuple_size == 0 {
            return 0;
        }
        (PAGE_SIZE * 8) / (tuple_size * 8 + 1)
    }

    /// Size in bytes of the header bitmap for `num_slots` slots
    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// Bytes of a page with no tuples
    pub fn empty_page_data() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Create a new empty page
    pub fn new(pid: PageId, td: Arc<TupleDesc>) -> RecordResult<Self> {
        Self::from_bytes(pid, td, &Self::empty_page_data())
    }

    /// Decode a page from exactly `PAGE_SIZE` bytes
    pub fn from_bytes(pid: PageId, td: Arc<TupleDesc>, bytes: &[u8]) -> RecordResult<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(RecordError::CorruptPage(format!(
                "Invalid page size: {} bytes",
                bytes.len()
            )));
        }

        let num_slots = Self::slots_per_page(&td);
        if num_slots == 0 {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple size {} does not fit in a page",
                td.byte_size()
            )));
        }

        let page = Self {
            pid,
            td,
            data: bytes.to_vec(),
            num_slots,
            dirtied_by: None,
        };

        // Bits past the last slot describe slots that cannot exist
        let header_bits = Self::header_size(num_slots) * 8;
        if let Some(bit) = (num_slots..header_bits).find(|&bit| page.bit(bit)) {
            return Err(RecordError::CorruptPage(format!(
                "Page {} of table {} marks slot {} used but holds only {} slots",
                pid.page_no, pid.table_id, bit, num_slots
            )));
        }

        Ok(page)
    }

    /// Encode the page into exactly `PAGE_SIZE` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.td
    }

    /// Get the number of slots in this page
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Get the number of free slots
    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&slot_id| !self.is_slot_used(slot_id))
            .count()
    }

    /// Check if a slot is used
    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        slot_id < self.num_slots && self.bit(slot_id)
    }

    /// Find a free slot, returns None if page is full
    pub fn find_free_slot(&self) -> Option<SlotId> {
        let header = &self.data[..Self::header_size(self.num_slots)];
        header
            .iter()
            .position(|&byte| byte != 0xff)
            .map(|byte_idx| byte_idx * 8 + header[byte_idx].trailing_ones() as usize)
            .filter(|&slot_id| slot_id < self.num_slots)
    }

    /// First used slot at or after `from`
    pub fn next_used_slot(&self, from: SlotId) -> Option<SlotId> {
        (from..self.num_slots).find(|&slot_id| self.bit(slot_id))
    }

    /// Store `tuple` in the first free slot and bind its record id
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> RecordResult<SlotId> {
        let slot_id = self
            .find_free_slot()
            .ok_or(RecordError::PageFull(self.pid.page_no))?;

        // Encode before flipping the bit so a failed encode leaves the slot free
        let range = self.slot_range(slot_id);
        let td = Arc::clone(&self.td);
        tuple.serialize_into(&td, &mut self.data[range])?;
        self.set_bit(slot_id, true);

        tuple.set_record_id(Some(RecordId::new(self.pid, slot_id)));
        Ok(slot_id)
    }

    /// Free the slot `tuple` is stored in
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> RecordResult<()> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| RecordError::InvalidRecord("Tuple is not stored".to_string()))?;

        if rid.page_id != self.pid {
            return Err(RecordError::InvalidRecord(format!(
                "Tuple lives on page {:?}, not {:?}",
                rid.page_id, self.pid
            )));
        }

        if !self.is_slot_used(rid.slot_id) {
            return Err(RecordError::InvalidRecord(format!(
                "Slot {} of page {} is already free",
                rid.slot_id, self.pid.page_no
            )));
        }

        self.set_bit(rid.slot_id, false);
        // Free slots are stored as zero bytes
        let range = self.slot_range(rid.slot_id);
        self.data[range].fill(0);
        Ok(())
    }

    /// Decode the tuple in `slot_id`, or None if the slot is free
    pub fn tuple(&self, slot_id: SlotId) -> RecordResult<Option<Tuple>> {
        if !self.is_slot_used(slot_id) {
            return Ok(None);
        }

        let mut tuple = Tuple::deserialize(&self.data[self.slot_range(slot_id)], &self.td)?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot_id)));
        Ok(Some(tuple))
    }

    /// Iterate over the stored tuples in slot order
    pub fn tuples(&self) -> impl Iterator<Item = RecordResult<Tuple>> + '_ {
        (0..self.num_slots).filter_map(move |slot_id| self.tuple(slot_id).transpose())
    }

    /// Record that `tid` modified (or, with `dirty == false`, flushed) the page
    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirtied_by = dirty.then_some(tid);
    }

    /// Transaction that last dirtied the page, if it is dirty
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    fn slot_range(&self, slot_id: SlotId) -> std::ops::Range<usize> {
        let tuple_size = self.td.byte_size();
        let start = Self::header_size(self.num_slots) + slot_id * tuple_size;
        start..start + tuple_size
    }

    fn bit(&self, idx: usize) -> bool {
        (self.data[idx / 8] & (1 << (idx % 8))) != 0
    }

    fn set_bit(&mut self, idx: usize, value: bool) {
        if value {
            self.data[idx / 8] |= 1 << (idx % 8);
        } else {
            self.data[idx / 8] &= !(1 << (idx % 8));
        }
    }
}
