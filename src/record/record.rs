use std::fmt;
use std::path::Path;

use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::value::Field;
use crate::file::PageNo;

/// Slot identifier within a page
pub type SlotId = usize;

/// Stable numeric identifier of a table.
///
/// Derived from the CRC-32 of the backing file's canonical path, so the same
/// file yields the same id in every process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u32);

impl TableId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Derive the id of the file at `canonical_path`
    pub fn from_path(canonical_path: &Path) -> Self {
        Self(crc32fast::hash(canonical_path.as_os_str().as_encoded_bytes()))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one page of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: PageNo) -> Self {
        Self { table_id, page_no }
    }
}

/// Physical identifier for a tuple (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

/// A single tuple (row), bound to a `RecordId` once stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create a new, unstored tuple
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    /// Get the number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a field by index
    pub fn get(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    /// Get all fields
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Replace a field by index
    pub fn set_field(&mut self, idx: usize, field: Field) -> RecordResult<()> {
        let slot = self.fields.get_mut(idx).ok_or_else(|| {
            RecordError::InvalidRecord(format!("Field index {} out of bounds", idx))
        })?;
        *slot = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Encode the tuple into a slot of exactly `td.byte_size()` bytes
    pub fn serialize_into(&self, td: &TupleDesc, buf: &mut [u8]) -> RecordResult<()> {
        td.validate(&self.fields)?;

        if buf.len() != td.byte_size() {
            return Err(RecordError::InvalidRecord(format!(
                "Tuple size mismatch: expected {}, got {}",
                td.byte_size(),
                buf.len()
            )));
        }

        let mut offset = 0;
        for (field, item) in self.fields.iter().zip(td.iter()) {
            let size = item.field_type.size();
            field.serialize_into(&item.field_type, &mut buf[offset..offset + size])?;
            offset += size;
        }

        Ok(())
    }

    /// Decode a tuple from a slot's bytes
    pub fn deserialize(data: &[u8], td: &TupleDesc) -> RecordResult<Self> {
        if data.len() != td.byte_size() {
            return Err(RecordError::CorruptPage(format!(
                "Expected {} bytes, got {}",
                td.byte_size(),
                data.len()
            )));
        }

        let mut fields = Vec::with_capacity(td.num_fields());
        let mut offset = 0;
        for item in td.iter() {
            let size = item.field_type.size();
            fields.push(Field::deserialize(
                &data[offset..offset + size],
                &item.field_type,
            )?);
            offset += size;
        }

        Ok(Tuple::new(fields))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
