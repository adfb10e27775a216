use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};
use super::value::{Field, Type};

/// One named, typed column of a `TupleDesc`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TdItem {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Type,
}

impl TdItem {
    pub fn new(name: impl Into<String>, field_type: Type) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered schema of a tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    /// Create a new tuple descriptor
    pub fn new(items: Vec<TdItem>) -> Self {
        Self { items }
    }

    /// Create a tuple descriptor with anonymous (empty) field names
    pub fn from_types(types: &[Type]) -> Self {
        Self::new(types.iter().map(|t| TdItem::new("", *t)).collect())
    }

    /// Get all fields
    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TdItem> {
        self.items.iter()
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_name(&self, idx: usize) -> Option<&str> {
        self.items.get(idx).map(|item| item.name.as_str())
    }

    pub fn field_type(&self, idx: usize) -> Option<Type> {
        self.items.get(idx).map(|item| item.field_type)
    }

    /// Find field index by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name == name)
    }

    /// Total size in bytes of one tuple with this schema
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.size()).sum()
    }

    /// Byte offset of a field within an encoded tuple
    pub fn field_offset(&self, idx: usize) -> usize {
        self.items[..idx]
            .iter()
            .map(|item| item.field_type.size())
            .sum()
    }

    /// Concatenate two schemas, `first`'s fields first
    pub fn merge(first: &TupleDesc, second: &TupleDesc) -> TupleDesc {
        let mut items = Vec::with_capacity(first.num_fields() + second.num_fields());
        items.extend_from_slice(&first.items);
        items.extend_from_slice(&second.items);
        TupleDesc { items }
    }

    /// Validate a row of values against this schema
    pub fn validate(&self, fields: &[Field]) -> RecordResult<()> {
        if fields.len() != self.items.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} fields, got {}",
                self.items.len(),
                fields.len()
            )));
        }

        for (field, item) in fields.iter().zip(&self.items) {
            if !field.matches(&item.field_type) {
                return Err(RecordError::SchemaMismatch(format!(
                    "Field '{}' of type {} cannot hold {:?}",
                    item.name, item.field_type, field
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", item.name, item.field_type)?;
        }
        Ok(())
    }
}
