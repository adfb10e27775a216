use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};

/// Maximum byte length of a `string` column declared without a length
pub const DEFAULT_STRING_LEN: usize = 128;

/// Width of the length prefix in front of every stored string
const STRING_PREFIX_LEN: usize = 4;

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,            // 4 bytes, big-endian
    String(usize),  // 4-byte length prefix + n bytes (fixed length)
}

impl Type {
    /// A string type with the default maximum length
    pub fn string() -> Self {
        Type::String(DEFAULT_STRING_LEN)
    }

    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::String(max_len) => STRING_PREFIX_LEN + max_len,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "INT"),
            Type::String(max_len) => write!(f, "STRING({})", max_len),
        }
    }
}

/// Represents a single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    /// Whether this value can be stored in a column of type `ty`
    pub fn matches(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Field::Int(_), Type::Int) => true,
            (Field::String(s), Type::String(max_len)) => s.len() <= *max_len,
            _ => false,
        }
    }

    /// Encode the value into `buf`, which must be exactly `ty.size()` bytes.
    /// Strings are written as a length prefix followed by the UTF-8 bytes and
    /// zero padding.
    pub fn serialize_into(&self, ty: &Type, buf: &mut [u8]) -> RecordResult<()> {
        if buf.len() != ty.size() {
            return Err(RecordError::InvalidRecord(format!(
                "Expected a {} byte buffer for {}, got {}",
                ty.size(),
                ty,
                buf.len()
            )));
        }

        match (self, ty) {
            (Field::Int(i), Type::Int) => {
                buf.copy_from_slice(&i.to_be_bytes());
                Ok(())
            }
            (Field::String(s), Type::String(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len {
                    return Err(RecordError::SchemaMismatch(format!(
                        "String length {} exceeds max length {}",
                        bytes.len(),
                        max_len
                    )));
                }
                buf.fill(0);
                buf[..STRING_PREFIX_LEN].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf[STRING_PREFIX_LEN..STRING_PREFIX_LEN + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(RecordError::TypeMismatch {
                expected: ty.to_string(),
                actual: format!("{:?}", self),
            }),
        }
    }

    /// Decode a value of type `ty` from exactly `ty.size()` bytes
    pub fn deserialize(bytes: &[u8], ty: &Type) -> RecordResult<Self> {
        if bytes.len() != ty.size() {
            return Err(RecordError::CorruptPage(format!(
                "Expected {} bytes for {}, got {}",
                ty.size(),
                ty,
                bytes.len()
            )));
        }

        match ty {
            Type::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Field::Int(i32::from_be_bytes(buf)))
            }
            Type::String(max_len) => {
                let mut prefix = [0u8; STRING_PREFIX_LEN];
                prefix.copy_from_slice(&bytes[..STRING_PREFIX_LEN]);
                let len = u32::from_be_bytes(prefix) as usize;
                if len > *max_len {
                    return Err(RecordError::CorruptPage(format!(
                        "String length prefix {} exceeds max length {}",
                        len, max_len
                    )));
                }
                let payload = &bytes[STRING_PREFIX_LEN..STRING_PREFIX_LEN + len];
                let s = String::from_utf8(payload.to_vec())
                    .map_err(|e| RecordError::CorruptPage(format!("Invalid UTF-8: {}", e)))?;
                Ok(Field::String(s))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(i) => write!(f, "{}", i),
            Field::String(s) => write!(f, "{}", s),
        }
    }
}
