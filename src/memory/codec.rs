//! Value codec: native values to and from their fixed-layout byte encoding
//!
//! Both directions are pure. Scalars are little-endian at the width of their type;
//! slices and strings encode as a 4-byte count header followed by the elements.
//! Elements that are themselves handles (strings, nested slices, pointers) encode
//! as 4-byte offsets and decode as [`Value::Ptr`].

use std::fmt;

use crate::error::{Error, Result};
use crate::memory::arena::Offset;
use crate::types::{TypeKind, POINTER_SIZE};

/// Size of the count header of a heap object
pub const HEADER_SIZE: usize = 4;

/// Decoded runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String contents
    Str(String),
    /// Slice elements
    Slice(Vec<Value>),
    /// Arena offset (pointer, or an element handle inside a slice)
    Ptr(Offset),
}

impl Value {
    /// Returns the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Slice(_) => "slice",
            Value::Ptr(_) => "pointer",
        }
    }

    /// Widens any integer value to i64 (u64 values above `i64::MAX` wrap)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::U8(v) => Some(v as i64),
            Value::U16(v) => Some(v as i64),
            Value::U32(v) => Some(v as i64),
            Value::U64(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Returns the boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Slice(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Ptr(offset) => write!(f, "&{}", offset),
        }
    }
}

/// Width of one slice element of type `elem`, if the codec can encode it
pub fn element_width(elem: &TypeKind) -> Result<usize> {
    if elem.is_scalar() || elem.is_handle() {
        elem.fixed_size()
            .ok_or_else(|| Error::type_mismatch("codec", "a sized element", elem))
    } else {
        Err(Error::type_mismatch(
            "codec",
            "a scalar or handle element",
            elem,
        ))
    }
}

fn mismatch(value: &Value, ty: &TypeKind) -> Error {
    Error::type_mismatch("encode", ty, value.type_name())
}

fn encode_handle(offset: Offset) -> Result<Vec<u8>> {
    let raw = u32::try_from(offset).map_err(|_| Error::OutOfMemory {
        requested: offset,
        limit: u32::MAX as usize,
    })?;
    Ok(raw.to_le_bytes().to_vec())
}

fn encode_count(count: usize) -> Result<[u8; HEADER_SIZE]> {
    let count = u32::try_from(count).map_err(|_| Error::OutOfMemory {
        requested: count,
        limit: u32::MAX as usize,
    })?;
    Ok(count.to_le_bytes())
}

/// Encodes `value` as a value of type `ty`.
///
/// For `str` and slice types this produces the heap-object bytes (header plus payload),
/// not the 4-byte handle that refers to them.
pub fn encode(value: &Value, ty: &TypeKind) -> Result<Vec<u8>> {
    let bytes = match (value, ty) {
        (Value::Bool(v), TypeKind::Bool) => vec![*v as u8],
        (Value::I8(v), TypeKind::I8) => v.to_le_bytes().to_vec(),
        (Value::I16(v), TypeKind::I16) => v.to_le_bytes().to_vec(),
        (Value::I32(v), TypeKind::I32) => v.to_le_bytes().to_vec(),
        (Value::I64(v), TypeKind::I64) => v.to_le_bytes().to_vec(),
        (Value::U8(v), TypeKind::U8) => v.to_le_bytes().to_vec(),
        (Value::U16(v), TypeKind::U16) => v.to_le_bytes().to_vec(),
        (Value::U32(v), TypeKind::U32) => v.to_le_bytes().to_vec(),
        (Value::U64(v), TypeKind::U64) => v.to_le_bytes().to_vec(),
        (Value::F32(v), TypeKind::F32) => v.to_le_bytes().to_vec(),
        (Value::F64(v), TypeKind::F64) => v.to_le_bytes().to_vec(),
        (Value::Ptr(offset), TypeKind::Pointer(_) | TypeKind::Str | TypeKind::Slice(_)) => {
            encode_handle(*offset)?
        }
        (Value::Str(s), TypeKind::Str) => {
            let mut out = Vec::with_capacity(HEADER_SIZE + s.len());
            out.extend_from_slice(&encode_count(s.len())?);
            out.extend_from_slice(s.as_bytes());
            out
        }
        (Value::Slice(items), TypeKind::Slice(elem)) => {
            let width = element_width(elem)?;
            let mut out = Vec::with_capacity(HEADER_SIZE + items.len() * width);
            out.extend_from_slice(&encode_count(items.len())?);
            for item in items {
                if elem.is_handle() {
                    match item {
                        Value::Ptr(offset) => out.extend_from_slice(&encode_handle(*offset)?),
                        other => return Err(mismatch(other, elem)),
                    }
                } else {
                    out.extend_from_slice(&encode(item, elem)?);
                }
            }
            out
        }
        (other, ty) => return Err(mismatch(other, ty)),
    };
    Ok(bytes)
}

fn take<const N: usize>(bytes: &[u8], ty: &TypeKind) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::type_mismatch("decode", format!("{} bytes for {}", N, ty), bytes.len()))
}

/// Reads the count header of a heap object and checks that `width`-byte elements fit
/// in the remaining bytes. Returns the element count.
pub fn checked_count(bytes: &[u8], width: usize) -> Result<usize> {
    if bytes.len() < HEADER_SIZE {
        return Err(Error::CorruptSlice {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let needed = count
        .checked_mul(width)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .unwrap_or(usize::MAX);
    if needed > bytes.len() {
        return Err(Error::CorruptSlice {
            needed,
            available: bytes.len(),
        });
    }
    Ok(count)
}

/// Decodes bytes previously produced by [`encode`] for the same type
pub fn decode(bytes: &[u8], ty: &TypeKind) -> Result<Value> {
    let value = match ty {
        TypeKind::Bool => Value::Bool(take::<1>(bytes, ty)?[0] != 0),
        TypeKind::I8 => Value::I8(i8::from_le_bytes(take(bytes, ty)?)),
        TypeKind::I16 => Value::I16(i16::from_le_bytes(take(bytes, ty)?)),
        TypeKind::I32 => Value::I32(i32::from_le_bytes(take(bytes, ty)?)),
        TypeKind::I64 => Value::I64(i64::from_le_bytes(take(bytes, ty)?)),
        TypeKind::U8 => Value::U8(u8::from_le_bytes(take(bytes, ty)?)),
        TypeKind::U16 => Value::U16(u16::from_le_bytes(take(bytes, ty)?)),
        TypeKind::U32 => Value::U32(u32::from_le_bytes(take(bytes, ty)?)),
        TypeKind::U64 => Value::U64(u64::from_le_bytes(take(bytes, ty)?)),
        TypeKind::F32 => Value::F32(f32::from_le_bytes(take(bytes, ty)?)),
        TypeKind::F64 => Value::F64(f64::from_le_bytes(take(bytes, ty)?)),
        TypeKind::Pointer(_) => Value::Ptr(u32::from_le_bytes(take(bytes, ty)?) as Offset),
        TypeKind::Str => {
            let count = checked_count(bytes, 1)?;
            let payload = &bytes[HEADER_SIZE..HEADER_SIZE + count];
            Value::Str(String::from_utf8_lossy(payload).into_owned())
        }
        TypeKind::Slice(elem) => {
            let width = element_width(elem)?;
            let count = checked_count(bytes, width)?;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let start = HEADER_SIZE + i * width;
                let chunk = &bytes[start..start + width];
                if elem.is_handle() {
                    items.push(decode(chunk, &TypeKind::pointer_to(TypeKind::Undefined))?);
                } else {
                    items.push(decode(chunk, elem)?);
                }
            }
            Value::Slice(items)
        }
        other => return Err(Error::type_mismatch("decode", "a codec type", other)),
    };
    Ok(value)
}

/// Encodes an offset as the 4-byte handle stored in variables and slice elements
pub fn handle_bytes(offset: Offset) -> Result<[u8; POINTER_SIZE]> {
    let raw = u32::try_from(offset).map_err(|_| Error::OutOfMemory {
        requested: offset,
        limit: u32::MAX as usize,
    })?;
    Ok(raw.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_widths() {
        assert_eq!(encode(&Value::I16(-2), &TypeKind::I16).unwrap(), vec![0xfe, 0xff]);
        assert_eq!(encode(&Value::Bool(true), &TypeKind::Bool).unwrap(), vec![1]);
        assert_eq!(encode(&Value::F64(1.5), &TypeKind::F64).unwrap().len(), 8);
    }

    #[test]
    fn test_encode_rejects_mismatched_type() {
        let err = encode(&Value::I32(1), &TypeKind::I64).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_slice_layout() {
        let ty = TypeKind::slice_of(TypeKind::I16);
        let bytes = encode(&Value::Slice(vec![Value::I16(1), Value::I16(2)]), &ty).unwrap();
        assert_eq!(bytes, vec![2, 0, 0, 0, 1, 0, 2, 0]);
        assert_eq!(
            decode(&bytes, &ty).unwrap(),
            Value::Slice(vec![Value::I16(1), Value::I16(2)])
        );
    }

    #[test]
    fn test_truncated_slice_is_corrupt() {
        let ty = TypeKind::slice_of(TypeKind::I64);
        // header says 3 elements, only one present
        let mut bytes = vec![3, 0, 0, 0];
        bytes.extend_from_slice(&7i64.to_le_bytes());
        let err = decode(&bytes, &ty).unwrap_err();
        assert_eq!(
            err,
            Error::CorruptSlice {
                needed: 28,
                available: 12
            }
        );
        assert!(matches!(
            decode(&[1, 0], &TypeKind::Str),
            Err(Error::CorruptSlice { .. })
        ));
    }

    #[test]
    fn test_string_and_nested_handles() {
        let bytes = encode(&Value::Str("héllo".into()), &TypeKind::Str).unwrap();
        assert_eq!(&bytes[..4], &6u32.to_le_bytes());
        assert_eq!(decode(&bytes, &TypeKind::Str).unwrap(), Value::Str("héllo".into()));

        let nested = TypeKind::slice_of(TypeKind::Str);
        let bytes = encode(&Value::Slice(vec![Value::Ptr(40), Value::Ptr(0)]), &nested).unwrap();
        assert_eq!(
            decode(&bytes, &nested).unwrap(),
            Value::Slice(vec![Value::Ptr(40), Value::Ptr(0)])
        );
        assert!(encode(&Value::Slice(vec![Value::Str("x".into())]), &nested).is_err());
    }
}
