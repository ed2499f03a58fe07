//! Header-prefixed heap objects (strings and slices) living in the arena
//!
//! An object is `[count: u32][count * width bytes]`. Variables hold a 4-byte handle to
//! the header; the nil handle stands for an empty object. Growing operations always
//! produce a new object and leave the old one untouched, so other handles to the old
//! object keep seeing the old contents.

use crate::error::{Error, Result};
use crate::memory::arena::{Arena, Offset, NIL};
use crate::memory::codec::{self, Value, HEADER_SIZE};
use crate::types::TypeKind;

/// Number of elements stored in the object at `handle` (0 for nil)
pub fn object_len(arena: &Arena, handle: Offset) -> Result<usize> {
    if handle == NIL {
        return Ok(0);
    }
    arena.read_offset(handle)
}

/// Returns the payload bytes of the object at `handle` after checking that the header
/// count fits inside the allocated arena.
pub fn payload(arena: &Arena, handle: Offset, width: usize) -> Result<&[u8]> {
    if handle == NIL {
        return Ok(&[]);
    }
    let count = object_len(arena, handle)?;
    let available = arena.heap_pointer().saturating_sub(handle);
    let needed = count
        .checked_mul(width)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .unwrap_or(usize::MAX);
    if needed > available {
        return Err(Error::CorruptSlice { needed, available });
    }
    arena.read(handle + HEADER_SIZE, count * width)
}

/// Decodes the string or slice object at `handle`
pub fn read_object(arena: &Arena, handle: Offset, ty: &TypeKind) -> Result<Value> {
    let width = match ty {
        TypeKind::Str => 1,
        TypeKind::Slice(elem) => codec::element_width(elem)?,
        other => return Err(Error::type_mismatch("heap object", "str or slice", other)),
    };
    if handle == NIL {
        return Ok(match ty {
            TypeKind::Str => Value::Str(String::new()),
            _ => Value::Slice(Vec::new()),
        });
    }
    let count = object_len(arena, handle)?;
    let body = payload(arena, handle, width)?;
    let mut bytes = Vec::with_capacity(HEADER_SIZE + body.len());
    bytes.extend_from_slice(&(count as u32).to_le_bytes());
    bytes.extend_from_slice(body);
    codec::decode(&bytes, ty)
}

/// Encodes `value` as a new heap object and returns its handle
pub fn write_object(arena: &mut Arena, value: &Value, ty: &TypeKind) -> Result<Offset> {
    let bytes = codec::encode(value, ty)?;
    let handle = arena.allocate(bytes.len())?;
    arena.write(handle, &bytes)?;
    Ok(handle)
}

/// Allocates a new object holding `count` zeroed elements
pub fn allocate_object(arena: &mut Arena, count: usize, width: usize) -> Result<Offset> {
    let handle = arena.allocate(HEADER_SIZE + count * width)?;
    arena.write_offset(handle, count)?;
    Ok(handle)
}

/// Offset of element `index` in the object at `handle`, bounds-checked against the
/// stored count.
pub fn element_offset(arena: &Arena, handle: Offset, index: i64, width: usize) -> Result<Offset> {
    let length = object_len(arena, handle)?;
    if index < 0 || index as usize >= length {
        return Err(Error::IndexOutOfRange { index, length });
    }
    Ok(handle + HEADER_SIZE + index as usize * width)
}

/// New object holding the elements of `handle` followed by `element`
pub fn append_element(
    arena: &mut Arena,
    handle: Offset,
    width: usize,
    element: &[u8],
) -> Result<Offset> {
    if element.len() != width {
        return Err(Error::InvalidArguments {
            op: "append".to_string(),
            reason: format!("element is {} bytes, slice holds {}", element.len(), width),
        });
    }
    let old = payload(arena, handle, width)?.to_vec();
    let count = old.len() / width;
    let result = allocate_object(arena, count + 1, width)?;
    arena.write(result + HEADER_SIZE, &old)?;
    arena.write(result + HEADER_SIZE + old.len(), element)?;
    Ok(result)
}

/// New object holding the elements of `a` followed by those of `b`
pub fn concat_objects(arena: &mut Arena, a: Offset, b: Offset, width: usize) -> Result<Offset> {
    let mut joined = payload(arena, a, width)?.to_vec();
    joined.extend_from_slice(payload(arena, b, width)?);
    let result = allocate_object(arena, joined.len() / width, width)?;
    arena.write(result + HEADER_SIZE, &joined)?;
    Ok(result)
}

/// Copies `min(len(dst), len(src))` elements from `src` into `dst` in place and returns
/// the number copied. `dst` never grows.
pub fn copy_elements(arena: &mut Arena, dst: Offset, src: Offset, width: usize) -> Result<usize> {
    let dst_len = payload(arena, dst, width)?.len() / width.max(1);
    let src_len = payload(arena, src, width)?.len() / width.max(1);
    let count = dst_len.min(src_len);
    if count > 0 {
        arena.copy_within(src + HEADER_SIZE, dst + HEADER_SIZE, count * width)?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena {
        Arena::new(16, 256).unwrap()
    }

    #[test]
    fn test_nil_handle_is_empty() {
        let arena = arena();
        assert_eq!(object_len(&arena, NIL).unwrap(), 0);
        assert_eq!(
            read_object(&arena, NIL, &TypeKind::Str).unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn test_append_leaves_original_untouched() {
        let mut arena = arena();
        let ty = TypeKind::slice_of(TypeKind::I32);
        let original = write_object(
            &mut arena,
            &Value::Slice(vec![Value::I32(1), Value::I32(2)]),
            &ty,
        )
        .unwrap();

        let grown = append_element(&mut arena, original, 4, &3i32.to_le_bytes()).unwrap();
        assert_ne!(grown, original);
        assert_eq!(object_len(&arena, original).unwrap(), 2);
        assert_eq!(
            read_object(&arena, grown, &ty).unwrap(),
            Value::Slice(vec![Value::I32(1), Value::I32(2), Value::I32(3)])
        );
    }

    #[test]
    fn test_copy_is_bounded_by_shorter_slice() {
        let mut arena = arena();
        let ty = TypeKind::slice_of(TypeKind::I64);
        let dst = write_object(&mut arena, &Value::Slice(vec![Value::I64(0); 2]), &ty).unwrap();
        let src = write_object(
            &mut arena,
            &Value::Slice(vec![Value::I64(7), Value::I64(8), Value::I64(9)]),
            &ty,
        )
        .unwrap();

        assert_eq!(copy_elements(&mut arena, dst, src, 8).unwrap(), 2);
        assert_eq!(
            read_object(&arena, dst, &ty).unwrap(),
            Value::Slice(vec![Value::I64(7), Value::I64(8)])
        );
    }

    #[test]
    fn test_element_offset_bounds() {
        let mut arena = arena();
        let handle = allocate_object(&mut arena, 3, 2).unwrap();
        assert_eq!(element_offset(&arena, handle, 2, 2).unwrap(), handle + 8);
        assert_eq!(
            element_offset(&arena, handle, 3, 2).unwrap_err(),
            Error::IndexOutOfRange {
                index: 3,
                length: 3
            }
        );
        assert!(element_offset(&arena, handle, -1, 2).is_err());
    }

    #[test]
    fn test_corrupt_header_is_detected() {
        let mut arena = arena();
        let handle = allocate_object(&mut arena, 1, 4).unwrap();
        arena.write_offset(handle, 1000).unwrap();
        assert!(matches!(
            payload(&arena, handle, 4),
            Err(Error::CorruptSlice { .. })
        ));
    }
}
