//! The single flat byte buffer holding all program state
//!
//! ```text
//! 0        8                data_end          stack_end           heap_pointer    len
//! +--------+-----------------+-----------------+-------------------+-------------+
//! | nil    | globals/literals| call frames     | heap objects      | reserve     |
//! +--------+-----------------+-----------------+-------------------+-------------+
//! ```
//!
//! Every address handed out is an integer offset into this buffer. Growing the
//! buffer may move the backing storage but never changes an offset.

use crate::error::{Error, Result};

/// Integer address into the arena
pub type Offset = usize;

/// The nil handle; never a valid object offset
pub const NIL: Offset = 0;

/// Bytes reserved at the start of the data segment so that offset 0 stays nil
pub const NIL_GUARD: usize = 8;

/// Single owned growable byte buffer with bump allocation
#[derive(Debug, Clone)]
pub struct Arena {
    /// Backing storage; `bytes.len()` is the reserved size
    bytes: Vec<u8>,
    /// End of the data segment / start of the stack segment
    data_end: Offset,
    /// End of the stack segment / start of the heap
    stack_end: Offset,
    /// Next free heap byte; everything at or past it is unallocated
    heap_pointer: Offset,
    /// Ceiling for `bytes.len()`
    max_size: usize,
}

impl Arena {
    /// Creates an arena with a data segment copied from `data`, a zeroed stack segment
    /// of `stack_size` bytes and `heap_size` bytes of heap reserved up front.
    pub fn with_layout(
        data: &[u8],
        stack_size: usize,
        heap_size: usize,
        max_size: usize,
    ) -> Result<Self> {
        let data_end = data.len().max(NIL_GUARD);
        let stack_end = data_end + stack_size;
        let reserved = stack_end + heap_size;
        if reserved > max_size {
            return Err(Error::OutOfMemory {
                requested: reserved,
                limit: max_size,
            });
        }

        let mut bytes = vec![0u8; reserved];
        bytes[..data.len()].copy_from_slice(data);

        Ok(Arena {
            bytes,
            data_end,
            stack_end,
            heap_pointer: stack_end,
            max_size,
        })
    }

    /// Creates an arena with no data segment, for tests and scratch use
    pub fn new(stack_size: usize, heap_size: usize) -> Result<Self> {
        let max = NIL_GUARD + stack_size + heap_size.max(1) * 16;
        Self::with_layout(&[], stack_size, heap_size, max)
    }

    /// End of the data segment, where the first call frame begins
    pub fn stack_start(&self) -> Offset {
        self.data_end
    }

    /// End of the stack segment
    pub fn stack_end(&self) -> Offset {
        self.stack_end
    }

    /// First heap offset
    pub fn heap_start(&self) -> Offset {
        self.stack_end
    }

    /// End of the allocated region
    pub fn heap_pointer(&self) -> Offset {
        self.heap_pointer
    }

    /// Bytes currently reserved by the backing buffer
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// The flat memory image (allocated region only)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.heap_pointer]
    }

    fn check(&self, offset: Offset, width: usize) -> Result<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.heap_pointer => Ok(()),
            _ => Err(Error::OutOfBounds {
                offset,
                width,
                limit: self.heap_pointer,
            }),
        }
    }

    /// Reads `width` bytes at `offset`
    pub fn read(&self, offset: Offset, width: usize) -> Result<&[u8]> {
        self.check(offset, width)?;
        Ok(&self.bytes[offset..offset + width])
    }

    /// Writes `bytes` at `offset`. Either the whole write happens or nothing does.
    pub fn write(&mut self, offset: Offset, bytes: &[u8]) -> Result<()> {
        self.check(offset, bytes.len())?;
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Zero-fills `len` bytes at `offset`
    pub fn zero(&mut self, offset: Offset, len: usize) -> Result<()> {
        self.check(offset, len)?;
        self.bytes[offset..offset + len].fill(0);
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dst` (regions may overlap)
    pub fn copy_within(&mut self, src: Offset, dst: Offset, len: usize) -> Result<()> {
        self.check(src, len)?;
        self.check(dst, len)?;
        self.bytes.copy_within(src..src + len, dst);
        Ok(())
    }

    /// Reads a 4-byte little-endian offset (handle or length header)
    pub fn read_offset(&self, offset: Offset) -> Result<Offset> {
        let raw = self.read(offset, 4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as Offset)
    }

    /// Writes a 4-byte little-endian offset (handle or length header)
    pub fn write_offset(&mut self, offset: Offset, value: Offset) -> Result<()> {
        let value = u32::try_from(value).map_err(|_| Error::OutOfMemory {
            requested: value,
            limit: u32::MAX as usize,
        })?;
        self.write(offset, &value.to_le_bytes())
    }

    /// Allocates `size` zeroed heap bytes and returns their offset.
    /// Abandoned regions are never reclaimed.
    pub fn allocate(&mut self, size: usize) -> Result<Offset> {
        let offset = self.heap_pointer;
        let end = offset.checked_add(size).ok_or(Error::OutOfMemory {
            requested: usize::MAX,
            limit: self.max_size,
        })?;
        self.reserve(end)?;
        self.heap_pointer = end;
        self.bytes[offset..end].fill(0);
        Ok(offset)
    }

    /// Resizes the heap object at `offset` from `old_size` to `new_size` bytes.
    ///
    /// Shrinking and growing the most recent allocation happen in place; any other
    /// growth allocates a new region, copies the old content and returns the new offset.
    pub fn resize(&mut self, offset: Offset, old_size: usize, new_size: usize) -> Result<Offset> {
        self.check(offset, old_size)?;
        if new_size <= old_size {
            return Ok(offset);
        }

        if offset + old_size == self.heap_pointer && offset >= self.stack_end {
            let end = offset + new_size;
            self.reserve(end)?;
            self.bytes[self.heap_pointer..end].fill(0);
            self.heap_pointer = end;
            return Ok(offset);
        }

        let moved = self.allocate(new_size)?;
        self.bytes.copy_within(offset..offset + old_size, moved);
        Ok(moved)
    }

    /// Makes sure the backing buffer covers `end`, doubling up to the ceiling
    fn reserve(&mut self, end: usize) -> Result<()> {
        if end <= self.bytes.len() {
            return Ok(());
        }
        if end > self.max_size {
            return Err(Error::OutOfMemory {
                requested: end,
                limit: self.max_size,
            });
        }

        let grown = (self.bytes.len() * 2).clamp(end, self.max_size);
        tracing::debug!(from = self.bytes.len(), to = grown, "growing arena");
        self.bytes.resize(grown, 0);
        Ok(())
    }
}
