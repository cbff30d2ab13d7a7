//! Typed access to foreign memory

use std::ops::Range;

use crate::{MemoryError, Ptr, Result};

/// Memory shared with the native engine.
///
/// Implementors only provide allocation and a raw view of the heap; the typed
/// accessors are built on top of that view. All multi-byte values are
/// little-endian.
pub trait ForeignMemory {
    /// Allocate `size` bytes. Returns `None` when the heap is exhausted.
    fn allocate(&mut self, size: usize) -> Option<Ptr>;

    /// Release an allocation. Freeing `Ptr::NULL` is a no-op.
    fn free(&mut self, ptr: Ptr);

    /// The whole heap as bytes
    fn heap(&self) -> &[u8];

    /// The whole heap as mutable bytes
    fn heap_mut(&mut self) -> &mut [u8];

    /// Borrow `len` bytes starting at `ptr`
    fn read_bytes(&self, ptr: Ptr, len: usize) -> Result<&[u8]> {
        let range = checked_range(self.heap().len(), ptr, len)?;
        Ok(&self.heap()[range])
    }

    /// Copy `data` into the heap at `ptr`
    fn write_bytes(&mut self, ptr: Ptr, data: &[u8]) -> Result<()> {
        let range = checked_range(self.heap().len(), ptr, data.len())?;
        self.heap_mut()[range].copy_from_slice(data);
        Ok(())
    }

    /// Set `len` bytes at `ptr` to `value`
    fn fill(&mut self, ptr: Ptr, len: usize, value: u8) -> Result<()> {
        let range = checked_range(self.heap().len(), ptr, len)?;
        self.heap_mut()[range].fill(value);
        Ok(())
    }

    fn read_u8(&self, ptr: Ptr) -> Result<u8> {
        Ok(self.read_bytes(ptr, 1)?[0])
    }

    fn write_u8(&mut self, ptr: Ptr, value: u8) -> Result<()> {
        self.write_bytes(ptr, &[value])
    }

    fn read_u32(&self, ptr: Ptr) -> Result<u32> {
        let b = self.read_bytes(ptr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_u32(&mut self, ptr: Ptr, value: u32) -> Result<()> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    fn read_i32(&self, ptr: Ptr) -> Result<i32> {
        let b = self.read_bytes(ptr, 4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_i32(&mut self, ptr: Ptr, value: i32) -> Result<()> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    fn read_f32(&self, ptr: Ptr) -> Result<f32> {
        let b = self.read_bytes(ptr, 4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_f32(&mut self, ptr: Ptr, value: f32) -> Result<()> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    /// Allocate a new block and copy `len` bytes from `src` into it.
    ///
    /// The source range is validated before anything is allocated, so a
    /// failure never leaves a stray allocation behind.
    fn duplicate(&mut self, src: Ptr, len: usize) -> Result<Ptr> {
        let src_range = checked_range(self.heap().len(), src, len)?;
        let dst = self
            .allocate(len)
            .ok_or(MemoryError::OutOfMemory { requested: len })?;
        let dst_start = dst.addr();
        self.heap_mut().copy_within(src_range, dst_start);
        Ok(dst)
    }

    /// Allocate a block holding a copy of `data`
    fn alloc_bytes(&mut self, data: &[u8]) -> Result<Ptr> {
        let ptr = self
            .allocate(data.len())
            .ok_or(MemoryError::OutOfMemory { requested: data.len() })?;
        if let Err(e) = self.write_bytes(ptr, data) {
            self.free(ptr);
            return Err(e);
        }
        Ok(ptr)
    }

    /// Decode the NUL-terminated UTF-8 string at `ptr`.
    ///
    /// Invalid sequences are replaced with U+FFFD. A missing terminator reads
    /// to the end of the heap.
    fn read_c_str(&self, ptr: Ptr) -> Result<String> {
        let tail = self.read_bytes(ptr, self.heap().len().saturating_sub(ptr.addr()))?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// Allocate a NUL-terminated copy of `s`
    fn alloc_c_str(&mut self, s: &str) -> Result<Ptr> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.alloc_bytes(&bytes)
    }
}

/// Validate `len` bytes at `ptr` against a heap of `heap_len` bytes
fn checked_range(heap_len: usize, ptr: Ptr, len: usize) -> Result<Range<usize>> {
    if ptr.is_null() {
        return Err(MemoryError::NullPointer);
    }
    let start = ptr.addr();
    match start.checked_add(len) {
        Some(end) if end <= heap_len => Ok(start..end),
        _ => Err(MemoryError::OutOfBounds { ptr, len }),
    }
}
