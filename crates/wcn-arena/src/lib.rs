//! WCN Arena - Foreign Memory Bridge
//!
//! The byte-addressable memory shared between the glyph layer and the native
//! rendering engine:
//! - `ForeignMemory`: allocate/free plus typed little-endian reads and writes
//! - `Arena`: an in-process heap with first-fit allocation and growth on demand
//! - NUL-terminated UTF-8 string helpers
//!
//! Allocations are identified by `Ptr`, a plain 32-bit address into the heap.

mod arena;
mod memory;

pub use arena::{Arena, ArenaConfig};
pub use memory::ForeignMemory;

/// Address of an allocation inside a foreign memory heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Ptr(pub u32);

impl Ptr {
    /// The null address; never returned by a successful allocation
    pub const NULL: Ptr = Ptr(0);

    /// Is this the null address?
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address as a heap index
    pub fn addr(self) -> usize {
        self.0 as usize
    }

    /// Pointer `bytes` further into the heap
    pub fn offset(self, bytes: u32) -> Option<Ptr> {
        self.0.checked_add(bytes).map(Ptr)
    }
}

impl std::fmt::Display for Ptr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Foreign memory error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("Null pointer access")]
    NullPointer,

    #[error("Access out of bounds: {len} bytes at {ptr}")]
    OutOfBounds { ptr: Ptr, len: usize },

    #[error("Out of memory: cannot allocate {requested} bytes")]
    OutOfMemory { requested: usize },
}

pub type Result<T> = std::result::Result<T, MemoryError>;
