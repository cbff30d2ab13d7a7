//! In-process arena
//!
//! A growable heap with 8-byte aligned first-fit allocation. Block bookkeeping
//! lives outside the heap so the engine sees nothing but its own bytes.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{ForeignMemory, Ptr};

/// Allocation alignment in bytes
const ALIGN: usize = 8;

/// First usable address; the bytes below it back `Ptr::NULL`
const BASE: usize = ALIGN;

/// Arena sizing options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Heap size at creation (bytes)
    pub initial_size: usize,

    /// Upper bound for growth (bytes, capped at the 32-bit address space)
    pub max_size: usize,

    /// Minimum growth increment (bytes)
    pub grow_step: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_size: 1024 * 1024,    // 1MB
            max_size: 256 * 1024 * 1024,  // 256MB
            grow_step: 64 * 1024,         // 64KB
        }
    }
}

/// Growable foreign memory heap
#[derive(Debug)]
pub struct Arena {
    heap: Vec<u8>,
    /// Live blocks: address -> size
    allocated: BTreeMap<usize, usize>,
    /// Free blocks: address -> size (never adjacent to each other)
    free_blocks: BTreeMap<usize, usize>,
    config: ArenaConfig,
}

impl Arena {
    /// Create an arena
    pub fn new(config: ArenaConfig) -> Self {
        let max_size = config.max_size.min(u32::MAX as usize);
        let initial = align_up(config.initial_size.max(BASE)).min(max_size.max(BASE));

        let mut arena = Self {
            heap: vec![0; initial],
            allocated: BTreeMap::new(),
            free_blocks: BTreeMap::new(),
            config: ArenaConfig { max_size, ..config },
        };
        if initial > BASE {
            arena.free_blocks.insert(BASE, initial - BASE);
        }
        arena
    }

    /// Create an arena bounded to `max_size` bytes
    pub fn with_limit(max_size: usize) -> Self {
        Self::new(ArenaConfig {
            initial_size: max_size.min(ArenaConfig::default().initial_size),
            max_size,
            ..Default::default()
        })
    }

    /// Current heap size in bytes
    pub fn capacity(&self) -> usize {
        self.heap.len()
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.allocated.len()
    }

    /// Bytes held by live allocations (after alignment)
    pub fn live_bytes(&self) -> usize {
        self.allocated.values().sum()
    }

    /// Is `ptr` the start of a live allocation?
    pub fn is_allocated(&self, ptr: Ptr) -> bool {
        self.allocated.contains_key(&ptr.addr())
    }

    /// Size of the live allocation at `ptr`
    pub fn block_size(&self, ptr: Ptr) -> Option<usize> {
        self.allocated.get(&ptr.addr()).copied()
    }

    /// Take the first free block that fits `size` bytes
    fn take_first_fit(&mut self, size: usize) -> Option<usize> {
        let (&addr, &len) = self.free_blocks.iter().find(|&(_, &len)| len >= size)?;
        self.free_blocks.remove(&addr);
        if len > size {
            self.free_blocks.insert(addr + size, len - size);
        }
        Some(addr)
    }

    /// Grow the heap so that a block of `size` bytes fits at its end
    fn grow_for(&mut self, size: usize) -> bool {
        let old_len = self.heap.len();

        // A free block touching the end of the heap counts toward the request
        let tail = self
            .free_blocks
            .range(..old_len)
            .next_back()
            .filter(|&(&addr, &len)| addr + len == old_len)
            .map(|(_, &len)| len)
            .unwrap_or(0);
        let needed = size - tail.min(size);

        let mut new_len = align_up(old_len + needed.max(self.config.grow_step));
        if new_len > self.config.max_size {
            new_len = old_len + needed;
            if new_len > self.config.max_size {
                return false;
            }
        }

        tracing::debug!("Arena grow {} -> {} bytes", old_len, new_len);
        self.heap.resize(new_len, 0);
        self.insert_free(old_len, new_len - old_len);
        true
    }

    /// Return a block to the free list, merging with its neighbours
    fn insert_free(&mut self, mut addr: usize, mut len: usize) {
        if let Some((&prev, &prev_len)) = self.free_blocks.range(..addr).next_back() {
            if prev + prev_len == addr {
                self.free_blocks.remove(&prev);
                addr = prev;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free_blocks.remove(&(addr + len)) {
            len += next_len;
        }
        self.free_blocks.insert(addr, len);
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

impl ForeignMemory for Arena {
    fn allocate(&mut self, size: usize) -> Option<Ptr> {
        let size = align_up(size.max(1));
        if size > self.config.max_size {
            return None;
        }

        let addr = match self.take_first_fit(size) {
            Some(addr) => addr,
            None => {
                if !self.grow_for(size) {
                    tracing::debug!("Arena exhausted: {} bytes requested", size);
                    return None;
                }
                self.take_first_fit(size)?
            }
        };

        self.allocated.insert(addr, size);
        u32::try_from(addr).ok().map(Ptr)
    }

    fn free(&mut self, ptr: Ptr) {
        if ptr.is_null() {
            return;
        }
        match self.allocated.remove(&ptr.addr()) {
            Some(size) => self.insert_free(ptr.addr(), size),
            None => tracing::warn!("Ignoring free of unallocated pointer {}", ptr),
        }
    }

    fn heap(&self) -> &[u8] {
        &self.heap
    }

    fn heap_mut(&mut self) -> &mut [u8] {
        &mut self.heap
    }
}

fn align_up(n: usize) -> usize {
    (n + ALIGN - 1) & !(ALIGN - 1)
}
