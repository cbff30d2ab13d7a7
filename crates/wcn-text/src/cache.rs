//! Glyph bitmap cache
//!
//! Bounded LRU of rasterized glyphs. Every entry owns exactly one buffer in
//! foreign memory; whichever path removes an entry frees its buffer.

use std::num::NonZeroUsize;

use lru::LruCache;
use wcn_arena::{ForeignMemory, Ptr};

use crate::raster::{pixel_size, BitmapMetrics};

/// Key for glyph cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlyphKey {
    /// Font handle
    pub font_id: u32,
    /// Unicode codepoint
    pub codepoint: u32,
    /// Requested size truncated to whole pixels
    pub pixel_size: i32,
}

impl GlyphKey {
    /// Create a new glyph key
    pub fn new(font_id: u32, codepoint: u32, size: f32) -> Self {
        Self {
            font_id,
            codepoint,
            pixel_size: pixel_size(size),
        }
    }
}

/// A cached bitmap: metrics plus the owned pixel buffer
#[derive(Debug, PartialEq)]
pub struct GlyphBitmapEntry {
    pub metrics: BitmapMetrics,
    /// `metrics.byte_len()` bytes of RGBA8 in foreign memory
    pub pixels: Ptr,
}

/// LRU glyph cache
pub struct GlyphCache {
    entries: LruCache<GlyphKey, GlyphBitmapEntry>,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Entries pushed out by capacity pressure
    pub evictions: u64,
}

impl GlyphCache {
    /// Create a cache holding at most `capacity` glyphs (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a glyph and mark it most recently used
    pub fn get(&mut self, key: &GlyphKey) -> Option<&GlyphBitmapEntry> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits += 1;
                Some(entry)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Mark a glyph most recently used and count a hit.
    /// Returns false (and counts nothing) when absent.
    pub fn touch(&mut self, key: &GlyphKey) -> bool {
        if !self.entries.contains(key) {
            return false;
        }
        self.entries.promote(key);
        self.hits += 1;
        true
    }

    /// Look up a glyph without touching recency or counters
    pub fn peek(&self, key: &GlyphKey) -> Option<&GlyphBitmapEntry> {
        self.entries.peek(key)
    }

    /// Presence test that leaves recency alone
    pub fn contains(&self, key: &GlyphKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert an entry as most recently used.
    ///
    /// A replaced entry or the evicted least-recently-used entry has its
    /// buffer released.
    pub fn put<M: ForeignMemory + ?Sized>(
        &mut self,
        memory: &mut M,
        key: GlyphKey,
        entry: GlyphBitmapEntry,
    ) {
        if let Some((old_key, old)) = self.entries.push(key, entry) {
            if old_key != key {
                self.evictions += 1;
                tracing::debug!(
                    "Evicted glyph U+{:04X} font {} at {}px",
                    old_key.codepoint, old_key.font_id, old_key.pixel_size
                );
            }
            memory.free(old.pixels);
        }
    }

    /// Remove an entry, freeing its buffer. Returns whether it was present.
    pub fn evict<M: ForeignMemory + ?Sized>(&mut self, memory: &mut M, key: &GlyphKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                memory.free(entry.pixels);
                true
            }
            None => false,
        }
    }

    /// Drop every entry, freeing all buffers
    pub fn clear<M: ForeignMemory + ?Sized>(&mut self, memory: &mut M) {
        while let Some((_, entry)) = self.entries.pop_lru() {
            memory.free(entry.pixels);
        }
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Number of cached glyphs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of cached glyphs
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> impl Iterator<Item = &GlyphKey> {
        self.entries.iter().map(|(key, _)| key)
    }
}

impl std::fmt::Debug for GlyphCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlyphCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .field("evictions", &self.evictions)
            .finish()
    }
}
