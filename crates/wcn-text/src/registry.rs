//! Font registry
//!
//! Hands out integer font handles. The foreground and the prefetch worker each
//! own one; the worker's copy is kept in step by replaying registrations.

use std::collections::HashMap;

/// A registered font
#[derive(Debug, Clone, PartialEq)]
pub struct FontRecord {
    /// Handle, starting at 1
    pub id: u32,
    /// Family name (may be a comma-separated fallback list)
    pub family: String,
    /// Size the font was loaded at (pixels)
    pub nominal_size: f32,
}

/// Font handle table
#[derive(Debug)]
pub struct FontRegistry {
    fonts: HashMap<u32, FontRecord>,
    next_id: u32,
}

impl FontRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a font and return its handle. Handles are never reused.
    pub fn register(&mut self, family: &str, nominal_size: f32) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        self.fonts.insert(id, FontRecord {
            id,
            family: family.to_string(),
            nominal_size,
        });
        id
    }

    /// Look up a font by handle
    pub fn lookup(&self, id: u32) -> Option<&FontRecord> {
        self.fonts.get(&id)
    }

    /// Number of registered fonts
    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}
