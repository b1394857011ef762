//! String interning pool.
//!
//! Interning guarantees that two interned strings with equal contents share a
//! single heap object, so equality between them can be tested by comparing
//! [`HeapId`]s instead of byte contents. The pool itself is an ordinary
//! host-side lookup structure (not subject to GC); it maps string content to
//! the [`HeapId`] of the canonical heap-allocated [`crate::types::str::Str`].
//!
//! The lookup-by-content structure below is an ambient concern (a Rust-side
//! cache), distinct from the language-level [`crate::table::Table`] used for
//! dicts, globals, and attribute maps, which is a from-scratch quadratic-probe
//! table per the CORE spec and must not be conflated with this pool.

use ahash::AHashMap;

use crate::heap::{Heap, HeapId};

/// Canonical store of interned strings, keyed by content.
#[derive(Debug, Default)]
pub(crate) struct Interns {
    by_content: AHashMap<Box<str>, HeapId>,
}

impl Interns {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical heap id for `s`, allocating and interning a new
    /// string object the first time `s` is seen.
    pub(crate) fn intern(&mut self, heap: &mut Heap, s: &str) -> HeapId {
        if let Some(&id) = self.by_content.get(s) {
            return id;
        }
        let id = heap.allocate_interned_string(s);
        self.by_content.insert(s.into(), id);
        id
    }

    /// Number of distinct interned strings currently tracked.
    ///
    /// Note this can exceed the number of *live* interned strings after a GC
    /// sweep frees one; the pool entry is only dropped lazily on next lookup
    /// miss for that content, matching the "advisory" interning invariant in
    /// `spec.md` §4.2.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_content.len()
    }
}
